//! Conversion of the retrieved GRIB files into point data.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::{info, warn};

use crate::{
    category::Category,
    config::{Config, MissingFilePolicy},
    errors::DtExtractErr,
    logging::LogConfig,
};

mod converter;
mod reference;

pub use self::converter::{ConversionJob, Grib2Sqlite, PointConverter};
pub use self::reference::{
    CategoryReference, ParameterList, ReferenceTables, Station, StationList,
};

/// Environment variable ecFlow uses for the current try of a task.
pub const ATTEMPT_VARIABLE: &str = "ECF_TRYNO";

/// The outcome of an extraction run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extraction {
    /// Retrieval already used up its tries, nothing was done.
    SkippedRetriesExhausted,
    /// All files were handled.
    Done {
        /// Number of files handed to the converter.
        converted: usize,
        /// Files that were expected but not found.
        missing: Vec<PathBuf>,
    },
}

/// The extraction task for one cycle.
#[derive(Debug)]
pub struct ExtractDt {
    steps: Vec<String>,
    dt_path: PathBuf,
    categories: Vec<Category>,
    tables: ReferenceTables,
    sqlite_template: String,
    model_name: String,
    converter_bin: String,
    log_file: Option<PathBuf>,
    policy: MissingFilePolicy,
    attempt: u32,
    max_tries: u32,
    continue_on_fail: bool,
    log: LogConfig,
}

impl ExtractDt {
    /// Set up the task, loading the reference tables. The try number is read from `ECF_TRYNO`.
    pub fn new(config: &Config, log: LogConfig) -> Result<Self, DtExtractErr> {
        let steps = config.steps()?;
        let dt_path = config.dt_path()?;
        let tables = ReferenceTables::load(config)?;

        let section = &config.extractsqlite;
        let sqlite_path = config.path(&section.sqlite_path)?;
        let sqlite_template = sqlite_path
            .join(config.substitute(&section.sqlite_template, Some(&config.basetime()?))?)
            .to_string_lossy()
            .into_owned();

        let log_file = match section.log_file {
            Some(ref name) => Some(sqlite_path.join(config.path(name)?)),
            None => None,
        };

        let categories = config
            .extract_dt
            .paramtypes
            .iter()
            .filter_map(|tag| match Category::from_str(tag) {
                Ok(category) => Some(category),
                Err(_) => {
                    warn!("unknown parameter type {}, skipping it", tag);
                    None
                }
            })
            .collect();

        let attempt = std::env::var(ATTEMPT_VARIABLE)
            .ok()
            .and_then(|val| val.trim().parse().ok())
            .unwrap_or(1);

        info!("DT PATH: {}", dt_path.display());
        info!("SQLITE TEMPLATE: {}", sqlite_template);

        Ok(ExtractDt {
            steps,
            dt_path,
            categories,
            tables,
            sqlite_template,
            model_name: section.sqlite_model_name.clone(),
            converter_bin: section.converter_bin.clone(),
            log_file,
            policy: config.extract_dt.missing_file_policy,
            attempt,
            max_tries: config.scheduler.ecfvars.ecf_tries,
            continue_on_fail: config.extract_dt.continue_on_fail,
            log,
        })
    }

    /// Override the try number.
    pub fn with_attempt(self, attempt: u32) -> Self {
        ExtractDt { attempt, ..self }
    }

    /// Override what happens to missing files.
    pub fn with_policy(self, policy: MissingFilePolicy) -> Self {
        ExtractDt { policy, ..self }
    }

    /// The categories that will be extracted.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// The output database template handed to the converter.
    pub fn sqlite_template(&self) -> &str {
        &self.sqlite_template
    }

    /// True if this try should give up without doing anything.
    pub fn retries_exhausted(&self) -> bool {
        self.continue_on_fail && self.attempt >= self.max_tries
    }

    /// Run the task with the external converter.
    pub fn execute(&self) -> Result<Extraction, DtExtractErr> {
        self.execute_with(&Grib2Sqlite::new(&self.converter_bin))
    }

    /// Run the task with a specific converter.
    pub fn execute_with(&self, converter: &dyn PointConverter) -> Result<Extraction, DtExtractErr> {
        if self.retries_exhausted() {
            info!(
                "try {} of {} and continue_on_fail is set, skipping extraction",
                self.attempt, self.max_tries
            );
            return Ok(Extraction::SkippedRetriesExhausted);
        }

        let mut log = ExtractionLog::open(self.log_file.as_deref())?;
        let mut converted = 0;
        let mut missing = vec![];

        for &category in &self.categories {
            let reference = self.tables.for_category(category);

            for step in &self.steps {
                let infile = self.dt_path.join(category.grib_file_name(step));
                log.line(&format!("SQLITE EXTRACTION: {}", infile.display()))?;

                if !infile.is_file() {
                    match self.policy {
                        MissingFilePolicy::Strict => return Err(DtExtractErr::MissingFile(infile)),
                        MissingFilePolicy::Lenient => {
                            warn!("File not found, skipping: {}", infile.display());
                            log.line(&format!("File not found, skipping: {}", infile.display()))?;
                            missing.push(infile);
                            continue;
                        }
                    }
                }

                info!("SQLITE EXTRACTION: {}", infile.display());
                let job = ConversionJob {
                    infile: &infile,
                    category,
                    reference,
                    sqlite_template: &self.sqlite_template,
                    model_name: &self.model_name,
                };
                converter.convert(&job, &self.log)?;
                converted += 1;
            }
        }

        Ok(Extraction::Done { converted, missing })
    }
}

// The optional plain text log next to the databases.
struct ExtractionLog(Option<File>);

impl ExtractionLog {
    fn open(path: Option<&Path>) -> Result<Self, DtExtractErr> {
        let path = match path {
            Some(path) => path,
            None => return Ok(ExtractionLog(None)),
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(ExtractionLog(Some(file)))
    }

    fn line(&mut self, text: &str) -> Result<(), DtExtractErr> {
        if let Some(ref mut file) = self.0 {
            writeln!(file, "{}", text)?;
        }
        Ok(())
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;
    use crate::{config::TEST_CONFIG, extract::reference::test_files};

    use std::cell::RefCell;

    use tempdir::TempDir;

    #[derive(Default)]
    struct FakeConverter {
        jobs: RefCell<Vec<(PathBuf, Category, PathBuf, &'static str)>>,
    }

    impl PointConverter for FakeConverter {
        fn convert(&self, job: &ConversionJob, log: &LogConfig) -> Result<(), DtExtractErr> {
            self.jobs.borrow_mut().push((
                job.infile.to_path_buf(),
                job.category,
                job.reference.stations.path().to_path_buf(),
                log.external_name(),
            ));
            Ok(())
        }
    }

    fn config_in(tmp: &TempDir) -> Config {
        let mut config: Config = TEST_CONFIG.parse().unwrap();
        config.macros.insert(
            "SCRATCH".to_owned(),
            tmp.path().to_string_lossy().into_owned(),
        );
        test_files::write_all(tmp.path());
        config
    }

    // Write the GRIB files of all steps except those in `skip`.
    fn write_grib(task: &ExtractDt, skip: &[&str]) {
        std::fs::create_dir_all(&task.dt_path).unwrap();
        for category in Category::ALL.iter() {
            for step in &task.steps {
                let name = category.grib_file_name(step);
                if !skip.contains(&name.as_str()) {
                    std::fs::write(task.dt_path.join(name), b"GRIB").unwrap();
                }
            }
        }
    }

    #[test]
    fn test_new() {
        let tmp = TempDir::new("dt-extract-extract").unwrap();
        let task = ExtractDt::new(&config_in(&tmp), LogConfig::default()).unwrap();

        assert_eq!(task.categories(), &[Category::Surface, Category::UpperAir]);
        assert_eq!(
            task.sqlite_template(),
            tmp.path()
                .join("sqlite/{MODEL}/{YYYY}/{MM}/FC{YYYY}{MM}{DD}{HH}_{PP}.sqlite")
                .to_string_lossy()
        );
        assert_eq!(task.dt_path, tmp.path().join("grib/20240305"));
    }

    #[test]
    fn test_missing_reference_file() {
        let tmp = TempDir::new("dt-extract-extract").unwrap();
        let config = config_in(&tmp);
        std::fs::remove_file(tmp.path().join("stations_sfc.csv")).unwrap();

        assert!(matches!(
            ExtractDt::new(&config, LogConfig::default()),
            Err(DtExtractErr::MissingFile(_))
        ));
    }

    #[test]
    fn test_unknown_paramtypes_are_skipped() {
        let tmp = TempDir::new("dt-extract-extract").unwrap();
        let mut config = config_in(&tmp);
        config.extract_dt.paramtypes = vec!["ua".to_owned(), "ml".to_owned()];

        let task = ExtractDt::new(&config, LogConfig::default()).unwrap();
        assert_eq!(task.categories(), &[Category::UpperAir]);
    }

    #[test]
    fn test_retries_exhausted() {
        let tmp = TempDir::new("dt-extract-extract").unwrap();
        let task = ExtractDt::new(&config_in(&tmp), LogConfig::default())
            .unwrap()
            .with_attempt(2);
        write_grib(&task, &[]);

        let converter = FakeConverter::default();
        assert!(task.retries_exhausted());
        assert_eq!(
            task.execute_with(&converter).unwrap(),
            Extraction::SkippedRetriesExhausted
        );
        assert!(converter.jobs.borrow().is_empty());
    }

    #[test]
    fn test_last_try_without_continue_on_fail() {
        let tmp = TempDir::new("dt-extract-extract").unwrap();
        let mut config = config_in(&tmp);
        config.extract_dt.continue_on_fail = false;

        let task = ExtractDt::new(&config, LogConfig::default())
            .unwrap()
            .with_attempt(5);
        assert!(!task.retries_exhausted());
    }

    #[test]
    fn test_converts_every_file() {
        let tmp = TempDir::new("dt-extract-extract").unwrap();
        let task = ExtractDt::new(&config_in(&tmp), "debug".parse().unwrap())
            .unwrap()
            .with_attempt(1);
        write_grib(&task, &[]);

        let converter = FakeConverter::default();
        let result = task.execute_with(&converter).unwrap();
        assert_eq!(
            result,
            Extraction::Done {
                converted: 14,
                missing: vec![],
            }
        );

        let jobs = converter.jobs.borrow();
        let (infile, category, stations, level) = &jobs[7];
        assert_eq!(infile, &tmp.path().join("grib/20240305/ua_0.grib1"));
        assert_eq!(*category, Category::UpperAir);
        assert!(stations.ends_with("stations_ua.csv"));
        assert_eq!(*level, "DEBUG");
    }

    #[test]
    fn test_lenient_skips_missing_files() {
        let tmp = TempDir::new("dt-extract-extract").unwrap();
        let mut config = config_in(&tmp);
        config.extractsqlite.log_file = Some("logs/extract.log".to_owned());

        let task = ExtractDt::new(&config, LogConfig::default())
            .unwrap()
            .with_attempt(1)
            .with_policy(MissingFilePolicy::Lenient);
        write_grib(&task, &["sfc_3.grib1"]);

        let converter = FakeConverter::default();
        let missing_file = task.dt_path.join("sfc_3.grib1");
        assert_eq!(
            task.execute_with(&converter).unwrap(),
            Extraction::Done {
                converted: 13,
                missing: vec![missing_file.clone()],
            }
        );

        let log = std::fs::read_to_string(tmp.path().join("sqlite/logs/extract.log")).unwrap();
        assert_eq!(log.lines().count(), 15);
        assert!(log.contains(&format!(
            "File not found, skipping: {}",
            missing_file.display()
        )));
    }

    #[test]
    fn test_strict_stops_at_missing_file() {
        let tmp = TempDir::new("dt-extract-extract").unwrap();
        let task = ExtractDt::new(&config_in(&tmp), LogConfig::default())
            .unwrap()
            .with_attempt(1)
            .with_policy(MissingFilePolicy::Strict);
        write_grib(&task, &["sfc_3.grib1"]);

        let converter = FakeConverter::default();
        match task.execute_with(&converter) {
            Err(DtExtractErr::MissingFile(path)) => assert!(path.ends_with("sfc_3.grib1")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(converter.jobs.borrow().len(), 3);

        // No log file unless one is configured.
        assert!(!tmp.path().join("sqlite").exists());
    }
}
