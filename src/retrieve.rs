//! Retrieval of DT GRIB data for one cycle.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use tracing::info;

use crate::{
    category::{Category, Method},
    config::{Config, ExtractDtSection},
    errors::DtExtractErr,
    exec,
};

mod mars;
mod polytope;

pub use self::mars::{write_mars_request, MarsBackend, MarsVerb};
pub use self::polytope::PolytopeBackend;

/// A retrieval request: named fields in the order they were added.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    fields: Vec<(String, String)>,
}

impl Request {
    /// An empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier value but keeping its position.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some(field) => field.1 = value.to_owned(),
            None => self.fields.push((key.to_owned(), value.to_owned())),
        }
    }

    /// Get the value of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Is a field present?
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The field names, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// The fields, in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}

/// Something that can fetch the data described by a request.
pub trait RetrievalBackend {
    /// Fetch the data of `category`, leaving one `{tag}_{step}.grib1` file per step in `workdir`.
    fn retrieve(
        &self,
        request: &Request,
        category: Category,
        workdir: &Path,
    ) -> Result<(), DtExtractErr>;
}

// The part of a request that depends on the data category.
struct CategoryFields<'a> {
    param: &'a str,
    levtype: &'a str,
    levelist: Option<&'a str>,
    grid: &'a str,
}

impl<'a> CategoryFields<'a> {
    fn lookup(section: &'a ExtractDtSection, category: Category) -> Self {
        match category {
            Category::Surface => CategoryFields {
                param: &section.param_sfc,
                levtype: "SFC",
                levelist: None,
                grid: &section.grid_sfc,
            },
            Category::UpperAir => CategoryFields {
                param: &section.param_ua,
                levtype: &section.levtype_ua,
                levelist: Some(&section.levelist_ua),
                grid: &section.grid_ua,
            },
        }
    }
}

/// The retrieval task for one cycle.
#[derive(Clone, Debug)]
pub struct RetrieveDt {
    method: Method,
    basetime: NaiveDateTime,
    steps: Vec<String>,
    dt_path: PathBuf,
    workdir: PathBuf,
    unix_group: Option<String>,
    section: ExtractDtSection,
}

impl RetrieveDt {
    /// Set up the task from the configuration. Every cycle gets its own working directory.
    pub fn new(config: &Config) -> Result<Self, DtExtractErr> {
        let method = config.method()?;
        let basetime = config.basetime()?;
        let steps = config.steps()?;
        let dt_path = config.dt_path()?;
        let workdir = config.workdir()?;

        info!("DT PATH: {}", dt_path.display());
        info!("WORKDIR: {}", workdir.display());
        info!("MIN/MAX STEP: 0 {}", steps.len() - 1);

        Ok(RetrieveDt {
            method,
            basetime,
            steps,
            dt_path,
            workdir,
            unix_group: config.general.unix_group.clone(),
            section: config.extract_dt.clone(),
        })
    }

    /// Use another directory for the files the backend writes.
    pub fn with_workdir(self, workdir: &dyn AsRef<Path>) -> Self {
        RetrieveDt {
            workdir: workdir.as_ref().to_path_buf(),
            ..self
        }
    }

    /// Where the backend writes before files are moved.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Where the retrieved files end up.
    pub fn dt_path(&self) -> &Path {
        &self.dt_path
    }

    /// The forecast steps retrieved.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Build the request for one category.
    pub fn create_request(&self, category: Category) -> Result<Request, DtExtractErr> {
        let mut request = Request::new();

        request.set("type", "FC");
        request.set("step", &self.steps.join("/"));
        request.set("stream", "OPER");
        request.set("time", "00");
        request.set("date", &self.basetime.format("%Y%m%d").to_string());
        request.set("target", &category.target_pattern());
        request.set("process", "LOCAL");

        match self.method {
            Method::Mars => {
                request.set("class", required(&self.section.class_mars, "class_mars")?);
                request.set("expver", required(&self.section.expver_mars, "expver_mars")?);
            }
            Method::Polytope => {
                request.set("dataset", "extremes-dt");
                request.set(
                    "class",
                    required(&self.section.class_polytope, "class_polytope")?,
                );
                request.set(
                    "expver",
                    required(&self.section.expver_polytope, "expver_polytope")?,
                );
            }
        }

        let fields = CategoryFields::lookup(&self.section, category);
        request.set("param", fields.param);
        request.set("levtype", fields.levtype);
        if let Some(levelist) = fields.levelist {
            request.set("levelist", levelist);
        }
        request.set("grid", fields.grid);

        Ok(request)
    }

    /// Run the task with the configured retrieval method.
    pub fn execute(&self) -> Result<(), DtExtractErr> {
        match self.method {
            Method::Mars => self.execute_with(&MarsBackend::new(&self.section)),
            Method::Polytope => {
                let backend = PolytopeBackend::new(&self.section, &self.dt_path)?;
                self.execute_with(&backend)
            }
        }
    }

    /// Run the task with a specific backend.
    pub fn execute_with(&self, backend: &dyn RetrievalBackend) -> Result<(), DtExtractErr> {
        exec::make_dirs(&self.dt_path, self.unix_group.as_deref())?;
        std::fs::create_dir_all(&self.workdir)?;

        for category in Category::ALL.iter().copied() {
            let request = self.create_request(category)?;
            backend.retrieve(&request, category, &self.workdir)?;
            self.relocate(category)?;
        }

        Ok(())
    }

    // Move the retrieved files from the working directory into the cycle directory.
    fn relocate(&self, category: Category) -> Result<(), DtExtractErr> {
        for step in &self.steps {
            let file_name = category.grib_file_name(step);
            let from = self.workdir.join(&file_name);
            let to = self.dt_path.join(&file_name);

            if !from.is_file() {
                return Err(DtExtractErr::MissingFile(from));
            }

            info!("MOVING {}", file_name);
            if std::fs::rename(&from, &to).is_err() {
                // Different file systems, fall back to copying.
                std::fs::copy(&from, &to)?;
                std::fs::remove_file(&from)?;
            }
        }

        Ok(())
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, DtExtractErr> {
    value
        .as_deref()
        .ok_or_else(|| DtExtractErr::Config(format!("extract_dt.{} is not set", key)))
}

/// Which of `steps` have no `prefix+SS` file in `path`, joined with `/` for use in a request.
///
/// Steps are written with two digits when a directory is given and as plain numbers otherwise.
pub fn check_file_exists<S: AsRef<str>>(steps: &[S], path: &str, prefix: &str) -> String {
    let missing: Vec<&str> = steps
        .iter()
        .map(AsRef::as_ref)
        .filter(|step| {
            let step_str = match step.trim().parse::<i64>() {
                Ok(num) if path.is_empty() => num.to_string(),
                Ok(num) => format!("{:02}", num),
                Err(_) => step.to_string(),
            };

            let file = Path::new(path).join(format!("{}+{}", prefix, step_str));
            if file.exists() {
                false
            } else {
                info!("Missing file:{}", file.display());
                true
            }
        })
        .collect();

    missing.join("/")
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;
    use crate::{config::TEST_CONFIG, times::parse_basetime};

    use std::{cell::RefCell, collections::HashSet};

    use tempdir::TempDir;

    fn test_config() -> Config {
        TEST_CONFIG.parse().expect("test config does not parse")
    }

    fn key_set(request: &Request) -> HashSet<&str> {
        request.keys().collect()
    }

    #[test]
    fn test_mars_surface_request() {
        let task = RetrieveDt::new(&test_config()).unwrap();
        let request = task.create_request(Category::Surface).unwrap();

        let expected: HashSet<&str> = [
            "type", "step", "stream", "time", "date", "target", "process", "class", "expver",
            "param", "levtype", "grid",
        ]
        .iter()
        .copied()
        .collect();
        assert_eq!(key_set(&request), expected);
        assert!(!request.contains_key("dataset"));
        assert!(!request.contains_key("levelist"));

        assert_eq!(request.get("step"), Some("0/1/2/3/4/5/6"));
        assert_eq!(request.get("date"), Some("20240305"));
        assert_eq!(request.get("target"), Some("\"sfc_[STEP].grib1\""));
        assert_eq!(request.get("class"), Some("D1"));
        assert_eq!(request.get("param"), Some("167/168/165/166"));
        assert_eq!(request.get("levtype"), Some("SFC"));
        assert_eq!(request.get("grid"), Some("0.1/0.1"));
    }

    #[test]
    fn test_mars_upper_air_request() {
        let task = RetrieveDt::new(&test_config()).unwrap();
        let sfc = task.create_request(Category::Surface).unwrap();
        let ua = task.create_request(Category::UpperAir).unwrap();

        let mut expected = key_set(&sfc);
        expected.insert("levelist");
        assert_eq!(key_set(&ua), expected);

        assert_eq!(ua.get("param"), Some("130/157"));
        assert_eq!(ua.get("levtype"), Some("PL"));
        assert_eq!(ua.get("levelist"), Some("1000/925/850/700/500"));
        assert_eq!(ua.get("grid"), Some("0.25/0.25"));

        // Field order is the order written to a request file.
        let keys: Vec<&str> = ua.keys().collect();
        assert_eq!(&keys[..3], &["type", "step", "stream"]);
        assert_eq!(&keys[keys.len() - 4..], &["param", "levtype", "levelist", "grid"]);
    }

    #[test]
    fn test_polytope_request() {
        let mut config = test_config();
        config.extract_dt.method = "polytope".to_owned();

        let task = RetrieveDt::new(&config).unwrap();
        let request = task.create_request(Category::Surface).unwrap();

        assert_eq!(request.get("dataset"), Some("extremes-dt"));
        assert_eq!(request.get("class"), Some("d1"));
        assert_eq!(request.get("expver"), Some("0001"));
        assert!(!request.contains_key("levelist"));

        let ua = task.create_request(Category::UpperAir).unwrap();
        let expected: HashSet<&str> = [
            "type", "step", "stream", "time", "date", "target", "process", "dataset", "class",
            "expver", "param", "levtype", "levelist", "grid",
        ]
        .iter()
        .copied()
        .collect();
        assert_eq!(key_set(&ua), expected);
        assert_eq!(ua.get("class"), Some("d1"));
        assert_eq!(ua.get("expver"), Some("0001"));
        assert_eq!(ua.get("levelist"), Some("1000/925/850/700/500"));
        assert_eq!(ua.get("target"), Some("\"ua_[STEP].grib1\""));

        config.extract_dt.expver_polytope = Some("0002".to_owned());
        let task = RetrieveDt::new(&config).unwrap();
        let request = task.create_request(Category::UpperAir).unwrap();
        assert_eq!(request.get("expver"), Some("0002"));

        config.extract_dt.expver_polytope = None;
        let task = RetrieveDt::new(&config).unwrap();
        assert!(matches!(
            task.create_request(Category::Surface),
            Err(DtExtractErr::Config(_))
        ));
    }

    #[test]
    fn test_workdir_per_cycle() {
        let mut config = test_config();
        let current = RetrieveDt::new(&config).unwrap();

        config.set_basetime(&parse_basetime("2024030400").unwrap());
        let rerun = RetrieveDt::new(&config).unwrap();

        assert_ne!(current.workdir(), rerun.workdir());
        assert_eq!(current.workdir(), current.dt_path().join("work"));
        assert_eq!(rerun.workdir(), Path::new("/scratch/dt/grib/20240304/work"));
    }

    #[test]
    fn test_missing_class() {
        let mut config = test_config();
        config.extract_dt.class_mars = None;

        let task = RetrieveDt::new(&config).unwrap();
        assert!(matches!(
            task.create_request(Category::Surface),
            Err(DtExtractErr::Config(_))
        ));
    }

    // Writes the files a real archive would, and remembers what it was asked for.
    struct FakeBackend {
        steps: Vec<String>,
        fail_on: Option<Category>,
        calls: RefCell<Vec<Category>>,
    }

    impl RetrievalBackend for FakeBackend {
        fn retrieve(
            &self,
            request: &Request,
            category: Category,
            workdir: &Path,
        ) -> Result<(), DtExtractErr> {
            self.calls.borrow_mut().push(category);
            if self.fail_on == Some(category) {
                return Err(DtExtractErr::CommandFailed {
                    command: "mars".to_owned(),
                    code: Some(1),
                });
            }

            assert_eq!(request.get("target"), Some(category.target_pattern().as_str()));
            for step in &self.steps {
                std::fs::write(workdir.join(category.grib_file_name(step)), b"GRIB")?;
            }
            Ok(())
        }
    }

    fn task_in(tmp: &TempDir) -> RetrieveDt {
        let mut config = test_config();
        config.macros.insert(
            "SCRATCH".to_owned(),
            tmp.path().to_string_lossy().into_owned(),
        );

        let workdir = tmp.path().join("work");
        std::fs::create_dir_all(&workdir).unwrap();

        RetrieveDt::new(&config).unwrap().with_workdir(&workdir)
    }

    #[test]
    fn test_execute_relocates_files() {
        let tmp = TempDir::new("dt-extract-retrieve").unwrap();
        let task = task_in(&tmp);

        let backend = FakeBackend {
            steps: task.steps().to_vec(),
            fail_on: None,
            calls: RefCell::new(vec![]),
        };
        task.execute_with(&backend).expect("Error retrieving.");

        assert_eq!(*backend.calls.borrow(), vec![Category::Surface, Category::UpperAir]);

        let dt_path = tmp.path().join("grib").join("20240305");
        assert_eq!(task.dt_path(), dt_path.as_path());
        for cat in &Category::ALL {
            for step in task.steps() {
                let name = cat.grib_file_name(step);
                assert!(dt_path.join(&name).is_file(), "{} not relocated", name);
                assert!(!tmp.path().join("work").join(&name).exists());
            }
        }
    }

    #[test]
    fn test_execute_in_cycle_workdir() {
        let tmp = TempDir::new("dt-extract-retrieve").unwrap();
        let mut config = test_config();
        config.macros.insert(
            "SCRATCH".to_owned(),
            tmp.path().to_string_lossy().into_owned(),
        );
        let task = RetrieveDt::new(&config).unwrap();

        let backend = FakeBackend {
            steps: task.steps().to_vec(),
            fail_on: None,
            calls: RefCell::new(vec![]),
        };
        task.execute_with(&backend).unwrap();

        assert!(task.workdir().is_dir());
        assert!(task.workdir().starts_with(task.dt_path()));
        assert!(task.dt_path().join("ua_6.grib1").is_file());
        assert!(!task.workdir().join("ua_6.grib1").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unknown_unix_group() {
        let tmp = TempDir::new("dt-extract-retrieve").unwrap();
        let mut config = test_config();
        config.macros.insert(
            "SCRATCH".to_owned(),
            tmp.path().to_string_lossy().into_owned(),
        );
        config.general.unix_group = Some("surely-not-a-real-group-name".to_owned());
        let task = RetrieveDt::new(&config).unwrap();

        let backend = FakeBackend {
            steps: task.steps().to_vec(),
            fail_on: None,
            calls: RefCell::new(vec![]),
        };
        assert!(matches!(
            task.execute_with(&backend),
            Err(DtExtractErr::CommandFailed { .. })
        ));
        assert!(backend.calls.borrow().is_empty());
    }

    #[test]
    fn test_backend_failure_is_fatal() {
        let tmp = TempDir::new("dt-extract-retrieve").unwrap();
        let task = task_in(&tmp);

        let backend = FakeBackend {
            steps: task.steps().to_vec(),
            fail_on: Some(Category::Surface),
            calls: RefCell::new(vec![]),
        };

        assert!(matches!(
            task.execute_with(&backend),
            Err(DtExtractErr::CommandFailed { .. })
        ));
        assert_eq!(*backend.calls.borrow(), vec![Category::Surface]);
        // The output directory is created before anything is fetched.
        assert!(task.dt_path().is_dir());
    }

    #[test]
    fn test_incomplete_retrieval() {
        let tmp = TempDir::new("dt-extract-retrieve").unwrap();
        let task = task_in(&tmp);

        let backend = FakeBackend {
            steps: vec!["0".to_owned(), "1".to_owned()],
            fail_on: None,
            calls: RefCell::new(vec![]),
        };

        match task.execute_with(&backend) {
            Err(DtExtractErr::MissingFile(path)) => {
                assert!(path.ends_with("sfc_2.grib1"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_file_exists() {
        let tmp = TempDir::new("dt-extract-check").unwrap();
        let path = tmp.path().to_string_lossy().into_owned();

        std::fs::write(tmp.path().join("ICMSH+01"), b"").unwrap();

        assert_eq!(check_file_exists(&["0", "1", "2"], &path, "ICMSH"), "0/2");
        assert_eq!(check_file_exists(&["1"], &path, "ICMSH"), "");
        assert_eq!(check_file_exists::<&str>(&[], &path, "ICMSH"), "");
        assert_eq!(check_file_exists(&["3"], "", "surely_not_present"), "3");
    }

    #[test]
    fn test_request_display_and_set() {
        let mut request = Request::new();
        request.set("type", "FC");
        request.set("step", "0");
        request.set("type", "AN");

        assert_eq!(request.len(), 2);
        assert_eq!(request.to_string(), "{type: AN, step: 0}");
    }
}
