//! Handing GRIB files to the point converter.

use std::path::{Path, PathBuf};

use crate::{
    category::Category, errors::DtExtractErr, exec, extract::reference::CategoryReference,
    logging::LogConfig,
};

/// Everything the converter needs for one GRIB file.
#[derive(Clone, Copy, Debug)]
pub struct ConversionJob<'a> {
    /// The GRIB file.
    pub infile: &'a Path,
    /// Category of the data in `infile`.
    pub category: Category,
    /// Stations and parameters for the category.
    pub reference: &'a CategoryReference,
    /// Output database path template, placeholders left for the converter.
    pub sqlite_template: &'a str,
    /// Model name stored with every record.
    pub model_name: &'a str,
}

/// Converts one GRIB file to station values in SQLite databases.
pub trait PointConverter {
    /// Convert the file described by `job`, logging at the level in `log`.
    fn convert(&self, job: &ConversionJob, log: &LogConfig) -> Result<(), DtExtractErr>;
}

/// Runs the external `grib2sqlite` program.
#[derive(Clone, Debug)]
pub struct Grib2Sqlite {
    program: PathBuf,
}

impl Grib2Sqlite {
    /// Use the converter at `program`, looked up in `PATH` if it is a bare name.
    pub fn new(program: &dyn AsRef<Path>) -> Self {
        Grib2Sqlite {
            program: program.as_ref().to_path_buf(),
        }
    }

    fn arguments(job: &ConversionJob, log: &LogConfig) -> Vec<String> {
        vec![
            "--infile".to_owned(),
            job.infile.to_string_lossy().into_owned(),
            "--param-list".to_owned(),
            job.reference
                .parameters
                .path()
                .to_string_lossy()
                .into_owned(),
            "--station-list".to_owned(),
            job.reference.stations.path().to_string_lossy().into_owned(),
            "--sqlite-template".to_owned(),
            job.sqlite_template.to_owned(),
            "--model-name".to_owned(),
            job.model_name.to_owned(),
            "--log-level".to_owned(),
            log.external_name().to_owned(),
        ]
    }
}

impl PointConverter for Grib2Sqlite {
    fn convert(&self, job: &ConversionJob, log: &LogConfig) -> Result<(), DtExtractErr> {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(Self::arguments(job, log));
        exec::run(&mut cmd)
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
