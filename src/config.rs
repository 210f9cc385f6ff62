//! The TOML configuration shared by the suite generator and the tasks.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;

use crate::{
    category::Method,
    errors::DtExtractErr,
    times::{parse_basetime, parse_duration, step_list},
};

/// The complete configuration file.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Case name and forecast times.
    pub general: General,
    /// Values for `@NAME@` macros in path templates.
    #[serde(default)]
    pub macros: BTreeMap<String, String>,
    /// Where ecFlow keeps its files and how tasks are retried.
    #[serde(default)]
    pub scheduler: Scheduler,
    /// Retrieval settings.
    pub extract_dt: ExtractDtSection,
    /// Point extraction settings.
    pub extractsqlite: ExtractSqliteSection,
}

/// The `[general]` section.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize)]
pub struct General {
    #[serde(default = "General::default_case")]
    pub case: String,
    #[serde(default = "General::default_loglevel")]
    pub loglevel: String,
    /// Group given to the directories the suite and the tasks create.
    #[serde(default)]
    pub unix_group: Option<String>,
    pub times: Times,
}

impl General {
    fn default_case() -> String {
        "DT_extract".to_owned()
    }

    fn default_loglevel() -> String {
        "info".to_owned()
    }
}

/// The `[general.times]` section. Times are kept as text and parsed on use.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize)]
pub struct Times {
    pub start: String,
    pub end: String,
    pub basetime: String,
    pub forecast_range: String,
}

/// The `[scheduler]` section.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Scheduler {
    pub ecf_home: Option<String>,
    pub ecf_files: Option<String>,
    pub ecf_include: Option<String>,
    pub joboutdir: Option<String>,
    pub ecf_host: Option<String>,
    pub ecf_port: Option<u16>,
    /// Path of the task runner called from the job scripts.
    pub dtrun: Option<String>,
    /// A job script template replacing the built-in one.
    pub input_template: Option<String>,
    #[serde(default)]
    pub ecfvars: EcfVars,
}

/// The `[scheduler.ecfvars]` section.
#[derive(Clone, Debug, Deserialize)]
pub struct EcfVars {
    /// Number of times ecFlow will try a task before leaving it aborted.
    #[serde(default = "EcfVars::default_tries")]
    pub ecf_tries: u32,
}

impl EcfVars {
    fn default_tries() -> u32 {
        1
    }
}

impl Default for EcfVars {
    fn default() -> Self {
        EcfVars {
            ecf_tries: Self::default_tries(),
        }
    }
}

/// What to do when an expected GRIB file is not there at extraction time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFilePolicy {
    /// Stop the task with an error.
    Strict,
    /// Log the missing file and carry on with the next one.
    Lenient,
}

impl Default for MissingFilePolicy {
    fn default() -> Self {
        MissingFilePolicy::Lenient
    }
}

/// The `[extract_dt]` section.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize)]
pub struct ExtractDtSection {
    pub method: String,
    pub delay: String,
    pub dt_grib_path: String,
    /// Directory the backend writes into before files are moved to `dt_grib_path`. Defaults to
    /// `work` inside the cycle directory.
    #[serde(default)]
    pub workdir: Option<String>,
    pub param_sfc: String,
    pub param_ua: String,
    pub grid_sfc: String,
    pub grid_ua: String,
    pub levtype_ua: String,
    pub levelist_ua: String,
    #[serde(default)]
    pub class_mars: Option<String>,
    #[serde(default)]
    pub expver_mars: Option<String>,
    #[serde(default)]
    pub class_polytope: Option<String>,
    #[serde(default)]
    pub expver_polytope: Option<String>,
    #[serde(default)]
    pub continue_on_fail: bool,
    #[serde(default = "ExtractDtSection::default_paramtypes")]
    pub paramtypes: Vec<String>,
    #[serde(default)]
    pub missing_file_policy: MissingFilePolicy,
    #[serde(default = "ExtractDtSection::default_mars_bin")]
    pub mars_bin: String,
    /// Command prefix for the retrieval binary, e.g. `srun -n 1`.
    #[serde(default)]
    pub wrapper: Option<String>,
    #[serde(default = "ExtractDtSection::default_polytope_address")]
    pub polytope_address: String,
    #[serde(default = "ExtractDtSection::default_polytope_collection")]
    pub polytope_collection: String,
}

impl ExtractDtSection {
    fn default_paramtypes() -> Vec<String> {
        vec!["sfc".to_owned(), "ua".to_owned()]
    }

    fn default_mars_bin() -> String {
        "mars".to_owned()
    }

    fn default_polytope_address() -> String {
        "polytope.lumi.apps.dte.destination-earth.eu".to_owned()
    }

    fn default_polytope_collection() -> String {
        "ecmwf-destination-earth".to_owned()
    }
}

/// The `[extractsqlite]` section.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize)]
pub struct ExtractSqliteSection {
    pub sqlite_path: String,
    pub sqlite_template: String,
    #[serde(default)]
    pub station_list: Option<String>,
    #[serde(default)]
    pub station_list_sfc: Option<String>,
    #[serde(default)]
    pub station_list_ua: Option<String>,
    #[serde(default)]
    pub parameter_list: Option<String>,
    #[serde(default)]
    pub parameter_list_sfc: Option<String>,
    #[serde(default)]
    pub parameter_list_ua: Option<String>,
    #[serde(default = "ExtractSqliteSection::default_model_name")]
    pub sqlite_model_name: String,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "ExtractSqliteSection::default_converter")]
    pub converter_bin: String,
}

impl ExtractSqliteSection {
    fn default_model_name() -> String {
        "DT".to_owned()
    }

    fn default_converter() -> String {
        "grib2sqlite".to_owned()
    }
}

impl FromStr for Config {
    type Err = DtExtractErr;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(text)?)
    }
}

impl Config {
    /// Load a configuration file.
    pub fn load(path: &dyn AsRef<Path>) -> Result<Self, DtExtractErr> {
        let text = std::fs::read_to_string(path.as_ref())?;
        text.parse()
    }

    /// The base time of the cycle being processed.
    pub fn basetime(&self) -> Result<NaiveDateTime, DtExtractErr> {
        parse_basetime(&self.general.times.basetime)
    }

    /// Replace the base time, as done for every cycle of the daily loop.
    pub fn set_basetime(&mut self, basetime: &NaiveDateTime) {
        self.general.times.basetime = basetime.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    }

    /// First and last date of the loop.
    pub fn loop_range(&self) -> Result<(NaiveDateTime, NaiveDateTime), DtExtractErr> {
        let start = parse_basetime(&self.general.times.start)?;
        let end = parse_basetime(&self.general.times.end)?;

        if start.date() > end.date() {
            return Err(DtExtractErr::Config(format!(
                "start {} is after end {}",
                self.general.times.start, self.general.times.end
            )));
        }

        Ok((start, end))
    }

    /// The forecast length.
    pub fn forecast_range(&self) -> Result<Duration, DtExtractErr> {
        parse_duration(&self.general.times.forecast_range)
    }

    /// Forecast steps to retrieve and extract.
    pub fn steps(&self) -> Result<Vec<String>, DtExtractErr> {
        step_list(self.forecast_range()?)
    }

    /// How long after the nominal date data can be expected in the archive.
    pub fn delay(&self) -> Result<Duration, DtExtractErr> {
        let delay = parse_duration(&self.extract_dt.delay)?;
        if delay < Duration::zero() {
            return Err(DtExtractErr::InvalidDuration(self.extract_dt.delay.clone()));
        }
        Ok(delay)
    }

    /// The retrieval method.
    pub fn method(&self) -> Result<Method, DtExtractErr> {
        Method::from_str(&self.extract_dt.method).map_err(|_| {
            DtExtractErr::Config(format!("unknown retrieval method: {}", self.extract_dt.method))
        })
    }

    /// Directory for the GRIB files of the current cycle.
    pub fn dt_path(&self) -> Result<PathBuf, DtExtractErr> {
        let basetime = self.basetime()?;
        self.substitute(&self.extract_dt.dt_grib_path, Some(&basetime))
            .map(PathBuf::from)
    }

    /// Scratch directory for the retrieval of the current cycle.
    pub fn workdir(&self) -> Result<PathBuf, DtExtractErr> {
        match self.extract_dt.workdir {
            Some(ref template) => {
                let basetime = self.basetime()?;
                self.substitute(template, Some(&basetime)).map(PathBuf::from)
            }
            None => Ok(self.dt_path()?.join("work")),
        }
    }

    /// Expand `@NAME@` macros in a template.
    ///
    /// The base time macros `@YYYY@`, `@MM@`, `@DD@` and `@HH@` need a base time; `@CASE@` is the
    /// case name and everything else comes from the `[macros]` table.
    pub fn substitute(
        &self,
        template: &str,
        basetime: Option<&NaiveDateTime>,
    ) -> Result<String, DtExtractErr> {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('@') {
            result.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let close = match after.find('@') {
                Some(close) => close,
                None => {
                    // A lone '@' is literal text.
                    result.push_str(&rest[open..]);
                    rest = "";
                    break;
                }
            };

            let name = &after[..close];
            result.push_str(&self.macro_value(name, basetime)?);
            rest = &after[close + 1..];
        }
        result.push_str(rest);

        Ok(result)
    }

    fn macro_value(
        &self,
        name: &str,
        basetime: Option<&NaiveDateTime>,
    ) -> Result<String, DtExtractErr> {
        let time_format = match name {
            "YYYY" => Some("%Y"),
            "MM" => Some("%m"),
            "DD" => Some("%d"),
            "HH" => Some("%H"),
            _ => None,
        };

        match (time_format, basetime) {
            (Some(fmt), Some(basetime)) => Ok(basetime.format(fmt).to_string()),
            (Some(_), None) => Err(DtExtractErr::UnresolvedMacro(name.to_owned())),
            (None, _) if name == "CASE" => Ok(self.general.case.clone()),
            (None, _) => self
                .macros
                .get(name)
                .cloned()
                .ok_or_else(|| DtExtractErr::UnresolvedMacro(name.to_owned())),
        }
    }

    /// Substitute and convert to a path, for templates that do not depend on the base time.
    pub fn path(&self, template: &str) -> Result<PathBuf, DtExtractErr> {
        self.substitute(template, None).map(PathBuf::from)
    }
}

#[cfg(test)]
pub(crate) const TEST_CONFIG: &str = r#"
[general]
case = "DT_test"
loglevel = "debug"

[general.times]
start = "2024-03-01T00:00:00Z"
end = "2024-03-05T00:00:00Z"
basetime = "2024-03-05T00:00:00Z"
forecast_range = "PT6H"

[macros]
SCRATCH = "/scratch/dt"

[scheduler]
ecf_home = "@SCRATCH@/ecf"
joboutdir = "@SCRATCH@/jobout"
ecf_host = "ecflow.example"
ecf_port = 3141

[scheduler.ecfvars]
ecf_tries = 2

[extract_dt]
method = "mars"
delay = "P1DT2H"
dt_grib_path = "@SCRATCH@/grib/@YYYY@@MM@@DD@"
param_sfc = "167/168/165/166"
param_ua = "130/157"
grid_sfc = "0.1/0.1"
grid_ua = "0.25/0.25"
levtype_ua = "PL"
levelist_ua = "1000/925/850/700/500"
class_mars = "D1"
expver_mars = "0001"
class_polytope = "d1"
expver_polytope = "0001"
continue_on_fail = true
paramtypes = ["sfc", "ua"]

[extractsqlite]
sqlite_path = "@SCRATCH@/sqlite"
sqlite_template = "{MODEL}/{YYYY}/{MM}/FC{YYYY}{MM}{DD}{HH}_{PP}.sqlite"
station_list_sfc = "@SCRATCH@/stations_sfc.csv"
station_list_ua = "@SCRATCH@/stations_ua.csv"
parameter_list_sfc = "@SCRATCH@/param_sfc.json"
parameter_list_ua = "@SCRATCH@/param_ua.json"
"#;

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
