#![deny(missing_docs)]
//! Package to retrieve DT forecast data and extract it into point SQLite files, driven by an
//! ecFlow suite that runs one cycle per day.

//
// Public API
//
pub use crate::category::{Category, Method};
pub use crate::cmd_line::CommonCmdLineArgs;
pub use crate::config::{Config, MissingFilePolicy};
pub use crate::errors::DtExtractErr;
pub use crate::extract::{
    ConversionJob, ExtractDt, Extraction, Grib2Sqlite, PointConverter, ReferenceTables,
};
pub use crate::logging::LogConfig;
pub use crate::retrieve::{check_file_exists, RetrievalBackend, Request, RetrieveDt};
pub use crate::suite::{DailyLoopFamily, DtExtractSuite, RepeatDate, Suite, TimeGate, Trigger};

//
// Implementation only
//
pub mod category;
mod cmd_line;
pub mod config;
mod errors;
mod exec;
pub mod extract;
pub mod logging;
pub mod retrieve;
pub mod suite;
pub mod times;
