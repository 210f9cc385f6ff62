//! Module for errors.
use std::{error::Error, fmt::Display, path::PathBuf};

/// Error from retrieving, extracting or scheduling DT data.
#[derive(Debug)]
pub enum DtExtractErr {
    // Inherited errors from std
    /// Error forwarded from std
    IO(::std::io::Error),

    // Other forwarded errors
    /// Error parsing the TOML configuration
    Toml(::toml::de::Error),
    /// Error parsing a JSON parameter list
    Json(::serde_json::Error),
    /// Error reading a station list
    Csv(::csv::Error),
    /// Error talking to the Polytope service
    Http(::reqwest::Error),
    /// Error parsing a date or time
    DateTime(::chrono::ParseError),

    // My own errors from this crate
    /// The configuration is inconsistent or incomplete.
    Config(String),
    /// A duration string could not be understood.
    InvalidDuration(String),
    /// A path template referenced a macro that has no value.
    UnresolvedMacro(String),
    /// A required file was not present.
    MissingFile(PathBuf),
    /// An external program exited unsuccessfully.
    CommandFailed {
        /// The command line that was run
        command: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
    },
    /// The Polytope service refused or failed a request.
    Polytope(String),
    /// A processing step this crate does not provide yet.
    NotImplemented(&'static str),
}

impl Display for DtExtractErr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        use crate::errors::DtExtractErr::*;

        match self {
            IO(err) => write!(f, "std lib io error: {}", err),

            Toml(err) => write!(f, "configuration parse error: {}", err),
            Json(err) => write!(f, "json error: {}", err),
            Csv(err) => write!(f, "csv error: {}", err),
            Http(err) => write!(f, "http error: {}", err),
            DateTime(err) => write!(f, "date/time parse error: {}", err),

            Config(msg) => write!(f, "configuration error: {}", msg),
            InvalidDuration(val) => write!(f, "invalid duration: {}", val),
            UnresolvedMacro(name) => write!(f, "no value for macro @{}@", name),
            MissingFile(path) => write!(f, "missing file: {}", path.display()),
            CommandFailed {
                command,
                code: Some(code),
            } => write!(f, "command `{}` failed with exit code {}", command, code),
            CommandFailed {
                command,
                code: None,
            } => write!(f, "command `{}` was terminated by a signal", command),
            Polytope(msg) => write!(f, "polytope error: {}", msg),
            NotImplemented(what) => write!(f, "not implemented: {}", what),
        }
    }
}

impl Error for DtExtractErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use crate::errors::DtExtractErr::*;

        match self {
            IO(err) => Some(err),
            Toml(err) => Some(err),
            Json(err) => Some(err),
            Csv(err) => Some(err),
            Http(err) => Some(err),
            DateTime(err) => Some(err),
            _ => None,
        }
    }
}

impl From<::std::io::Error> for DtExtractErr {
    fn from(err: ::std::io::Error) -> DtExtractErr {
        DtExtractErr::IO(err)
    }
}

impl From<::toml::de::Error> for DtExtractErr {
    fn from(err: ::toml::de::Error) -> DtExtractErr {
        DtExtractErr::Toml(err)
    }
}

impl From<::serde_json::Error> for DtExtractErr {
    fn from(err: ::serde_json::Error) -> DtExtractErr {
        DtExtractErr::Json(err)
    }
}

impl From<::csv::Error> for DtExtractErr {
    fn from(err: ::csv::Error) -> DtExtractErr {
        DtExtractErr::Csv(err)
    }
}

impl From<::reqwest::Error> for DtExtractErr {
    fn from(err: ::reqwest::Error) -> DtExtractErr {
        DtExtractErr::Http(err)
    }
}

impl From<::chrono::ParseError> for DtExtractErr {
    fn from(err: ::chrono::ParseError) -> DtExtractErr {
        DtExtractErr::DateTime(err)
    }
}

