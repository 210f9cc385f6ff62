//! Station and parameter tables handed to the converter.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::{category::Category, config::Config, errors::DtExtractErr};

/// One row of a station list.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Station {
    #[serde(rename = "SID", alias = "sid")]
    pub sid: String,
    #[serde(alias = "LAT")]
    pub lat: f64,
    #[serde(alias = "LON")]
    pub lon: f64,
    #[serde(default, alias = "ELEV", alias = "elevation")]
    pub elev: Option<f64>,
    #[serde(default, alias = "NAME")]
    pub name: Option<String>,
}

/// A station list read from a comma separated file with a header row.
#[derive(Clone, Debug)]
pub struct StationList {
    path: PathBuf,
    stations: Vec<Station>,
}

impl StationList {
    /// Read a station list. Spaces around fields are ignored.
    pub fn load(path: &Path) -> Result<Self, DtExtractErr> {
        if !path.is_file() {
            return Err(DtExtractErr::MissingFile(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let stations = reader
            .deserialize()
            .collect::<Result<Vec<Station>, csv::Error>>()?;

        if stations.is_empty() {
            return Err(DtExtractErr::Config(format!(
                "no stations in {}",
                path.display()
            )));
        }

        Ok(StationList {
            path: path.to_path_buf(),
            stations,
        })
    }

    /// The file the list came from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stations.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }
}

/// A parameter list: a JSON object describing the fields to extract.
#[derive(Clone, Debug)]
pub struct ParameterList {
    path: PathBuf,
    parameters: serde_json::Map<String, serde_json::Value>,
}

impl ParameterList {
    /// Read and check a parameter list.
    pub fn load(path: &Path) -> Result<Self, DtExtractErr> {
        if !path.is_file() {
            return Err(DtExtractErr::MissingFile(path.to_path_buf()));
        }

        let text = std::fs::read_to_string(path)?;
        match serde_json::from_str(&text)? {
            serde_json::Value::Object(parameters) => Ok(ParameterList {
                path: path.to_path_buf(),
                parameters,
            }),
            _ => Err(DtExtractErr::Config(format!(
                "parameter list {} is not a JSON object",
                path.display()
            ))),
        }
    }

    /// The file the list came from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the parameters.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// The tables for one data category.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct CategoryReference {
    pub stations: StationList,
    pub parameters: ParameterList,
}

impl CategoryReference {
    fn load(stations: &Path, parameters: &Path) -> Result<Self, DtExtractErr> {
        let stations = StationList::load(stations)?;
        info!(
            "Station list: {} ({} stations)",
            stations.path().display(),
            stations.stations().len()
        );

        let parameters = ParameterList::load(parameters)?;
        info!(
            "Parameter list: {} ({} parameters)",
            parameters.path().display(),
            parameters.len()
        );

        Ok(CategoryReference {
            stations,
            parameters,
        })
    }
}

/// Reference tables, either shared by all categories or one set per category.
#[derive(Clone, Debug)]
pub enum ReferenceTables {
    /// `station_list` and `parameter_list` serve every category.
    Unified(CategoryReference),
    /// `station_list_sfc`, `parameter_list_sfc` and the `_ua` counterparts.
    PerCategory {
        /// Tables for surface data.
        surface: CategoryReference,
        /// Tables for upper air data.
        upper_air: CategoryReference,
    },
}

impl ReferenceTables {
    /// Resolve, check and load the tables named in the configuration. Per category keys win over
    /// the unified ones.
    pub fn load(config: &Config) -> Result<Self, DtExtractErr> {
        let section = &config.extractsqlite;

        let per_category = [
            &section.station_list_sfc,
            &section.station_list_ua,
            &section.parameter_list_sfc,
            &section.parameter_list_ua,
        ]
        .iter()
        .any(|key| key.is_some());

        let resolve = |value: &Option<String>, key: &str| -> Result<PathBuf, DtExtractErr> {
            let template = value.as_deref().ok_or_else(|| {
                DtExtractErr::Config(format!("extractsqlite.{} is not set", key))
            })?;
            config.path(template)
        };

        if per_category {
            Ok(ReferenceTables::PerCategory {
                surface: CategoryReference::load(
                    &resolve(&section.station_list_sfc, "station_list_sfc")?,
                    &resolve(&section.parameter_list_sfc, "parameter_list_sfc")?,
                )?,
                upper_air: CategoryReference::load(
                    &resolve(&section.station_list_ua, "station_list_ua")?,
                    &resolve(&section.parameter_list_ua, "parameter_list_ua")?,
                )?,
            })
        } else {
            Ok(ReferenceTables::Unified(CategoryReference::load(
                &resolve(&section.station_list, "station_list")?,
                &resolve(&section.parameter_list, "parameter_list")?,
            )?))
        }
    }

    /// The tables to use for a category.
    pub fn for_category(&self, category: Category) -> &CategoryReference {
        match (self, category) {
            (ReferenceTables::Unified(tables), _) => tables,
            (ReferenceTables::PerCategory { surface, .. }, Category::Surface) => surface,
            (ReferenceTables::PerCategory { upper_air, .. }, Category::UpperAir) => upper_air,
        }
    }
}


/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
