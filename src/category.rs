//! Data categories and retrieval methods.

use std::fmt;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// The kinds of data retrieved for each cycle.
///
/// The short tag (`sfc`, `ua`) names the request, the retrieved files and the reference tables
/// used when extracting them.
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumString, IntoStaticStr, EnumIter, Hash)]
pub enum Category {
    /// Single level fields at the surface.
    #[strum(to_string = "sfc", serialize = "SFC", serialize = "surface")]
    Surface,
    /// Fields on pressure (or other) levels above the surface.
    #[strum(
        to_string = "ua",
        serialize = "UA",
        serialize = "upper-air",
        serialize = "upper_air"
    )]
    UpperAir,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl Category {
    /// All categories in the order they are retrieved.
    pub const ALL: [Category; 2] = [Category::Surface, Category::UpperAir];

    /// The short tag used in file names and requests.
    pub fn tag(self) -> &'static str {
        self.into()
    }

    /// Name of a retrieved file for a single forecast step.
    pub fn grib_file_name(self, step: &str) -> String {
        format!("{}_{}.grib1", self.tag(), step)
    }

    /// The MARS style target pattern, expanded per step by the archive.
    pub fn target_pattern(self) -> String {
        format!("\"{}_[STEP].grib1\"", self.tag())
    }
}

/// The service used to fetch data.
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumString, IntoStaticStr, EnumIter, Hash)]
pub enum Method {
    /// The MARS archive, through the `mars` client binary.
    #[strum(to_string = "mars", serialize = "MARS")]
    Mars,
    /// The Polytope web service.
    #[strum(to_string = "polytope", serialize = "POLYTOPE")]
    Polytope,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name: &'static str = (*self).into();
        write!(f, "{}", name)
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
