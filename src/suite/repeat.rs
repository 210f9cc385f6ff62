//! The daily loop: a family repeated once per calendar date.

use std::fmt;

use chrono::{Duration, NaiveDate};

use super::Family;
use crate::errors::DtExtractErr;

/// A `repeat date` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepeatDate {
    variable: String,
    start: NaiveDate,
    end: NaiveDate,
}

impl RepeatDate {
    /// Repeat over every date from `start` to `end`, inclusive.
    pub fn new(variable: &str, start: NaiveDate, end: NaiveDate) -> Result<Self, DtExtractErr> {
        if start > end {
            return Err(DtExtractErr::Config(format!(
                "date repeat {} starts after it ends ({} > {})",
                variable, start, end
            )));
        }

        Ok(RepeatDate {
            variable: variable.to_owned(),
            start,
            end,
        })
    }

    /// Name of the repeat variable.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Every date the repeat will visit.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        let num_days = (self.end - self.start).num_days();

        (0..=num_days).map(move |day| start + Duration::days(day))
    }
}

impl fmt::Display for RepeatDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "repeat date {} {} {}",
            self.variable,
            self.start.format("%Y%m%d"),
            self.end.format("%Y%m%d")
        )
    }
}

/// Shell expression turning a `YYYYMMDD` date variable into an ISO-8601 time stamp.
///
/// The repeat variable is only known when the job runs, so the value is left for the job's shell
/// to evaluate. The date is cut into pieces rather than read from the `_YYYY`, `_MM` and `_DD`
/// helper variables because those are not zero padded.
pub fn date_basher(variable: &str, time: &str, micro: char) -> String {
    let var = format!("{micro}{variable}{micro}", micro = micro, variable = variable);

    format!(
        "$(echo {var} | cut -c 1-4)-$(echo {var} | cut -c 5-6)-$(echo {var} | cut -c 7-8)T{time}Z",
        var = var,
        time = time
    )
}

/// What the expression from [`date_basher`] evaluates to at midnight for a given date.
pub fn cycle_timestamp(ymd: u32) -> Result<String, DtExtractErr> {
    let digits = ymd.to_string();
    if digits.len() != 8 {
        return Err(DtExtractErr::Config(format!("not a YYYYMMDD date: {}", ymd)));
    }

    Ok(format!(
        "{}-{}-{}T00:00:00Z",
        &digits[0..4],
        &digits[4..6],
        &digits[6..8]
    ))
}

/// Builds the family that runs its tasks once per date.
#[derive(Clone, Debug)]
pub struct DailyLoopFamily {
    name: String,
    loop_variable: String,
    start: NaiveDate,
    end: NaiveDate,
}

impl DailyLoopFamily {
    /// The variable with the cycle time stamp made visible to the tasks.
    pub const BASETIME_VARIABLE: &'static str = "BASETIME";
    /// Default name of the date repeat.
    pub const DEFAULT_LOOP_VARIABLE: &'static str = "YMD";

    /// A loop from `start` to `end`.
    pub fn new(name: &str, start: NaiveDate, end: NaiveDate) -> Self {
        DailyLoopFamily {
            name: name.to_owned(),
            loop_variable: Self::DEFAULT_LOOP_VARIABLE.to_owned(),
            start,
            end,
        }
    }

    /// Use another name for the repeat variable.
    pub fn with_loop_variable(self, loop_variable: &str) -> Self {
        DailyLoopFamily {
            loop_variable: loop_variable.to_owned(),
            ..self
        }
    }

    /// Name of the repeat variable.
    pub fn loop_variable(&self) -> &str {
        &self.loop_variable
    }

    /// Create the family, ready for tasks to be added.
    pub fn build(&self) -> Result<Family, DtExtractErr> {
        let repeat = RepeatDate::new(&self.loop_variable, self.start, self.end)?;
        let basetime = date_basher(&self.loop_variable, "00:00:00", '%');

        Ok(Family::new(&self.name)
            .with_repeat(repeat)
            .with_variable(Self::BASETIME_VARIABLE, &basetime))
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
