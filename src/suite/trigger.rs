//! Trigger expressions and the time gate that holds back retrieval until data is available.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use chrono::Duration;

use crate::times::days_and_seconds;

/// Comparison operators understood in ecFlow trigger expressions.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

impl Cmp {
    fn keyword(self) -> &'static str {
        match self {
            Cmp::Eq => "eq",
            Cmp::Ne => "ne",
            Cmp::Ge => "ge",
            Cmp::Gt => "gt",
            Cmp::Le => "le",
            Cmp::Lt => "lt",
        }
    }

    fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Cmp::Eq => lhs == rhs,
            Cmp::Ne => lhs != rhs,
            Cmp::Ge => lhs >= rhs,
            Cmp::Gt => lhs > rhs,
            Cmp::Le => lhs <= rhs,
            Cmp::Lt => lhs < rhs,
        }
    }
}

/// A value in a comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// A variable of the enclosing node or the server, written `:NAME`.
    Var(String),
    /// An integer literal.
    Value(i64),
    /// The difference of two operands.
    Diff(Box<Operand>, Box<Operand>),
}

impl Operand {
    /// Shorthand for a variable.
    pub fn var(name: &str) -> Self {
        Operand::Var(name.to_owned())
    }

    /// Shorthand for `lhs - rhs`.
    pub fn diff(lhs: Operand, rhs: Operand) -> Self {
        Operand::Diff(Box::new(lhs), Box::new(rhs))
    }

    fn eval(&self, env: &TriggerEnv) -> Option<i64> {
        match self {
            Operand::Var(name) => env.variables.get(name).copied(),
            Operand::Value(val) => Some(*val),
            Operand::Diff(lhs, rhs) => Some(lhs.eval(env)? - rhs.eval(env)?),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Var(name) => write!(f, ":{}", name),
            Operand::Value(val) => write!(f, "{}", val),
            Operand::Diff(lhs, rhs) => write!(f, "{} - {}", lhs, rhs),
        }
    }
}

/// A boolean trigger expression attached to a task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Compare two operands.
    Compare(Operand, Cmp, Operand),
    /// The named sibling node has completed.
    Complete(String),
    /// Both must hold.
    And(Box<Trigger>, Box<Trigger>),
    /// Either may hold.
    Or(Box<Trigger>, Box<Trigger>),
}

impl Trigger {
    /// Trigger on completion of another node.
    pub fn complete(node: &str) -> Self {
        Trigger::Complete(node.to_owned())
    }

    /// Combine with `AND`.
    pub fn and(self, other: Trigger) -> Self {
        Trigger::And(Box::new(self), Box::new(other))
    }

    /// Combine with `OR`.
    pub fn or(self, other: Trigger) -> Self {
        Trigger::Or(Box::new(self), Box::new(other))
    }

    /// Evaluate against a set of variable values and completed nodes. `None` if a variable the
    /// expression needs has no value.
    pub fn eval(&self, env: &TriggerEnv) -> Option<bool> {
        match self {
            Trigger::Compare(lhs, cmp, rhs) => Some(cmp.apply(lhs.eval(env)?, rhs.eval(env)?)),
            Trigger::Complete(node) => Some(env.complete.contains(node)),
            Trigger::And(lhs, rhs) => Some(lhs.eval(env)? && rhs.eval(env)?),
            Trigger::Or(lhs, rhs) => Some(lhs.eval(env)? || rhs.eval(env)?),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Trigger::And(..) | Trigger::Or(..))
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Trigger::Compare(lhs, cmp, rhs) => write!(f, "{} {} {}", lhs, cmp.keyword(), rhs),
            Trigger::Complete(node) => write!(f, "{} == complete", node),
            Trigger::And(lhs, rhs) => {
                for (i, side) in [lhs, rhs].iter().enumerate() {
                    if i > 0 {
                        write!(f, " AND ")?;
                    }
                    if side.is_compound() {
                        write!(f, "({})", side)?;
                    } else {
                        write!(f, "{}", side)?;
                    }
                }
                Ok(())
            }
            // Every alternative is parenthesised, which is how ecFlow users write them.
            Trigger::Or(lhs, rhs) => write!(f, "({}) OR ({})", lhs, rhs),
        }
    }
}

/// Values used when evaluating a trigger.
#[derive(Clone, Debug, Default)]
pub struct TriggerEnv {
    variables: HashMap<String, i64>,
    complete: HashSet<String>,
}

impl TriggerEnv {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable.
    pub fn with_variable(mut self, name: &str, value: i64) -> Self {
        self.variables.insert(name.to_owned(), value);
        self
    }

    /// Mark a node as complete.
    pub fn with_complete(mut self, node: &str) -> Self {
        self.complete.insert(node.to_owned());
        self
    }
}

/// Holds a task back until a delay after the nominal date of its cycle has passed.
///
/// ecFlow exposes the time of day as `:TIME` (an `HHMM` integer) and day numbers as Julian days,
/// so the delay is split into whole days and a time of day. The gate opens on the day the delay
/// ends once the time of day is reached, and stays open on every later day.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeGate {
    days: i64,
    hhmm: i64,
    loop_variable: String,
}

impl TimeGate {
    /// Server variable with the current Julian day.
    pub const SERVER_JULIAN: &'static str = "ECF_JULIAN";
    /// Server variable with the current time of day as `HHMM`.
    pub const TIME: &'static str = "TIME";

    /// Build the gate for a delay, relative to the date repeat named `loop_variable`.
    pub fn new(delay: Duration, loop_variable: &str) -> Self {
        let (days, seconds) = days_and_seconds(delay);
        let hhmm = 100 * (seconds / 3600) + (seconds / 60) % 60;

        TimeGate {
            days,
            hhmm,
            loop_variable: loop_variable.to_owned(),
        }
    }

    /// Whole days of the delay.
    pub fn days(&self) -> i64 {
        self.days
    }

    /// Time of day part of the delay as `HHMM`.
    pub fn hhmm(&self) -> i64 {
        self.hhmm
    }

    fn loop_julian(&self) -> String {
        format!("{}_JULIAN", self.loop_variable)
    }

    /// The trigger expression.
    pub fn trigger(&self) -> Trigger {
        let elapsed = || {
            Operand::diff(
                Operand::var(Self::SERVER_JULIAN),
                Operand::var(&self.loop_julian()),
            )
        };

        let time = Operand::var(Self::TIME);
        let same_day = Trigger::Compare(time, Cmp::Ge, Operand::Value(self.hhmm))
            .and(Trigger::Compare(elapsed(), Cmp::Eq, Operand::Value(self.days)));
        let later_day = Trigger::Compare(elapsed(), Cmp::Gt, Operand::Value(self.days));

        same_day.or(later_day)
    }

    /// Would the gate be open `elapsed_days` after the cycle date at time of day `hhmm`?
    pub fn permits(&self, elapsed_days: i64, hhmm: i64) -> bool {
        // Any Julian day works as the reference, only the difference matters.
        const REFERENCE_JULIAN: i64 = 2_460_000;

        let env = TriggerEnv::new()
            .with_variable(Self::TIME, hhmm)
            .with_variable(&self.loop_julian(), REFERENCE_JULIAN)
            .with_variable(Self::SERVER_JULIAN, REFERENCE_JULIAN + elapsed_days);

        self.trigger().eval(&env).unwrap_or(false)
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn test_render_time_gate() {
        let gate = TimeGate::new(Duration::days(1) + Duration::hours(2), "YMD");

        assert_eq!(gate.days(), 1);
        assert_eq!(gate.hhmm(), 200);
        assert_eq!(
            gate.trigger().to_string(),
            "(:TIME ge 200 AND :ECF_JULIAN - :YMD_JULIAN eq 1) OR (:ECF_JULIAN - :YMD_JULIAN gt 1)"
        );
    }

    #[test]
    fn test_time_gate_semantics() {
        let gate = TimeGate::new(Duration::days(1) + Duration::hours(2), "YMD");

        assert!(gate.permits(1, 200));
        assert!(gate.permits(1, 2359));
        assert!(gate.permits(2, 0));
        assert!(gate.permits(10, 100));

        assert!(!gate.permits(1, 100));
        assert!(!gate.permits(1, 159));
        assert!(!gate.permits(0, 2359));
        assert!(!gate.permits(0, 200));
    }

    #[test]
    fn test_time_gate_minutes_and_short_delays() {
        let gate = TimeGate::new(Duration::hours(6) + Duration::minutes(45), "YMD");
        assert_eq!(gate.days(), 0);
        assert_eq!(gate.hhmm(), 645);
        assert!(!gate.permits(0, 644));
        assert!(gate.permits(0, 645));
        assert!(gate.permits(1, 0));

        let gate = TimeGate::new(Duration::zero(), "YMD");
        assert!(gate.permits(0, 0));
    }

    #[test]
    fn test_complete_and_missing_variables() {
        let trigger = Trigger::complete("RetrieveDT");
        assert_eq!(trigger.to_string(), "RetrieveDT == complete");

        assert_eq!(trigger.eval(&TriggerEnv::new()), Some(false));
        assert_eq!(
            trigger.eval(&TriggerEnv::new().with_complete("RetrieveDT")),
            Some(true)
        );

        let gate = TimeGate::new(Duration::hours(1), "YMD").trigger();
        assert_eq!(gate.eval(&TriggerEnv::new().with_variable("TIME", 900)), None);
    }

    #[test]
    fn test_render_nested_and() {
        let trigger = Trigger::complete("a")
            .or(Trigger::complete("b"))
            .and(Trigger::complete("c"));
        assert_eq!(
            trigger.to_string(),
            "((a == complete) OR (b == complete)) AND c == complete"
        );
    }
}
