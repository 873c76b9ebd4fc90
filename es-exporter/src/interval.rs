//! Interval expressions used by `interval`, `timeout` and `jitter` settings.
//!
//! An interval is either a plain integer (seconds) or an integer followed by
//! one of `s`, `m` or `h`. Zero and negative values are accepted here; the
//! scheduler decides whether a period is usable.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal that switches scheduling off for a source while keeping it registered.
pub const DISABLE: &str = "disable";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    /// The literal is neither an integer nor an integer with a known unit.
    #[error("invalid interval '{0}': expected seconds or a number suffixed with 's', 'm' or 'h'")]
    InvalidInterval(String),
}

/// Parses an interval expression into a number of seconds.
pub fn parse(literal: &str) -> Result<i64, IntervalError> {
    let trimmed = literal.trim();
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Ok(seconds);
    }

    let invalid = || IntervalError::InvalidInterval(literal.to_string());
    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        _ => return Err(invalid()),
    };

    trimmed[..trimmed.len() - unit.len_utf8()]
        .parse::<i64>()
        .ok()
        .and_then(|value| value.checked_mul(multiplier))
        .ok_or_else(invalid)
}

/// An interval as written in the configuration file, kept unparsed until
/// collectors are assembled so errors name the offending literal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum IntervalLiteral {
    Seconds(i64),
    Expr(String),
}

impl IntervalLiteral {
    pub fn is_disable(&self) -> bool {
        matches!(self, IntervalLiteral::Expr(s) if s.trim().eq_ignore_ascii_case(DISABLE))
    }

    pub fn seconds(&self) -> Result<i64, IntervalError> {
        match self {
            IntervalLiteral::Seconds(s) => Ok(*s),
            IntervalLiteral::Expr(s) => parse(s),
        }
    }

    /// Resolves the literal to a duration, rejecting negative values.
    pub fn duration(&self) -> Result<Duration, IntervalError> {
        let seconds = self.seconds()?;
        u64::try_from(seconds)
            .map(Duration::from_secs)
            .map_err(|_| IntervalError::InvalidInterval(self.to_string()))
    }
}

impl From<i64> for IntervalLiteral {
    fn from(seconds: i64) -> Self {
        IntervalLiteral::Seconds(seconds)
    }
}

impl From<&str> for IntervalLiteral {
    fn from(expr: &str) -> Self {
        IntervalLiteral::Expr(expr.to_string())
    }
}

impl fmt::Display for IntervalLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalLiteral::Seconds(s) => write!(f, "{s}"),
            IntervalLiteral::Expr(s) => f.write_str(s),
        }
    }
}
