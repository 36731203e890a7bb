//! Error types for the almanac calendar engine.

use thiserror::Error;

/// Errors raised at the input boundary of the calendar engine.
///
/// Everything past parsing is total: once an event is normalized, range,
/// grouping and layout operations cannot fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
  /// A date input could not be turned into a concrete instant.
  #[error("invalid date input '{input}': {reason}")]
  InvalidDateInput {
    /// The offending input, rendered as text.
    input:  String,
    /// Why it was rejected.
    reason: String
  },

  #[error(
    "epoch milliseconds {0} are outside the supported range"
  )]
  EpochOutOfRange(i64),

  #[error("unknown time zone: {0}")]
  UnknownTimezone(String),

  #[error("unknown locale: {0}")]
  UnknownLocale(String),

  #[error(
    "unknown view mode '{0}' (expected day, week, month or year)"
  )]
  UnknownViewMode(String),

  #[error(
    "range start {start} is after range end {end}"
  )]
  InvertedRange { start: String, end: String }
}

/// Result alias for calendar engine operations.
pub type CalendarResult<T> =
  Result<T, CalendarError>;
