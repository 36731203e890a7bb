use std::fmt;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Days,
  Duration,
  FixedOffset,
  LocalResult,
  Months,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Timelike,
  Utc
};
use chrono_tz::Tz;
use regex::{
  Captures,
  Regex
};
use serde::{
  Deserialize,
  Serialize
};

use crate::error::{
  CalendarError,
  CalendarResult
};

const TIMEZONE_CONFIG_FILE: &str =
  "almanac-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "ALMANAC_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "ALMANAC_TIME_CONFIG";
const DEFAULT_TIMEZONE: &str = "UTC";

const GAP_PROBE_MINUTES: i64 = 15;
const GAP_PROBE_STEPS: usize = 24 * 4;

/// A point in time together with the zone whose calendar it is read in.
pub type Instant = DateTime<Tz>;

/// Loosely typed date value as supplied by callers.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(untagged)]
pub enum DateInput {
  EpochMillis(i64),
  Instant(DateTime<FixedOffset>),
  Text(String)
}

impl fmt::Display for DateInput {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::EpochMillis(ms) => {
        write!(f, "{ms}")
      }
      | Self::Instant(dt) => {
        write!(f, "{}", dt.to_rfc3339())
      }
      | Self::Text(text) => {
        f.write_str(text)
      }
    }
  }
}

impl From<i64> for DateInput {
  fn from(ms: i64) -> Self {
    Self::EpochMillis(ms)
  }
}

impl From<&str> for DateInput {
  fn from(text: &str) -> Self {
    Self::Text(text.to_string())
  }
}

impl From<String> for DateInput {
  fn from(text: String) -> Self {
    Self::Text(text)
  }
}

impl From<DateTime<FixedOffset>>
  for DateInput
{
  fn from(
    dt: DateTime<FixedOffset>
  ) -> Self {
    Self::Instant(dt)
  }
}

impl From<DateTime<Utc>> for DateInput {
  fn from(dt: DateTime<Utc>) -> Self {
    Self::Instant(dt.fixed_offset())
  }
}

impl From<Instant> for DateInput {
  fn from(dt: Instant) -> Self {
    Self::Instant(dt.fixed_offset())
  }
}

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Parse an IANA zone name such as
/// `Europe/Berlin`.
pub fn parse_timezone(
  raw: &str
) -> CalendarResult<Tz> {
  let trimmed = raw.trim();
  trimmed.parse::<Tz>().map_err(|_| {
    CalendarError::UnknownTimezone(
      trimmed.to_string()
    )
  })
}

/// Pick the calendar zone: the preferred
/// name first, then `ALMANAC_TIMEZONE`,
/// then the time config file, then UTC.
/// Unusable sources are logged and skipped.
pub fn resolve_timezone(
  preferred: Option<&str>
) -> Tz {
  if let Some(raw) = preferred
    && let Some(tz) =
      timezone_from_source(
        raw,
        "preferred"
      )
  {
    return tz;
  }

  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      timezone_from_source(
        &raw,
        TIMEZONE_ENV_VAR
      )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  timezone_from_source(
    DEFAULT_TIMEZONE,
    "DEFAULT_TIMEZONE"
  )
  .unwrap_or(chrono_tz::UTC)
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "time config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading time config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing time config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "time config had no timezone field"
    );
    return None;
  };

  timezone_from_source(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn timezone_from_source(
  raw: &str,
  source: &str
) -> Option<Tz> {
  if raw.trim().is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match parse_timezone(raw) {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %tz,
        "configured calendar timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Map a local wall-clock time onto the
/// zone. Folds take the earlier instant;
/// gaps move forward to the first valid
/// quarter hour.
pub fn resolve_local(
  tz: Tz,
  naive: NaiveDateTime
) -> Instant {
  match tz.from_local_datetime(&naive) {
    | LocalResult::Single(dt) => dt,
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::trace!(
        local = %naive,
        first = %first,
        second = %second,
        "ambiguous local time; using earliest"
      );
      if first <= second {
        first
      } else {
        second
      }
    }
    | LocalResult::None => {
      let mut probe = naive;
      for _ in 0..GAP_PROBE_STEPS {
        probe += Duration::minutes(
          GAP_PROBE_MINUTES
        );
        if let Some(dt) = tz
          .from_local_datetime(&probe)
          .earliest()
        {
          tracing::trace!(
            local = %naive,
            resolved = %dt,
            "local time skipped by zone; moved forward"
          );
          return dt;
        }
      }
      tz.from_utc_datetime(&naive)
    }
  }
}

#[tracing::instrument(level = "trace", skip(tz), fields(input = %input))]
pub fn parse_date_input(
  input: &DateInput,
  tz: Tz
) -> CalendarResult<Instant> {
  match input {
    | DateInput::EpochMillis(ms) => {
      DateTime::<Utc>::from_timestamp_millis(*ms)
        .map(|dt| dt.with_timezone(&tz))
        .ok_or(
          CalendarError::EpochOutOfRange(
            *ms
          )
        )
    }
    | DateInput::Instant(dt) => {
      Ok(dt.with_timezone(&tz))
    }
    | DateInput::Text(text) => {
      parse_date_text(text, tz)
    }
  }
}

/// `YYYY-MM-DDTHH:MM` followed by `Z` or
/// a `±HH:MM` offset.
fn parse_offset_minutes(
  token: &str
) -> Option<DateTime<FixedOffset>> {
  let normalized = match token
    .strip_suffix(['Z', 'z'])
  {
    | Some(rest) => format!("{rest}+00:00"),
    | None => token.to_string()
  };
  ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M%:z"]
    .iter()
    .find_map(|fmt| {
      DateTime::parse_from_str(
        &normalized,
        fmt
      )
      .ok()
    })
}

fn parse_date_text(
  raw: &str,
  tz: Tz
) -> CalendarResult<Instant> {
  let token = raw.trim();
  if token.is_empty() {
    return Err(invalid(
      raw,
      "empty date string"
    ));
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y%m%dT%H%M%SZ"
    )
  {
    return Ok(
      ndt.and_utc().with_timezone(&tz)
    );
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&tz));
  }

  if let Some(dt) =
    parse_offset_minutes(token)
  {
    return Ok(dt.with_timezone(&tz));
  }

  let pattern = loose_local_pattern()?;
  let Some(caps) =
    pattern.captures(token)
  else {
    return Err(invalid(
      raw,
      "expected RFC3339, YYYYMMDDTHHMMSSZ \
       or YYYY[-MM[-DD[ HH:MM[:SS[.fff]]]]]"
    ));
  };

  let year: i32 = caps["year"]
    .parse()
    .map_err(|_| {
      invalid(raw, "year out of range")
    })?;
  let month =
    capture_u32(&caps, "month", 1, raw)?;
  let day =
    capture_u32(&caps, "day", 1, raw)?;
  let hour =
    capture_u32(&caps, "hour", 0, raw)?;
  let minute =
    capture_u32(&caps, "minute", 0, raw)?;
  let second =
    capture_u32(&caps, "second", 0, raw)?;
  let nanos = match caps.name("fraction")
  {
    | Some(m) => {
      format!("{:0<9}", m.as_str())
        .parse::<u32>()
        .map_err(|_| {
          invalid(
            raw,
            "fractional seconds out of range"
          )
        })?
    }
    | None => 0
  };

  let date = NaiveDate::from_ymd_opt(
    year, month, day
  )
  .ok_or_else(|| {
    invalid(raw, "no such calendar date")
  })?;
  let time =
    NaiveTime::from_hms_nano_opt(
      hour, minute, second, nanos
    )
    .ok_or_else(|| {
      invalid(raw, "no such time of day")
    })?;

  Ok(resolve_local(
    tz,
    date.and_time(time)
  ))
}

fn loose_local_pattern()
-> CalendarResult<&'static Regex> {
  static PATTERN: OnceLock<
    Result<Regex, regex::Error>
  > = OnceLock::new();
  PATTERN
    .get_or_init(|| {
      Regex::new(
        r"^(?P<year>\d{4})(?:[-/](?P<month>\d{1,2})(?:[-/](?P<day>\d{1,2})(?:[Tt ](?P<hour>\d{1,2}):(?P<minute>\d{2})(?::(?P<second>\d{2})(?:\.(?P<fraction>\d{1,9}))?)?)?)?)?$",
      )
    })
    .as_ref()
    .map_err(|err| {
      CalendarError::InvalidDateInput {
        input:  String::new(),
        reason: format!(
          "internal pattern failure: {err}"
        )
      }
    })
}

fn capture_u32(
  caps: &Captures<'_>,
  name: &str,
  default: u32,
  raw: &str
) -> CalendarResult<u32> {
  match caps.name(name) {
    | Some(m) => {
      m.as_str().parse().map_err(|_| {
        invalid(
          raw,
          &format!("{name} out of range")
        )
      })
    }
    | None => Ok(default)
  }
}

fn invalid(
  input: &str,
  reason: &str
) -> CalendarError {
  CalendarError::InvalidDateInput {
    input:  input.to_string(),
    reason: reason.to_string()
  }
}

fn last_millisecond() -> NaiveTime {
  NaiveTime::MIN
    - Duration::milliseconds(1)
}

/// Midnight at the start of `date` in `tz`.
#[must_use]
pub fn first_instant_of(
  date: NaiveDate,
  tz: Tz
) -> Instant {
  resolve_local(
    tz,
    date.and_time(NaiveTime::MIN)
  )
}

/// 23:59:59.999 on `date` in `tz`.
#[must_use]
pub fn last_instant_of(
  date: NaiveDate,
  tz: Tz
) -> Instant {
  resolve_local(
    tz,
    date.and_time(last_millisecond())
  )
}

#[must_use]
pub fn start_of_day(
  dt: &Instant
) -> Instant {
  first_instant_of(
    dt.date_naive(),
    dt.timezone()
  )
}

#[must_use]
pub fn end_of_day(dt: &Instant) -> Instant {
  last_instant_of(
    dt.date_naive(),
    dt.timezone()
  )
}

/// Grouping key `YYYY-MM-DD` on the
/// instant's own calendar.
#[must_use]
pub fn day_key(dt: &Instant) -> String {
  dt.format("%Y-%m-%d").to_string()
}

/// True when hour, minute or second is
/// non-zero on the local clock.
#[must_use]
pub fn has_time_of_day(
  dt: &Instant
) -> bool {
  dt.hour() != 0
    || dt.minute() != 0
    || dt.second() != 0
}

/// Shift by whole days on the local
/// clock, keeping the time of day.
#[must_use]
pub fn add_days_local(
  dt: &Instant,
  days: i64
) -> Instant {
  let naive = dt.naive_local();
  let shifted = if days >= 0 {
    naive.checked_add_days(Days::new(
      days.unsigned_abs()
    ))
  } else {
    naive.checked_sub_days(Days::new(
      days.unsigned_abs()
    ))
  };
  shifted
    .map(|ndt| {
      resolve_local(dt.timezone(), ndt)
    })
    .unwrap_or_else(|| dt.clone())
}

/// Shift by whole months on the local
/// clock; the day clamps to the last valid
/// day of the target month.
#[must_use]
pub fn add_months_local(
  dt: &Instant,
  months: i64
) -> Instant {
  let Ok(count) =
    u32::try_from(months.unsigned_abs())
  else {
    return dt.clone();
  };
  let naive = dt.naive_local();
  let shifted = if months >= 0 {
    naive.checked_add_months(
      Months::new(count)
    )
  } else {
    naive.checked_sub_months(
      Months::new(count)
    )
  };
  shifted
    .map(|ndt| {
      resolve_local(dt.timezone(), ndt)
    })
    .unwrap_or_else(|| dt.clone())
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use chrono::{
    Datelike,
    TimeZone,
    Timelike
  };
  use chrono_tz::{
    America::New_York,
    UTC
  };

  use super::*;

  fn text(raw: &str) -> DateInput {
    DateInput::from(raw)
  }

  #[test]
  fn parses_bare_date_as_local_midnight()
  {
    let parsed = parse_date_input(
      &text("2024-03-15"),
      New_York
    )
    .expect("parse date");
    assert_eq!(
      parsed.date_naive(),
      NaiveDate::from_ymd_opt(
        2024, 3, 15
      )
      .expect("valid date")
    );
    assert!(!has_time_of_day(&parsed));
    assert_eq!(
      parsed.offset().to_string(),
      "EDT"
    );
  }

  #[test]
  fn parses_partial_year_and_month() {
    let year = parse_date_input(
      &text("2024"),
      UTC
    )
    .expect("parse year");
    assert_eq!(day_key(&year), "2024-01-01");

    let month = parse_date_input(
      &text("2024/7"),
      UTC
    )
    .expect("parse month");
    assert_eq!(
      day_key(&month),
      "2024-07-01"
    );
  }

  #[test]
  fn parses_local_datetime_with_fraction()
  {
    let parsed = parse_date_input(
      &text("2024-03-15 09:30:15.25"),
      UTC
    )
    .expect("parse datetime");
    assert_eq!(parsed.hour(), 9);
    assert_eq!(parsed.minute(), 30);
    assert_eq!(parsed.second(), 15);
    assert_eq!(
      parsed.timestamp_subsec_millis(),
      250
    );
  }

  #[test]
  fn converts_offsets_into_calendar_zone()
  {
    let parsed = parse_date_input(
      &text("2024-03-15T02:00:00Z"),
      New_York
    )
    .expect("parse rfc3339");
    assert_eq!(
      day_key(&parsed),
      "2024-03-14"
    );
    assert_eq!(parsed.hour(), 22);

    let compact = parse_date_input(
      &text("20240315T020000Z"),
      New_York
    )
    .expect("parse compact");
    assert_eq!(compact, parsed);
  }

  #[test]
  fn accepts_zoned_time_without_seconds()
  {
    let utc = parse_date_input(
      &text("2024-03-15T09:00Z"),
      UTC
    )
    .expect("parse zulu minutes");
    assert_eq!(
      utc.to_rfc3339(),
      "2024-03-15T09:00:00+00:00"
    );

    let offset = parse_date_input(
      &text("2024-03-15T10:00+01:00"),
      UTC
    )
    .expect("parse offset minutes");
    assert_eq!(offset, utc);
  }

  #[test]
  fn converts_epoch_millis() {
    let parsed = parse_date_input(
      &DateInput::EpochMillis(
        1_710_460_800_000
      ),
      UTC
    )
    .expect("parse epoch");
    assert_eq!(
      day_key(&parsed),
      "2024-03-15"
    );
    assert!(!has_time_of_day(&parsed));
  }

  #[test]
  fn rejects_impossible_and_garbage_input()
  {
    for raw in
      ["2024-02-30", "next tuesday", "", "2024-03-15 25:00"]
    {
      let err =
        parse_date_input(&text(raw), UTC)
          .expect_err("must reject");
      assert!(
        matches!(
          err,
          CalendarError::InvalidDateInput { .. }
        ),
        "{raw}: {err}"
      );
    }

    assert_eq!(
      parse_date_input(
        &DateInput::EpochMillis(i64::MAX),
        UTC
      ),
      Err(CalendarError::EpochOutOfRange(
        i64::MAX
      ))
    );
  }

  #[test]
  fn spring_forward_gap_moves_to_first_valid_time()
  {
    let parsed = parse_date_input(
      &text("2024-03-10 02:30"),
      New_York
    )
    .expect("parse gap time");
    assert_eq!(parsed.hour(), 3);
    assert_eq!(parsed.minute(), 0);
  }

  #[test]
  fn fall_back_fold_takes_earliest() {
    let parsed = parse_date_input(
      &text("2024-11-03 01:30"),
      New_York
    )
    .expect("parse folded time");
    assert_eq!(
      parsed.offset().to_string(),
      "EDT"
    );
  }

  #[test]
  fn end_of_day_is_last_millisecond() {
    let dt = New_York
      .with_ymd_and_hms(
        2024, 3, 15, 13, 45, 0
      )
      .single()
      .expect("valid instant");
    let end = end_of_day(&dt);
    assert_eq!(end.hour(), 23);
    assert_eq!(end.minute(), 59);
    assert_eq!(end.second(), 59);
    assert_eq!(
      end.timestamp_subsec_millis(),
      999
    );
    assert_eq!(
      (start_of_day(&add_days_local(
        &dt, 1
      )) - end)
        .num_milliseconds(),
      1
    );
  }

  #[test]
  fn add_days_keeps_wall_clock_across_dst()
  {
    let dt = New_York
      .with_ymd_and_hms(
        2024, 3, 9, 9, 30, 0
      )
      .single()
      .expect("valid instant");
    let next = add_days_local(&dt, 1);
    assert_eq!(next.day(), 10);
    assert_eq!(next.hour(), 9);
    assert_eq!(next.minute(), 30);
    assert_eq!(
      (next - dt).num_hours(),
      23
    );
  }

  #[test]
  fn add_months_clamps_to_month_end() {
    let jan31 = UTC
      .with_ymd_and_hms(
        2024, 1, 31, 0, 0, 0
      )
      .single()
      .expect("valid instant");
    assert_eq!(
      day_key(&add_months_local(
        &jan31, 1
      )),
      "2024-02-29"
    );
    assert_eq!(
      day_key(&add_months_local(
        &jan31, -2
      )),
      "2023-11-30"
    );
  }

  #[test]
  fn date_input_deserializes_by_shape() {
    let inputs: Vec<DateInput> =
      serde_json::from_str(
        r#"[1710460800000, "2024-03-15T09:00:00+01:00", "2024-03-15"]"#,
      )
      .expect("deserialize inputs");
    assert!(matches!(
      inputs[0],
      DateInput::EpochMillis(_)
    ));
    assert!(matches!(
      inputs[1],
      DateInput::Instant(_)
    ));
    assert!(matches!(
      inputs[2],
      DateInput::Text(_)
    ));
  }

  #[test]
  fn reads_timezone_from_toml_section()
  {
    let mut file =
      tempfile::NamedTempFile::new()
        .expect("tempfile");
    writeln!(
      file,
      "[time]\ntimezone = \"Europe/Berlin\""
    )
    .expect("write config");
    assert_eq!(
      load_timezone_from_file(
        file.path()
      ),
      Some(chrono_tz::Europe::Berlin)
    );
  }

  #[test]
  fn preferred_timezone_wins() {
    assert_eq!(
      resolve_timezone(Some(
        "Asia/Tokyo"
      )),
      chrono_tz::Asia::Tokyo
    );
    assert!(
      parse_timezone("Mars/Olympus")
        .is_err()
    );
  }
}
