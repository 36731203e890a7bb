use std::fmt;
use std::str::FromStr;

use chrono::{
  Datelike,
  NaiveDate
};
use serde::{
  Deserialize,
  Serialize
};

use crate::datetime::{
  Instant,
  add_days_local,
  add_months_local,
  end_of_day,
  first_instant_of,
  last_instant_of,
  start_of_day
};
use crate::error::{
  CalendarError,
  CalendarResult
};

/// Granularity of the active calendar
/// view.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
  Day,
  #[default]
  Week,
  Month,
  Year
}

impl ViewMode {
  pub fn all() -> [Self; 4] {
    [
      Self::Day,
      Self::Week,
      Self::Month,
      Self::Year
    ]
  }

  pub fn as_key(self) -> &'static str {
    match self {
      | Self::Day => "day",
      | Self::Week => "week",
      | Self::Month => "month",
      | Self::Year => "year"
    }
  }

  pub fn from_key(
    key: &str
  ) -> Option<Self> {
    match key {
      | "day" => Some(Self::Day),
      | "week" => Some(Self::Week),
      | "month" => Some(Self::Month),
      | "year" => Some(Self::Year),
      | _ => None
    }
  }
}

impl fmt::Display for ViewMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_key())
  }
}

impl FromStr for ViewMode {
  type Err = CalendarError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let key =
      s.trim().to_ascii_lowercase();
    Self::from_key(&key).ok_or_else(
      || {
        CalendarError::UnknownViewMode(
          s.to_string()
        )
      }
    )
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Previous,
  Next
}

/// Closed interval of instants; both ends
/// count as inside.
#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
pub struct DateRange {
  pub start: Instant,
  pub end:   Instant
}

impl DateRange {
  pub fn new(
    start: Instant,
    end: Instant
  ) -> CalendarResult<Self> {
    if start > end {
      return Err(
        CalendarError::InvertedRange {
          start: start.to_rfc3339(),
          end:   end.to_rfc3339()
        }
      );
    }
    Ok(Self {
      start,
      end
    })
  }

  #[must_use]
  pub fn contains(
    &self,
    instant: &Instant
  ) -> bool {
    *instant >= self.start
      && *instant <= self.end
  }
}

fn start_of_week_date(
  day: NaiveDate
) -> NaiveDate {
  let diff = day
    .weekday()
    .num_days_from_monday();
  day
    .checked_sub_days(chrono::Days::new(
      u64::from(diff)
    ))
    .unwrap_or(day)
}

fn end_of_week_date(
  day: NaiveDate
) -> NaiveDate {
  let diff = 6
    - day
      .weekday()
      .num_days_from_monday();
  day
    .checked_add_days(chrono::Days::new(
      u64::from(diff)
    ))
    .unwrap_or(day)
}

fn first_day_of_month(
  day: NaiveDate
) -> NaiveDate {
  day.with_day(1).unwrap_or(day)
}

fn last_day_of_month(
  day: NaiveDate
) -> NaiveDate {
  first_day_of_month(day)
    .checked_add_months(chrono::Months::new(
      1
    ))
    .and_then(|next| next.pred_opt())
    .unwrap_or(NaiveDate::MAX)
}

fn first_day_of_year(
  day: NaiveDate
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    day.year(),
    1,
    1
  )
  .unwrap_or(day)
}

fn last_day_of_year(
  day: NaiveDate
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    day.year(),
    12,
    31
  )
  .unwrap_or(day)
}

fn span(
  date: &Instant,
  first: NaiveDate,
  last: NaiveDate
) -> DateRange {
  let tz = date.timezone();
  DateRange {
    start: first_instant_of(first, tz),
    end:   last_instant_of(last, tz)
  }
}

/// Monday 00:00 of the ISO week holding
/// `date`.
#[must_use]
pub fn start_of_week(
  date: &Instant
) -> Instant {
  first_instant_of(
    start_of_week_date(date.date_naive()),
    date.timezone()
  )
}

/// Sunday 23:59:59.999 of the ISO week
/// holding `date`.
#[must_use]
pub fn end_of_week(
  date: &Instant
) -> Instant {
  last_instant_of(
    end_of_week_date(date.date_naive()),
    date.timezone()
  )
}

#[must_use]
pub fn day_range(
  date: &Instant
) -> DateRange {
  DateRange {
    start: start_of_day(date),
    end:   end_of_day(date)
  }
}

#[must_use]
pub fn week_range(
  date: &Instant
) -> DateRange {
  let day = date.date_naive();
  span(
    date,
    start_of_week_date(day),
    end_of_week_date(day)
  )
}

#[must_use]
pub fn month_range(
  date: &Instant
) -> DateRange {
  let day = date.date_naive();
  span(
    date,
    first_day_of_month(day),
    last_day_of_month(day)
  )
}

#[must_use]
pub fn year_range(
  date: &Instant
) -> DateRange {
  let day = date.date_naive();
  span(
    date,
    first_day_of_year(day),
    last_day_of_year(day)
  )
}

/// Visible range for `view` around
/// `anchor`.
#[must_use]
pub fn compute_range(
  anchor: &Instant,
  view: ViewMode
) -> DateRange {
  match view {
    | ViewMode::Day => day_range(anchor),
    | ViewMode::Week => {
      week_range(anchor)
    }
    | ViewMode::Month => {
      month_range(anchor)
    }
    | ViewMode::Year => {
      year_range(anchor)
    }
  }
}

/// Move `anchor` by `periods` whole units
/// of `view`; negative goes back.
#[must_use]
pub fn shift(
  anchor: &Instant,
  view: ViewMode,
  periods: i64
) -> Instant {
  match view {
    | ViewMode::Day => {
      add_days_local(anchor, periods)
    }
    | ViewMode::Week => {
      add_days_local(
        anchor,
        periods.saturating_mul(7)
      )
    }
    | ViewMode::Month => {
      add_months_local(anchor, periods)
    }
    | ViewMode::Year => {
      add_months_local(
        anchor,
        periods.saturating_mul(12)
      )
    }
  }
}

#[must_use]
pub fn previous_period(
  anchor: &Instant,
  view: ViewMode
) -> Instant {
  shift(anchor, view, -1)
}

#[must_use]
pub fn next_period(
  anchor: &Instant,
  view: ViewMode
) -> Instant {
  shift(anchor, view, 1)
}

#[must_use]
pub fn step(
  anchor: &Instant,
  view: ViewMode,
  direction: Direction
) -> Instant {
  match direction {
    | Direction::Previous => {
      previous_period(anchor, view)
    }
    | Direction::Next => {
      next_period(anchor, view)
    }
  }
}

/// Monday through Sunday of the ISO week
/// holding `date`, each at midnight.
#[must_use]
pub fn week_days(
  date: &Instant
) -> Vec<Instant> {
  let tz = date.timezone();
  start_of_week_date(date.date_naive())
    .iter_days()
    .take(7)
    .map(|day| first_instant_of(day, tz))
    .collect()
}

/// Every day of the 7-column month grid:
/// from the Monday on or before the first
/// of the month through the Sunday on or
/// after its last day.
#[must_use]
pub fn month_days(
  date: &Instant
) -> Vec<Instant> {
  let tz = date.timezone();
  let day = date.date_naive();
  let grid_start = start_of_week_date(
    first_day_of_month(day)
  );
  let grid_end = end_of_week_date(
    last_day_of_month(day)
  );

  grid_start
    .iter_days()
    .take_while(|d| *d <= grid_end)
    .map(|d| first_instant_of(d, tz))
    .collect()
}

/// Midnight on the first of each month of
/// the anchor's year.
#[must_use]
pub fn year_months(
  date: &Instant
) -> Vec<Instant> {
  let tz = date.timezone();
  let year = date.year();
  (1..=12)
    .filter_map(|month| {
      NaiveDate::from_ymd_opt(year, month, 1)
    })
    .map(|day| first_instant_of(day, tz))
    .collect()
}

/// Same local calendar date, read on the
/// first argument's calendar.
#[must_use]
pub fn is_same_day(
  a: &Instant,
  b: &Instant
) -> bool {
  a.date_naive()
    == b
      .with_timezone(&a.timezone())
      .date_naive()
}

/// `date` within
/// `[start_of_day(start), end_of_day(end)]`,
/// inclusive on both ends.
#[must_use]
pub fn is_in_range(
  date: &Instant,
  start: &Instant,
  end: &Instant
) -> bool {
  *date >= start_of_day(start)
    && *date <= end_of_day(end)
}

/// True when the week holding `date`
/// starts and ends in the same month.
pub(crate) fn week_within_one_month(
  date: &Instant
) -> bool {
  let day = date.date_naive();
  start_of_week_date(day).month()
    == end_of_week_date(day).month()
}
