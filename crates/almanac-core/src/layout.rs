use serde::Serialize;

use crate::datetime::{
  Instant,
  start_of_day
};
use crate::event::NormalizedEvent;

pub const DEFAULT_HOUR_HEIGHT: f64 = 60.0;
pub const MIN_EVENT_HEIGHT: f64 = 20.0;

pub const ALL_DAY_POSITION: PixelPosition =
  PixelPosition {
    top:    0.0,
    height: 30.0
  };

const MS_PER_MINUTE: f64 = 60_000.0;

/// Vertical placement of an event in a
/// day column.
#[derive(
  Debug, Clone, Copy, PartialEq, Serialize,
)]
pub struct PixelPosition {
  pub top:    f64,
  pub height: f64
}

fn minutes_since(
  day_start: &Instant,
  at: &Instant
) -> f64 {
  // i64 -> f64 is exact for any span a
  // calendar can show
  #[allow(clippy::cast_precision_loss)]
  let ms = at
    .signed_duration_since(day_start)
    .num_milliseconds()
    as f64;
  ms / MS_PER_MINUTE
}

/// Place `event` inside the day starting at
/// `day_start`. Events reaching back before
/// the day are pinned to the top; clip them
/// with [`crate::interval::clip_to_day`]
/// first to get an accurate height.
#[must_use]
pub fn position(
  event: &NormalizedEvent,
  day_start: &Instant,
  hour_height: f64
) -> PixelPosition {
  if event.is_all_day {
    return ALL_DAY_POSITION;
  }

  let day_start = start_of_day(day_start);
  let start_minutes = minutes_since(
    &day_start,
    &event.start_date
  );
  let end_minutes =
    minutes_since(&day_start, &event.end_date);
  let pixels_per_minute = hour_height / 60.0;

  PixelPosition {
    top:    (start_minutes * pixels_per_minute)
      .max(0.0),
    height: ((end_minutes - start_minutes)
      * pixels_per_minute)
      .max(MIN_EVENT_HEIGHT)
  }
}
