use indexmap::IndexMap;
use tracing::trace;

use crate::datetime::{
  Instant,
  day_key,
  end_of_day,
  first_instant_of,
  start_of_day
};
use crate::event::NormalizedEvent;
use crate::period::{
  DateRange,
  day_range,
  is_same_day
};

/// Calendar-day key to the events touching
/// that day, in insertion order. Events are
/// borrowed, so a multi-day event shows up
/// once per day without being copied.
pub type DayGroups<'a> = IndexMap<
  String,
  Vec<&'a NormalizedEvent>
>;

/// Closed-interval overlap; touching
/// endpoints count.
#[must_use]
pub fn overlaps(
  event: &NormalizedEvent,
  range: &DateRange
) -> bool {
  event.start_date <= range.end
    && event.end_date >= range.start
}

/// Events overlapping `range`, in input
/// order.
#[must_use]
pub fn filter_by_range<'a>(
  events: &'a [NormalizedEvent],
  range: &DateRange
) -> Vec<&'a NormalizedEvent> {
  events
    .iter()
    .filter(|event| overlaps(event, range))
    .collect()
}

#[must_use]
pub fn events_for_day<'a>(
  events: &'a [NormalizedEvent],
  day: &Instant
) -> Vec<&'a NormalizedEvent> {
  filter_by_range(
    events,
    &day_range(day)
  )
}

/// More than one day long, or starting and
/// ending on different calendar days.
#[must_use]
pub fn is_multi_day(
  event: &NormalizedEvent
) -> bool {
  event.duration > 1
    || !is_same_day(
      &event.start_date,
      &event.end_date
    )
}

/// The slice of `event` visible on `day`,
/// as a separate copy with its dates
/// clamped to the day's bounds. `None` when
/// the event misses the day entirely.
#[must_use]
pub fn clip_to_day(
  event: &NormalizedEvent,
  day: &Instant
) -> Option<NormalizedEvent> {
  let day_start = start_of_day(day);
  let day_end = end_of_day(day);

  if event.end_date < day_start
    || event.start_date > day_end
  {
    return None;
  }

  let mut clipped = event.clone();
  if clipped.start_date < day_start {
    clipped.start_date = day_start;
  }
  if clipped.end_date > day_end {
    clipped.end_date = day_end;
  }
  Some(clipped)
}

/// Bucket every event under each calendar
/// day from its start day through its end
/// day. An event ending before it starts
/// has no day and is left out.
#[must_use]
pub fn group_by_day(
  events: &[NormalizedEvent]
) -> DayGroups<'_> {
  let mut grouped = DayGroups::new();

  for event in events {
    let tz = event.start_date.timezone();
    let first_day =
      event.start_date.date_naive();
    let last_day = event
      .end_date
      .with_timezone(&tz)
      .date_naive();

    for day in first_day
      .iter_days()
      .take_while(|day| *day <= last_day)
    {
      let key = day_key(
        &first_instant_of(day, tz)
      );
      grouped
        .entry(key)
        .or_default()
        .push(event);
    }
  }

  trace!(
    events = events.len(),
    days = grouped.len(),
    "grouped events by day"
  );
  grouped
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Timelike
  };
  use chrono_tz::UTC;

  use super::*;
  use crate::event::{
    RawEvent,
    normalize
  };

  fn event(
    label: &str,
    start: &str,
    end: &str
  ) -> NormalizedEvent {
    normalize(
      &RawEvent::new(label, start)
        .ending(end),
      UTC
    )
    .expect("normalize fixture")
  }

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> Instant {
    UTC
      .with_ymd_and_hms(y, m, d, 0, 0, 0)
      .single()
      .expect("valid day")
  }

  fn range(
    start: Instant,
    end: Instant
  ) -> DateRange {
    DateRange::new(start, end)
      .expect("ordered range")
  }

  #[test]
  fn touching_end_boundary_overlaps() {
    let e = event(
      "Mar 5",
      "2024-03-05",
      "2024-03-05"
    );
    assert!(overlaps(
      &e,
      &range(day(2024, 3, 1), day(2024, 3, 5))
    ));
  }

  #[test]
  fn touching_overlap_is_symmetric() {
    let a = event(
      "a",
      "2024-03-01",
      "2024-03-05"
    );
    let b = event(
      "b",
      "2024-03-05",
      "2024-03-09"
    );
    let range_a = range(
      a.start_date.clone(),
      a.end_date.clone()
    );
    let range_b = range(
      b.start_date.clone(),
      b.end_date.clone()
    );
    assert!(overlaps(&a, &range_b));
    assert!(overlaps(&b, &range_a));
  }

  #[test]
  fn disjoint_event_is_filtered_out() {
    let events = vec![
      event(
        "before",
        "2024-02-27 09:00",
        "2024-02-29 23:59"
      ),
      event(
        "inside",
        "2024-03-02 10:00",
        "2024-03-02 11:00"
      ),
      event(
        "spanning",
        "2024-02-20",
        "2024-03-20"
      ),
      event(
        "after",
        "2024-03-08 00:00",
        "2024-03-08 01:00"
      ),
    ];
    let week = range(
      day(2024, 3, 1),
      end_of_day(&day(2024, 3, 7))
    );
    let labels: Vec<&str> =
      filter_by_range(&events, &week)
        .into_iter()
        .map(NormalizedEvent::label)
        .collect();
    assert_eq!(
      labels,
      vec!["inside", "spanning"]
    );
  }

  #[test]
  fn events_for_day_includes_midnight_start()
  {
    let events = vec![
      event(
        "midnight",
        "2024-03-11 00:00",
        "2024-03-11 00:30"
      ),
      event(
        "previous evening",
        "2024-03-10 20:00",
        "2024-03-10 23:00"
      ),
    ];
    let found =
      events_for_day(&events, &day(2024, 3, 11));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].label(), "midnight");
  }

  #[test]
  fn multi_day_detection() {
    assert!(is_multi_day(&event(
      "long",
      "2024-03-10",
      "2024-03-12"
    )));
    assert!(is_multi_day(&event(
      "overnight",
      "2024-03-10 22:00",
      "2024-03-11 02:00"
    )));
    assert!(!is_multi_day(&event(
      "lunch",
      "2024-03-10 12:00",
      "2024-03-10 13:00"
    )));
  }

  #[test]
  fn clip_clamps_to_the_day() {
    let e = event(
      "trip",
      "2024-03-10",
      "2024-03-12"
    );
    let clipped =
      clip_to_day(&e, &day(2024, 3, 11))
        .expect("overlaps");
    assert_eq!(
      clipped.start_date,
      day(2024, 3, 11)
    );
    assert_eq!(
      clipped.end_date,
      end_of_day(&day(2024, 3, 11))
    );
    assert_eq!(clipped.end_date.hour(), 23);
    assert_eq!(
      clipped
        .end_date
        .timestamp_subsec_millis(),
      999
    );
    assert_eq!(
      e.start_date,
      day(2024, 3, 10)
    );
    assert_eq!(clipped.duration, e.duration);
  }

  #[test]
  fn clip_keeps_inner_times_and_skips_other_days()
  {
    let e = event(
      "meeting",
      "2024-03-11 09:00",
      "2024-03-11 10:00"
    );
    let clipped =
      clip_to_day(&e, &day(2024, 3, 11))
        .expect("same day");
    assert_eq!(clipped, e);
    assert!(
      clip_to_day(&e, &day(2024, 3, 12))
        .is_none()
    );
  }

  #[test]
  fn groups_each_spanned_day_once() {
    let events = vec![
      event(
        "trip",
        "2024-03-10 15:00",
        "2024-03-12 10:00"
      ),
      event(
        "dinner",
        "2024-03-11 19:00",
        "2024-03-11 21:00"
      ),
    ];
    let grouped = group_by_day(&events);

    let keys: Vec<&str> = grouped
      .keys()
      .map(String::as_str)
      .collect();
    assert_eq!(
      keys,
      vec![
        "2024-03-10",
        "2024-03-11",
        "2024-03-12"
      ]
    );

    let on_11: Vec<&str> = grouped
      ["2024-03-11"]
      .iter()
      .map(|e| e.label())
      .collect();
    assert_eq!(
      on_11,
      vec!["trip", "dinner"]
    );

    let trip_count = grouped
      .values()
      .flatten()
      .filter(|e| {
        std::ptr::eq(**e, &events[0])
      })
      .count();
    assert_eq!(trip_count, 3);
  }

  #[test]
  fn inverted_event_has_no_day() {
    let events = vec![event(
      "backwards",
      "2024-03-12",
      "2024-03-10"
    )];
    let grouped = group_by_day(&events);
    assert!(grouped.is_empty());
  }

  #[test]
  fn grouping_is_rebuilt_per_call() {
    let events = vec![event(
      "solo",
      "2024-03-10",
      "2024-03-10"
    )];
    let first = group_by_day(&events);
    let second = group_by_day(&events);
    assert_eq!(first, second);
    assert_eq!(first["2024-03-10"].len(), 1);
  }
}
