use std::fmt;

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::datetime::{DateInput, Instant, has_time_of_day, parse_date_input};
use crate::error::{CalendarError, CalendarResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// An event exactly as the caller supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub label: String,

    pub start: DateInput,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
}

impl RawEvent {
    pub fn new(label: impl Into<String>, start: impl Into<DateInput>) -> Self {
        Self {
            label: label.into(),
            start: start.into(),
            end: None,
            bg_color: None,
            id: None,
        }
    }

    #[must_use]
    pub fn ending(mut self, end: impl Into<DateInput>) -> Self {
        self.end = Some(end.into());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.bg_color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }
}

/// A raw event resolved to concrete instants.
///
/// `end_date` may precede `start_date` when the caller supplied an inverted
/// span; the dates are kept as given and only `duration` is clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    #[serde(flatten)]
    pub raw: RawEvent,
    pub start_date: Instant,
    pub end_date: Instant,
    pub is_all_day: bool,
    /// Whole days, never below 1.
    pub duration: u32,
}

impl NormalizedEvent {
    pub fn label(&self) -> &str {
        &self.raw.label
    }

    pub fn id(&self) -> Option<&EventId> {
        self.raw.id.as_ref()
    }
}

fn duration_in_days(start: &Instant, end: &Instant) -> u32 {
    let span_ms = end.signed_duration_since(start).num_milliseconds();
    let day_ms = Duration::days(1).num_milliseconds();
    let days = span_ms.div_euclid(day_ms) + i64::from(span_ms.rem_euclid(day_ms) != 0);
    u32::try_from(days.max(1)).unwrap_or(u32::MAX)
}

/// Resolve `raw` on the calendar of `tz`.
///
/// Fails eagerly with [`CalendarError::InvalidDateInput`] when either date
/// cannot be parsed; a missing `end` means the event ends when it starts.
pub fn normalize(raw: &RawEvent, tz: Tz) -> CalendarResult<NormalizedEvent> {
    let start_date = parse_date_input(&raw.start, tz)?;
    let end_date = match &raw.end {
        Some(end) => parse_date_input(end, tz)?,
        None => start_date.clone(),
    };

    let start_has_time = has_time_of_day(&start_date);
    let end_has_time = raw.end.is_some() && has_time_of_day(&end_date);
    let is_all_day = !start_has_time && !end_has_time;

    if end_date < start_date {
        debug!(
            label = %raw.label,
            start = %start_date,
            end = %end_date,
            "event ends before it starts; duration clamped to one day"
        );
    }
    let duration = duration_in_days(&start_date, &end_date);

    trace!(label = %raw.label, is_all_day, duration, "normalized event");
    Ok(NormalizedEvent {
        raw: raw.clone(),
        start_date,
        end_date,
        is_all_day,
        duration,
    })
}

/// Normalize a batch in input order, stopping at the first bad event.
#[tracing::instrument(skip(raws), fields(count = raws.len()))]
pub fn normalize_all(raws: &[RawEvent], tz: Tz) -> CalendarResult<Vec<NormalizedEvent>> {
    raws.iter()
        .map(|raw| {
            normalize(raw, tz).map_err(|err| match err {
                CalendarError::InvalidDateInput { input, reason } => {
                    CalendarError::InvalidDateInput {
                        input,
                        reason: format!("{reason} (event '{}')", raw.label),
                    }
                }
                other => other,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;
    use chrono_tz::{America::New_York, UTC};

    use super::*;
    use crate::datetime::day_key;

    #[test]
    fn date_only_span_is_all_day_with_ceiling_duration() {
        let raw = RawEvent::new("Conference", "2024-03-15").ending("2024-03-17");
        let event = normalize(&raw, UTC).expect("normalize");
        assert!(event.is_all_day);
        // exactly 48 hours apart
        assert_eq!(event.duration, 2);
        assert_eq!(day_key(&event.start_date), "2024-03-15");
        assert_eq!(day_key(&event.end_date), "2024-03-17");
    }

    #[test]
    fn partial_day_rounds_up() {
        let raw = RawEvent::new("Offsite", "2024-03-15").ending("2024-03-17 09:00");
        let event = normalize(&raw, UTC).expect("normalize");
        assert_eq!(event.duration, 3);
        assert!(!event.is_all_day);
    }

    #[test]
    fn missing_end_defaults_to_start() {
        let raw = RawEvent::new("Standup", "2024-03-15 09:00");
        let event = normalize(&raw, UTC).expect("normalize");
        assert_eq!(event.end_date, event.start_date);
        assert_eq!(event.duration, 1);
        assert!(!event.is_all_day);
    }

    #[test]
    fn midnight_end_does_not_make_timed_start_all_day() {
        let raw = RawEvent::new("Overnight", "2024-03-15 22:00").ending("2024-03-16");
        let event = normalize(&raw, UTC).expect("normalize");
        assert!(!event.is_all_day);
        assert_eq!(event.duration, 1);
    }

    #[test]
    fn timed_end_breaks_all_day() {
        let raw = RawEvent::new("Review", "2024-03-15").ending("2024-03-15 10:30");
        let event = normalize(&raw, UTC).expect("normalize");
        assert!(!event.is_all_day);
    }

    #[test]
    fn inverted_span_clamps_duration_but_keeps_dates() {
        let raw = RawEvent::new("Backwards", "2024-03-17").ending("2024-03-15");
        let event = normalize(&raw, UTC).expect("normalize");
        assert_eq!(event.duration, 1);
        assert!(event.end_date < event.start_date);
        assert_eq!(day_key(&event.end_date), "2024-03-15");
    }

    #[test]
    fn all_day_is_judged_on_the_calendar_zone() {
        let raw = RawEvent::new("Utc midnight", "2024-03-15T00:00:00Z");
        let in_utc = normalize(&raw, UTC).expect("normalize utc");
        let in_ny = normalize(&raw, New_York).expect("normalize ny");
        assert!(in_utc.is_all_day);
        assert!(!in_ny.is_all_day);
        assert_eq!(in_ny.start_date.hour(), 20);
    }

    #[test]
    fn normalize_is_repeatable() {
        let raw = RawEvent::new("Repeat", 1_710_496_800_000_i64)
            .ending("2024-03-16T12:00:00+02:00")
            .with_color("#3b82f6")
            .with_id(EventId::Number(7));
        let first = normalize(&raw, New_York).expect("first");
        let second = normalize(&raw, New_York).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.id(), Some(&EventId::Number(7)));
    }

    #[test]
    fn invalid_input_is_rejected_with_event_label() {
        let raws = vec![
            RawEvent::new("Fine", "2024-03-15"),
            RawEvent::new("Broken", "2024-13-40"),
        ];
        let err = normalize_all(&raws, UTC).expect_err("must fail");
        match err {
            CalendarError::InvalidDateInput { input, reason } => {
                assert_eq!(input, "2024-13-40");
                assert!(reason.contains("'Broken'"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn raw_events_use_camel_case_json() {
        let raw: RawEvent = serde_json::from_str(
            r##"{"label":"Demo","start":"2024-03-15","end":1710547200000,"bgColor":"#f00","id":"evt-1"}"##,
        )
        .expect("deserialize raw event");
        assert_eq!(raw.bg_color.as_deref(), Some("#f00"));
        assert_eq!(raw.id, Some(EventId::Text("evt-1".to_string())));
        assert_eq!(raw.end, Some(DateInput::EpochMillis(1_710_547_200_000)));

        let event = normalize(&raw, UTC).expect("normalize");
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["label"], "Demo");
        assert_eq!(json["isAllDay"], true);
        assert_eq!(json["duration"], 1);
        assert!(json.get("startDate").is_some());
    }
}
