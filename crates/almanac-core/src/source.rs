use std::fmt;
use std::sync::Arc;

use chrono_tz::Tz;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::event::{NormalizedEvent, RawEvent, normalize_all};
use crate::interval::filter_by_range;
use crate::period::DateRange;

/// Provider invoked with the visible range whenever it changes.
///
/// Implementations must complete `sink` by calling [`EventSink::deliver`] or
/// [`EventSink::fail`]; both consume it, so a sink is completed at most once.
/// The sink may be moved to another thread and completed later.
pub trait EventLoader: Send + Sync {
    fn load(&self, range: DateRange, sink: EventSink);
}

/// Where a store gets its raw events from.
#[derive(Clone)]
pub enum EventSource {
    Static(Vec<RawEvent>),
    Dynamic(Arc<dyn EventLoader>),
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(raws) => f.debug_tuple("Static").field(&raws.len()).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    events: Vec<NormalizedEvent>,
    range: Option<DateRange>,
    loading: bool,
    last_error: Option<String>,
    generation: u64,
    static_ready: bool,
}

/// Completion handle for one loader invocation.
pub struct EventSink {
    state: Arc<Mutex<StoreState>>,
    generation: u64,
    tz: Tz,
    completed: bool,
}

impl EventSink {
    /// False once a newer load has started; the result would be dropped.
    pub fn is_current(&self) -> bool {
        self.state.lock().generation == self.generation
    }

    /// Replace the store's events with `raws`. Returns whether the result
    /// was applied; results of superseded requests are discarded.
    pub fn deliver(mut self, raws: Vec<RawEvent>) -> bool {
        self.completed = true;
        let normalized = normalize_all(&raws, self.tz);

        let mut state = self.state.lock();
        if state.generation != self.generation {
            debug!(
                generation = self.generation,
                current = state.generation,
                "dropping events from superseded load"
            );
            return false;
        }
        state.loading = false;
        match normalized {
            Ok(events) => {
                debug!(count = events.len(), generation = self.generation, "events loaded");
                state.events = events;
                state.last_error = None;
            }
            Err(err) => {
                warn!(error = %err, "loaded events failed to normalize");
                state.last_error = Some(err.to_string());
            }
        }
        true
    }

    /// Record a failed load. The previous events stay visible.
    pub fn fail(mut self, err: anyhow::Error) -> bool {
        self.completed = true;
        let mut state = self.state.lock();
        if state.generation != self.generation {
            debug!(
                generation = self.generation,
                error = %err,
                "ignoring failure from superseded load"
            );
            return false;
        }
        let message = format!("{err:#}");
        warn!(error = %message, "event load failed");
        state.loading = false;
        state.last_error = Some(message);
        true
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut state = self.state.lock();
        if state.generation == self.generation {
            warn!(generation = self.generation, "event loader dropped its sink");
            state.loading = false;
            state.last_error = Some("event loader finished without a result".to_string());
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .field("tz", &self.tz)
            .finish_non_exhaustive()
    }
}

/// Normalized events for the current range, kept in sync with a source.
#[derive(Debug)]
pub struct EventStore {
    source: EventSource,
    tz: Tz,
    state: Arc<Mutex<StoreState>>,
}

impl EventStore {
    pub fn new(source: EventSource, tz: Tz) -> Self {
        Self {
            source,
            tz,
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Start loading events for `range`.
    ///
    /// Static events are normalized on the first call only. A dynamic loader
    /// is invoked on every call, and only the newest call's result is kept.
    #[instrument(skip(self, range), fields(start = %range.start, end = %range.end))]
    pub fn load(&self, range: DateRange) {
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.range = Some(range.clone());
            state.generation
        };

        match &self.source {
            EventSource::Static(raws) => {
                let mut state = self.state.lock();
                if state.static_ready {
                    return;
                }
                match normalize_all(raws, self.tz) {
                    Ok(events) => {
                        debug!(count = events.len(), "static events normalized");
                        state.events = events;
                        state.last_error = None;
                        state.static_ready = true;
                    }
                    Err(err) => {
                        warn!(error = %err, "static events failed to normalize");
                        state.last_error = Some(err.to_string());
                    }
                }
            }
            EventSource::Dynamic(loader) => {
                self.state.lock().loading = true;
                let sink = EventSink {
                    state: Arc::clone(&self.state),
                    generation,
                    tz: self.tz,
                    completed: false,
                };
                loader.load(range, sink);
            }
        }
    }

    /// Every event currently held.
    pub fn events(&self) -> Vec<NormalizedEvent> {
        self.state.lock().events.clone()
    }

    /// Events overlapping `range`, in load order.
    pub fn visible(&self, range: &DateRange) -> Vec<NormalizedEvent> {
        let state = self.state.lock();
        filter_by_range(&state.events, range)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The range of the most recent [`EventStore::load`] call.
    pub fn range(&self) -> Option<DateRange> {
        self.state.lock().range.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }
}
