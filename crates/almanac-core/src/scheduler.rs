use chrono::Locale;
use chrono_tz::Tz;
use tracing::debug;

use crate::datetime::Instant;
use crate::label::period_label;
use crate::period::{
  DateRange,
  Direction,
  ViewMode,
  compute_range,
  shift,
  step
};

/// Navigation state of a calendar view:
/// the anchor date, the view mode and the
/// formatting locale.
#[derive(Debug, Clone)]
pub struct Scheduler {
  current: Instant,
  view:    ViewMode,
  locale:  Option<Locale>
}

impl Scheduler {
  /// Start on `now` in week view.
  pub fn new(now: Instant) -> Self {
    Self {
      current: now,
      view:    ViewMode::default(),
      locale:  None
    }
  }

  #[must_use]
  pub fn with_view(
    mut self,
    view: ViewMode
  ) -> Self {
    self.view = view;
    self
  }

  #[must_use]
  pub fn with_locale(
    mut self,
    locale: Option<Locale>
  ) -> Self {
    self.locale = locale;
    self
  }

  pub fn current_date(&self) -> &Instant {
    &self.current
  }

  pub fn view_mode(&self) -> ViewMode {
    self.view
  }

  pub fn timezone(&self) -> Tz {
    self.current.timezone()
  }

  pub fn locale(&self) -> Option<Locale> {
    self.locale
  }

  pub fn go_to_today(
    &mut self,
    now: Instant
  ) {
    debug!(
      date = %now,
      "scheduler jumped to today"
    );
    self.current = now;
  }

  pub fn go_to_previous(&mut self) {
    self.navigate(Direction::Previous);
  }

  pub fn go_to_next(&mut self) {
    self.navigate(Direction::Next);
  }

  /// Move by `periods` whole views at once;
  /// month-end days clamp only once.
  pub fn go_by(
    &mut self,
    periods: i64
  ) {
    if periods == 0 {
      return;
    }
    self.current =
      shift(&self.current, self.view, periods);
    debug!(
      periods,
      view = %self.view,
      date = %self.current,
      "scheduler moved"
    );
  }

  fn navigate(
    &mut self,
    direction: Direction
  ) {
    self.current = step(
      &self.current,
      self.view,
      direction
    );
    debug!(
      ?direction,
      view = %self.view,
      date = %self.current,
      "scheduler moved"
    );
  }

  pub fn set_view_mode(
    &mut self,
    view: ViewMode
  ) {
    self.view = view;
  }

  pub fn set_current_date(
    &mut self,
    date: Instant
  ) {
    self.current = date;
  }

  pub fn set_locale(
    &mut self,
    locale: Option<Locale>
  ) {
    self.locale = locale;
  }

  /// Closed range of the period on screen.
  #[must_use]
  pub fn date_range(&self) -> DateRange {
    compute_range(&self.current, self.view)
  }

  #[must_use]
  pub fn period_label(&self) -> String {
    period_label(
      &self.current,
      self.view,
      self.locale
    )
  }
}
