use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument};

use crate::cli::{Command, EventsArgs, PeriodArgs};
use crate::config::Config;
use crate::datastore::load_events;
use crate::datetime::{DateInput, first_instant_of, parse_date_input};
use crate::event::NormalizedEvent;
use crate::interval::{clip_to_day, group_by_day, is_multi_day};
use crate::label::{parse_locale, period_label};
use crate::layout::position;
use crate::loader::CommandLoader;
use crate::period::{DateRange, ViewMode, is_in_range, month_days, week_days, year_months};
use crate::render::{AgendaRow, Renderer};
use crate::scheduler::Scheduler;
use crate::source::{EventSource, EventStore};

#[instrument(skip(cfg, renderer, command))]
pub fn dispatch(cfg: &Config, renderer: &Renderer, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Range { period } => {
            let scheduler = build_scheduler(cfg, &period)?;
            renderer.print_range(&scheduler.period_label(), &scheduler.date_range())
        }
        Command::Label { period } => {
            let scheduler = build_scheduler(cfg, &period)?;
            renderer.print_label(&scheduler.period_label())
        }
        Command::Grid { period } => {
            let scheduler = build_scheduler(cfg, &period)?;
            cmd_grid(renderer, &scheduler)
        }
        Command::Events(args) => cmd_events(cfg, renderer, &args),
    }
}

/// Anchor, view, zone and locale from the command line, falling back to
/// the configuration.
#[instrument(skip(cfg, args))]
pub fn build_scheduler(cfg: &Config, args: &PeriodArgs) -> anyhow::Result<Scheduler> {
    let tz = cfg.timezone(args.tz.as_deref());
    let anchor = match &args.date {
        Some(raw) => parse_date_input(&DateInput::from(raw.as_str()), tz)
            .with_context(|| format!("invalid --date {raw}"))?,
        None => Utc::now().with_timezone(&tz),
    };
    let view = match args.view {
        Some(view) => view,
        None => cfg.view_mode()?,
    };
    let locale = match &args.locale {
        Some(raw) => Some(parse_locale(raw).with_context(|| format!("invalid --locale {raw}"))?),
        None => cfg.locale()?,
    };

    let mut scheduler = Scheduler::new(anchor).with_view(view).with_locale(locale);
    scheduler.go_by(args.offset);
    debug!(
        timezone = %tz,
        view = %view,
        anchor = %scheduler.current_date(),
        "built scheduler"
    );
    Ok(scheduler)
}

fn cmd_grid(renderer: &Renderer, scheduler: &Scheduler) -> anyhow::Result<()> {
    let anchor = scheduler.current_date();
    renderer.print_label(&scheduler.period_label())?;
    match scheduler.view_mode() {
        ViewMode::Day | ViewMode::Week => renderer.print_grid(&week_days(anchor), anchor, anchor),
        ViewMode::Month => renderer.print_grid(&month_days(anchor), anchor, anchor),
        ViewMode::Year => {
            for month in year_months(anchor) {
                renderer.print_label(&period_label(&month, ViewMode::Month, scheduler.locale()))?;
                renderer.print_grid(&month_days(&month), &month, anchor)?;
            }
            Ok(())
        }
    }
}

fn event_source(cfg: &Config, args: &EventsArgs) -> anyhow::Result<EventSource> {
    if let Some(line) = &args.command {
        return Ok(EventSource::Dynamic(Arc::new(CommandLoader::from_command_line(line)?)));
    }
    if let Some(path) = &args.file {
        return Ok(EventSource::Static(load_events(path)?));
    }
    if let Some(line) = cfg.events_command() {
        return Ok(EventSource::Dynamic(Arc::new(CommandLoader::from_command_line(&line)?)));
    }
    if let Some(path) = cfg.events_file() {
        return Ok(EventSource::Static(load_events(&path)?));
    }
    Err(anyhow!(
        "no event source: pass --file or --command, or set events.file or events.command"
    ))
}

#[instrument(skip(cfg, renderer, args))]
fn cmd_events(cfg: &Config, renderer: &Renderer, args: &EventsArgs) -> anyhow::Result<()> {
    let scheduler = build_scheduler(cfg, &args.period)?;
    let hour_height = match args.hour_height {
        Some(height) if height.is_finite() && height > 0.0 => height,
        Some(height) => return Err(anyhow!("--hour-height must be positive, got {height}")),
        None => cfg.hour_height()?,
    };

    let tz = scheduler.timezone();
    let range = scheduler.date_range();
    let store = EventStore::new(event_source(cfg, args)?, tz);
    store.load(range.clone());
    if let Some(err) = store.last_error() {
        return Err(anyhow!("failed to load events: {err}"));
    }

    let visible = store.visible(&range);
    info!(visible = visible.len(), range = %scheduler.period_label(), "events in range");

    if args.json {
        return renderer.print_json(&visible);
    }

    renderer.print_label(&scheduler.period_label())?;
    let rows = agenda_rows(&visible, &range, tz, hour_height, args.clip)?;
    renderer.print_agenda(&rows)
}

/// One row per event per visible day, in day order.
pub fn agenda_rows(
    visible: &[NormalizedEvent],
    range: &DateRange,
    tz: Tz,
    hour_height: f64,
    clip: bool,
) -> anyhow::Result<Vec<AgendaRow>> {
    let grouped = group_by_day(visible);
    let mut days: Vec<(&String, NaiveDate)> = grouped
        .keys()
        .map(|key| {
            NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .map(|date| (key, date))
                .with_context(|| format!("invalid day key {key}"))
        })
        .collect::<anyhow::Result<_>>()?;
    days.sort_by_key(|(_, date)| *date);

    let mut rows = Vec::new();
    for (key, date) in days {
        let day_start = first_instant_of(date, tz);
        if !is_in_range(&day_start, &range.start, &range.end) {
            continue;
        }
        for event in &grouped[key] {
            let shown = if clip {
                clip_to_day(event, &day_start)
            } else {
                None
            };
            let placed = shown.as_ref().unwrap_or(*event);
            rows.push(AgendaRow {
                day: key.clone(),
                time: (!placed.is_all_day)
                    .then(|| (placed.start_date.clone(), placed.end_date.clone())),
                label: event.label().to_string(),
                position: position(placed, &day_start, hour_height),
                multi_day: is_multi_day(event),
            });
        }
    }
    Ok(rows)
}
