use std::io::{self, IsTerminal, Write};

use chrono::{Datelike, NaiveDate, SecondsFormat};
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::Instant;
use crate::layout::PixelPosition;
use crate::period::DateRange;

const WEEKDAY_HEADERS: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

/// One line of the `events` listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AgendaRow {
    pub day: String,
    pub time: Option<(Instant, Instant)>,
    pub label: String,
    pub position: PixelPosition,
    pub multi_day: bool,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self { color: cfg.color() }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self))]
    pub fn print_label(&self, label: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint(label, "1"))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, range))]
    pub fn print_range(&self, label: &str, range: &DateRange) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_range(&mut out, label, range)
    }

    /// `month` picks which days count as in-month; `anchor` is highlighted.
    #[tracing::instrument(skip(self, days, month, anchor))]
    pub fn print_grid(
        &self,
        days: &[Instant],
        month: &Instant,
        anchor: &Instant,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_grid(&mut out, days, month.date_naive(), anchor.date_naive())
    }

    #[tracing::instrument(skip(self, rows), fields(rows = rows.len()))]
    pub fn print_agenda(&self, rows: &[AgendaRow]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_agenda(&mut out, rows)
    }

    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
        Ok(())
    }

    fn write_range<W: Write>(
        &self,
        mut writer: W,
        label: &str,
        range: &DateRange,
    ) -> anyhow::Result<()> {
        writeln!(writer, "{}", self.paint(label, "1"))?;
        writeln!(
            writer,
            "start  {}",
            range.start.to_rfc3339_opts(SecondsFormat::Millis, true)
        )?;
        writeln!(
            writer,
            "end    {}",
            range.end.to_rfc3339_opts(SecondsFormat::Millis, true)
        )?;
        Ok(())
    }

    /// Days are laid out seven to a row. Days outside `month` are dimmed.
    fn write_grid<W: Write>(
        &self,
        writer: W,
        days: &[Instant],
        month: NaiveDate,
        anchor: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = WEEKDAY_HEADERS.iter().map(ToString::to_string).collect();
        let rows = days
            .chunks(7)
            .map(|week| {
                week.iter()
                    .map(|day| {
                        let date = day.date_naive();
                        let text = format!("{:>2}", date.day());
                        if date == anchor {
                            self.paint(&text, "7")
                        } else if (date.year(), date.month()) != (month.year(), month.month()) {
                            self.paint(&text, "2")
                        } else {
                            text
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        write_table(writer, headers, rows)
    }

    fn write_agenda<W: Write>(&self, writer: W, rows: &[AgendaRow]) -> anyhow::Result<()> {
        let headers = vec![
            "Day".to_string(),
            "Time".to_string(),
            "Event".to_string(),
            "Top".to_string(),
            "Height".to_string(),
        ];

        let mut previous_day: Option<&str> = None;
        let table = rows
            .iter()
            .map(|row| {
                let day = if previous_day == Some(row.day.as_str()) {
                    String::new()
                } else {
                    self.paint(&row.day, "33")
                };
                previous_day = Some(row.day.as_str());

                let time = match &row.time {
                    Some((start, end)) => {
                        format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))
                    }
                    None => self.paint("all-day", "36"),
                };
                let label = if row.multi_day {
                    format!("{} (multi-day)", row.label)
                } else {
                    row.label.clone()
                };

                vec![
                    day,
                    time,
                    label,
                    format!("{:.0}", row.position.top),
                    format!("{:.0}", row.position.height),
                ]
            })
            .collect();

        write_table(writer, headers, table)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, &width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for &width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
