use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, anyhow};
use tracing::{debug, info};

use crate::event::RawEvent;

/// On-disk layout of a static event collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFileFormat {
    /// One JSON array holding every event.
    Json,
    /// One JSON event per line; blank lines are skipped.
    JsonLines,
}

impl EventFileFormat {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                Ok(Self::JsonLines)
            }
            _ => Err(anyhow!(
                "unsupported event file {}: expected a .json or .jsonl extension",
                path.display()
            )),
        }
    }
}

/// Read a static event collection, choosing the format from the extension.
#[tracing::instrument(skip(path), fields(file = %path.display()))]
pub fn load_events(path: &Path) -> anyhow::Result<Vec<RawEvent>> {
    let events = match EventFileFormat::from_path(path)? {
        EventFileFormat::Json => load_json(path)?,
        EventFileFormat::JsonLines => load_jsonl(path)?,
    };
    info!(count = events.len(), "loaded event file");
    Ok(events)
}

fn load_json(path: &Path) -> anyhow::Result<Vec<RawEvent>> {
    debug!(file = %path.display(), "loading json");
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

fn load_jsonl(path: &Path) -> anyhow::Result<Vec<RawEvent>> {
    debug!(file = %path.display(), "loading jsonl");
    let file =
        fs::File::open(path).with_context(|| format!("failed reading {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let event: RawEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(event);
    }

    debug!(count = out.len(), "loaded events from jsonl");
    Ok(out)
}
