use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, anyhow};
use chrono::SecondsFormat;
use tracing::{debug, info, instrument, warn};

use crate::config::expand_tilde;
use crate::event::RawEvent;
use crate::period::DateRange;
use crate::source::{EventLoader, EventSink};

/// Loads events by running an external program.
///
/// The program receives the range start and end as two RFC 3339 arguments
/// and must print a JSON array of events on stdout.
#[derive(Debug, Clone)]
pub struct CommandLoader {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLoader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Parse a command line such as `my-feed --calendar work`. Arguments are
    /// split on whitespace; no shell quoting is applied.
    pub fn from_command_line(line: &str) -> anyhow::Result<Self> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("events command is empty"))?;
        Ok(Self {
            program: expand_tilde(Path::new(program)),
            args: parts.map(ToString::to_string).collect(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    #[instrument(skip(self, range), fields(program = %self.program.display()))]
    pub fn fetch(&self, range: &DateRange) -> anyhow::Result<Vec<RawEvent>> {
        let start = range.start.to_rfc3339_opts(SecondsFormat::Millis, true);
        let end = range.end.to_rfc3339_opts(SecondsFormat::Millis, true);
        info!(program = %self.program.display(), %start, %end, "running events command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&start)
            .arg(&end)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to run events command {}", self.program.display()))?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            warn!(program = %self.program.display(), stderr = %stderr, "events command wrote stderr");
        }

        if !output.status.success() {
            return Err(anyhow!(
                "events command {} failed with status {}",
                self.program.display(),
                output
                    .status
                    .code()
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ));
        }

        let events: Vec<RawEvent> = serde_json::from_slice(&output.stdout).with_context(|| {
            format!(
                "events command {} emitted invalid event json",
                self.program.display()
            )
        })?;
        debug!(count = events.len(), "events command returned");
        Ok(events)
    }
}

impl EventLoader for CommandLoader {
    fn load(&self, range: DateRange, sink: EventSink) {
        match self.fetch(&range) {
            Ok(events) => {
                sink.deliver(events);
            }
            Err(err) => {
                sink.fail(err);
            }
        }
    }
}
