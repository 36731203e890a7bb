use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::period::ViewMode;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "almanac",
    version,
    about = "Almanac: calendar periods and event layout from the command line",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "almanacrc", global = true)]
    pub almanacrc: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Options selecting the period every command works on.
#[derive(Args, Debug, Clone, Default)]
pub struct PeriodArgs {
    /// Anchor date: `2024-03-14`, `2024-03-14 09:30`, RFC 3339 or epoch
    /// milliseconds. Defaults to now.
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long, value_parser = parse_view_mode)]
    pub view: Option<ViewMode>,

    /// Shift the anchor by this many periods; negative goes back.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub offset: i64,

    /// IANA zone name such as `Europe/Berlin`.
    #[arg(long)]
    pub tz: Option<String>,

    /// Month and weekday names, e.g. `fr` or `de-DE`.
    #[arg(long)]
    pub locale: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the period label and its first and last instant.
    Range {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Print the period label.
    Label {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Print the period as a calendar grid, one month grid per month in year view.
    Grid {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// List the events visible in the period, grouped by day.
    Events(EventsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EventsArgs {
    #[command(flatten)]
    pub period: PeriodArgs,

    /// Static event file (`.json` array or `.jsonl`).
    #[arg(long, conflicts_with = "command")]
    pub file: Option<PathBuf>,

    /// Program printing events for the range given as two RFC 3339 arguments.
    #[arg(long)]
    pub command: Option<String>,

    #[arg(long)]
    pub hour_height: Option<f64>,

    /// Lay out only the part of each event that falls on the listed day.
    #[arg(long)]
    pub clip: bool,

    /// Print the visible events as JSON.
    #[arg(long)]
    pub json: bool,
}

fn parse_view_mode(raw: &str) -> Result<ViewMode, String> {
    raw.parse::<ViewMode>().map_err(|err| err.to_string())
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pull positional `rc.key=value` and `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&os_args(&[
            "almanac",
            "rc.view=month",
            "label",
            "rc.locale:fr",
            "rc.nothing",
        ]))
        .expect("preprocess");
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.view".to_string(), "month".to_string()),
                ("rc.locale".to_string(), "fr".to_string()),
            ]
        );
        assert_eq!(pre.cleaned_args, os_args(&["almanac", "label", "rc.nothing"]));
    }

    #[test]
    fn parses_events_command_with_period_options() {
        let cli = GlobalCli::try_parse_from(os_args(&[
            "almanac",
            "-vv",
            "--rc",
            "color=off",
            "events",
            "--date",
            "2024-03-14",
            "--view",
            "Month",
            "--offset",
            "-2",
            "--file",
            "events.json",
            "--clip",
        ]))
        .expect("parse cli");

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.rc_overrides[0].key, "color");
        let Command::Events(args) = cli.command else {
            panic!("expected events command");
        };
        assert_eq!(args.period.view, Some(ViewMode::Month));
        assert_eq!(args.period.offset, -2);
        assert_eq!(args.period.date.as_deref(), Some("2024-03-14"));
        assert!(args.clip);
        assert!(!args.json);
    }

    #[test]
    fn rejects_unknown_view_and_conflicting_sources() {
        assert!(
            GlobalCli::try_parse_from(os_args(&["almanac", "label", "--view", "decade"])).is_err()
        );
        assert!(
            GlobalCli::try_parse_from(os_args(&[
                "almanac",
                "events",
                "--file",
                "a.json",
                "--command",
                "feed",
            ]))
            .is_err()
        );
    }

    #[test]
    fn key_val_requires_equals() {
        assert!("view".parse::<KeyVal>().is_err());
        let kv: KeyVal = " view = day ".parse().expect("kv");
        assert_eq!(kv.key, "view");
        assert_eq!(kv.value, "day");
    }
}
