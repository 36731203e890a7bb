pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod event;
pub mod interval;
pub mod label;
pub mod layout;
pub mod loader;
pub mod period;
pub mod render;
pub mod scheduler;
pub mod source;

use std::ffi::OsString;

use clap::Parser;
use tracing::{
  debug,
  info
};

pub use datetime::{
  DateInput,
  Instant
};
pub use error::{
  CalendarError,
  CalendarResult
};
pub use event::{
  EventId,
  NormalizedEvent,
  RawEvent
};
pub use interval::DayGroups;
pub use layout::PixelPosition;
pub use period::{
  DateRange,
  Direction,
  ViewMode
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting almanac CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.almanacrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let renderer =
    render::Renderer::new(&cfg);

  commands::dispatch(
    &cfg,
    &renderer,
    cli.command
  )?;

  info!("done");
  Ok(())
}
