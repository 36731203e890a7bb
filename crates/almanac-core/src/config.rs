use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::Locale;
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::{
  parse_timezone,
  resolve_timezone
};
use crate::label::parse_locale;
use crate::layout::DEFAULT_HOUR_HEIGHT;
use crate::period::ViewMode;

const RC_ENV_VAR: &str = "ALMANACRC";
const RC_FILE_NAME: &str = ".almanacrc";

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "view".to_string(),
      ViewMode::default()
        .as_key()
        .to_string()
    );
    map.insert(
      "hour_height".to_string(),
      DEFAULT_HOUR_HEIGHT.to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(almanacrc = %path.display(), "loading almanacrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no almanacrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self
      .map
      .get(key)
      .map(|v| v.trim())
      .filter(|v| !v.is_empty())
      .map(ToString::to_string)
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn view_mode(
    &self
  ) -> anyhow::Result<ViewMode> {
    match self.get("view") {
      | Some(raw) => {
        raw.parse::<ViewMode>().with_context(
          || "invalid config key view"
        )
      }
      | None => Ok(ViewMode::default())
    }
  }

  pub fn hour_height(
    &self
  ) -> anyhow::Result<f64> {
    let Some(raw) = self.get("hour_height")
    else {
      return Ok(DEFAULT_HOUR_HEIGHT);
    };
    let value =
      raw.parse::<f64>().with_context(
        || {
          format!(
            "invalid config key \
             hour_height: {raw}"
          )
        }
      )?;
    if !value.is_finite() || value <= 0.0 {
      return Err(anyhow!(
        "hour_height must be a positive \
         number, got {raw}"
      ));
    }
    Ok(value)
  }

  pub fn locale(
    &self
  ) -> anyhow::Result<Option<Locale>> {
    self
      .get("locale")
      .map(|raw| {
        parse_locale(&raw).with_context(
          || "invalid config key locale"
        )
      })
      .transpose()
  }

  pub fn events_file(
    &self
  ) -> Option<PathBuf> {
    self.get("events.file").map(|raw| {
      expand_tilde(Path::new(&raw))
    })
  }

  pub fn events_command(
    &self
  ) -> Option<String> {
    self.get("events.command")
  }

  pub fn color(&self) -> bool {
    self.get_bool("color").unwrap_or(true)
  }

  /// Calendar zone: `cli_tz`, then the
  /// `timezone` key, then the environment
  /// and time config file, then UTC.
  #[tracing::instrument(skip(self))]
  pub fn timezone(
    &self,
    cli_tz: Option<&str>
  ) -> Tz {
    let configured = self.get("timezone");
    let candidates = [
      ("--tz", cli_tz),
      ("rc.timezone", configured.as_deref())
    ];

    for (source, raw) in candidates {
      let Some(raw) = raw else {
        continue;
      };
      match parse_timezone(raw) {
        | Ok(tz) => {
          debug!(source, timezone = %tz, "resolved timezone");
          return tz;
        }
        | Err(err) => {
          warn!(source, error = %err, "ignoring timezone");
        }
      }
    }

    resolve_timezone(None)
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path) {
      warn!(file = %path.display(), "config file already loaded; skipping include cycle");
      return Ok(());
    }
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping \
       almanacrc"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

pub(crate) fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if text == "~"
    && let Some(home) = dirs::home_dir()
  {
    return home;
  }
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
