//! Process-wide configuration (C8), loaded once at startup from layered
//! sources. Grounded on `bigchaindb/__init__.py`'s global `config` dict
//! and its `_config = copy.deepcopy(config)` backup-for-reset pattern --
//! ported here as an explicit method rather than a module-global mutable
//! dict, which isn't an idiom this codebase wants.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
  pub host: String,
  pub port: u16,
  /// For the shipped embedded-engine backend, this is a filesystem
  /// directory path; `host`/`port` are ignored by that backend.
  pub name: String,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      host: "localhost".into(),
      port: 28015,
      name: "federated_ledger_data".into(),
    }
  }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypairConfig {
  pub public: String,
  pub private: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VotePipelineConfig {
  pub validate_processes_num: usize,
  pub ungroup_processes_num: usize,
  pub fraction_of_cores: f64,
}

impl Default for VotePipelineConfig {
  fn default() -> Self {
    Self {
      validate_processes_num: 1,
      ungroup_processes_num: 1,
      fraction_of_cores: 1.0,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgumentConfig {
  pub txs_length: usize,
  pub pipe_maxsize: usize,
  pub vote_pipeline: VotePipelineConfig,
}

impl Default for ArgumentConfig {
  fn default() -> Self {
    Self {
      txs_length: 1000,
      pipe_maxsize: 2000,
      vote_pipeline: VotePipelineConfig::default(),
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub database: DatabaseConfig,
  pub keypair: KeypairConfig,
  pub keyring: Vec<String>,
  #[serde(with = "humantime_serde")]
  pub backlog_reassign_delay: std::time::Duration,
  #[serde(with = "humantime_serde")]
  pub liveness_threshold: std::time::Duration,
  pub argument_config: ArgumentConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database: DatabaseConfig::default(),
      keypair: KeypairConfig::default(),
      keyring: vec![],
      backlog_reassign_delay: std::time::Duration::from_secs(30),
      liveness_threshold: std::time::Duration::from_secs(15),
      argument_config: ArgumentConfig::default(),
    }
  }
}

impl Config {
  /// Loads defaults, then merges in `path` (a TOML file, if given), then
  /// environment overrides prefixed `FLDG_` (e.g.
  /// `FLDG_BACKLOG_REASSIGN_DELAY=60s`).
  pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let mut value = toml::Value::try_from(Config::default())?;

    if let Some(path) = path {
      let contents = std::fs::read_to_string(path)?;
      let file_value: toml::Value = toml::from_str(&contents)?;
      merge_toml(&mut value, file_value);
    }

    for (key, val) in std::env::vars() {
      if let Some(rest) = key.strip_prefix("FLDG_") {
        set_toml_path(&mut value, &rest.to_lowercase(), &val);
      }
    }

    Ok(value.try_into()?)
  }
}

fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
  match (base, overlay) {
    (toml::Value::Table(base), toml::Value::Table(overlay)) => {
      for (k, v) in overlay {
        match base.get_mut(&k) {
          Some(existing) => merge_toml(existing, v),
          None => {
            base.insert(k, v);
          }
        }
      }
    }
    (base, overlay) => *base = overlay,
  }
}

fn set_toml_path(value: &mut toml::Value, dotted_key: &str, raw: &str) {
  // Environment variables use a single segment mapped onto the
  // top-level key for simplicity; nested keys are not addressable this
  // way, matching the donor's flat env-var convention.
  if let toml::Value::Table(table) = value {
    table.insert(
      dotted_key.to_string(),
      toml::Value::String(raw.to_string()),
    );
  }
}

/// A pristine snapshot and a possibly-modified working copy, mirroring
/// the donor origin project's `config`/`_config` pair. Tests can mutate
/// `current` freely and call `reset()` to restore the baseline without
/// re-reading the process environment or any file.
pub struct ConfigHandle {
  backup: Config,
  pub current: Config,
}

impl ConfigHandle {
  pub fn new(config: Config) -> Self {
    Self {
      backup: config.clone(),
      current: config,
    }
  }

  pub fn reset(&mut self) {
    self.current = self.backup.clone();
  }
}
