use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Location of the user overlay, before tilde expansion.
const USER_CONFIG_PATH: &str = "~/.config/shellstream/config.toml";

static CURRENT: OnceLock<Config> = OnceLock::new();

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub temp: TempConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Interpreter for shell-form commands: `program args... <command text>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShellConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "/bin/sh".into(),
            args: vec!["-c".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessConfig {
    #[serde(default = "default_true")]
    pub kill_on_abandon: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            kill_on_abandon: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TempConfig {
    pub prefix: String,
}

impl Default for TempConfig {
    fn default() -> Self {
        Self {
            prefix: "shellstream".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Empty means no log file.
    #[serde(default)]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "warn".into()
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    shell: ShellOverlay,
    #[serde(default)]
    process: ProcessOverlay,
    #[serde(default)]
    temp: TempOverlay,
    #[serde(default)]
    logging: LoggingOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct ShellOverlay {
    program: Option<String>,
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    remove_args: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ProcessOverlay {
    kill_on_abandon: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TempOverlay {
    prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingOverlay {
    level: Option<String>,
    file: Option<String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Embedded defaults merged with the user overlay at
    /// `~/.config/shellstream/config.toml`, if one exists.
    ///
    /// A broken overlay is logged and ignored; use [`Config::load_from`]
    /// to get the parse error instead.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        let path = PathBuf::from(shellexpand::tilde(USER_CONFIG_PATH).as_ref());
        if path.is_file() {
            match Self::read_overlay(&path) {
                Ok(overlay) => config.apply_overlay(overlay),
                Err(e) => log::warn!("{e}"),
            }
        }
        config
    }

    /// Embedded defaults merged with the overlay file at `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default_config();
        config.apply_overlay(Self::read_overlay(path)?);
        Ok(config)
    }

    /// The process-wide configuration, loaded on first use.
    pub fn current() -> &'static Config {
        CURRENT.get_or_init(Config::load)
    }

    /// Set the process-wide configuration. Fails, handing the value back,
    /// once [`Config::current`] has been initialized.
    pub fn install(config: Config) -> std::result::Result<(), Config> {
        CURRENT.set(config)
    }

    fn read_overlay(path: &Path) -> Result<ConfigOverlay> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let s = overlay.shell;
        if let Some(v) = s.program {
            self.shell.program = v;
        }
        merge_list(&mut self.shell.args, s.args, &s.remove_args, s.replace);

        if let Some(v) = overlay.process.kill_on_abandon {
            self.process.kill_on_abandon = v;
        }

        if let Some(v) = overlay.temp.prefix {
            self.temp.prefix = v;
        }

        let l = overlay.logging;
        if let Some(v) = l.level {
            self.logging.level = v;
        }
        if let Some(v) = l.file {
            self.logging.file = v;
        }
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
