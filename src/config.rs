use crate::data_dir::PlayerDir;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Player config key holding the control FIFO path.
pub const KEY_FIFO: &str = "fifo";
/// Player config key holding the output log path.
pub const KEY_OUTPUT: &str = "out";
/// Player config key for the "play" keystroke.
pub const KEY_PLAY: &str = "act_songplay";
/// Player config key for the "toggle pause" keystroke.
pub const KEY_PAUSE_TOGGLE: &str = "act_songpausetoggle";

/// The only keys read from the player's config. Everything else, account
/// credentials included, is dropped while parsing.
const KNOWN_KEYS: [&str; 4] = [KEY_FIFO, KEY_OUTPUT, KEY_PLAY, KEY_PAUSE_TOGGLE];

const DEFAULT_PLAY: &str = "P";
const DEFAULT_PAUSE_TOGGLE: &str = "p";

/// Immutable view of the player's `key = value` config file.
#[derive(Debug, Clone, Default)]
pub struct PlayerConfig {
    entries: HashMap<String, String>,
}

impl PlayerConfig {
    /// Parse `key = value` lines. Blank lines and `#` comments are skipped,
    /// lines without `=` are ignored, and unknown keys are dropped.
    pub fn parse(contents: &str) -> Self {
        let entries = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, _)| KNOWN_KEYS.contains(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { entries }
    }

    /// Read and parse the config file at `path`.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse(&contents))
    }

    /// Load the config, falling back to built-in defaults when the file is
    /// missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), keys = config.entries.len(), "loaded player config");
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no player config, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read player config, using defaults");
                Self::default()
            }
        }
    }

    /// Raw lookup of a known key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Control FIFO path: the `fifo` key, or `<dir>/ctl`.
    pub fn fifo(&self, dir: &PlayerDir) -> PathBuf {
        self.get(KEY_FIFO)
            .map(|p| expand_home(p, dir))
            .unwrap_or_else(|| dir.ctl())
    }

    /// Output log path: the `out` key, or `<dir>/out`.
    pub fn output_log(&self, dir: &PlayerDir) -> PathBuf {
        self.get(KEY_OUTPUT)
            .map(|p| expand_home(p, dir))
            .unwrap_or_else(|| dir.out())
    }

    /// Shortcut keystrokes permitted to launch the player in batch mode.
    pub fn bindings(&self) -> Bindings {
        Bindings {
            play: self.get(KEY_PLAY).unwrap_or(DEFAULT_PLAY).to_string(),
            pause_toggle: self
                .get(KEY_PAUSE_TOGGLE)
                .unwrap_or(DEFAULT_PAUSE_TOGGLE)
                .to_string(),
        }
    }
}

/// Expand a leading `~/`; relative paths resolve against the player directory.
fn expand_home(value: &str, dir: &PlayerDir) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        dir.root().join(path)
    }
}

/// The play and toggle-pause keystrokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bindings {
    pub play: String,
    pub pause_toggle: String,
}

impl Bindings {
    /// Whether `key` is one of the launch-permitting shortcuts.
    pub fn is_shortcut(&self, key: &str) -> bool {
        key == self.play || key == self.pause_toggle
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            play: DEFAULT_PLAY.to_string(),
            pause_toggle: DEFAULT_PAUSE_TOGGLE.to_string(),
        }
    }
}

/// Tool tunables, resolved from CLI flags and their environment fallbacks.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Name of the managed binary, also the config subdirectory.
    pub player: String,
    /// Delay between liveness polls of the death watcher.
    pub poll_interval: Duration,
    /// Number of log lines shown when attaching.
    pub tail_lines: usize,
    /// Wait after launching before anything touches the FIFO or log.
    pub launch_grace: Duration,
    /// Keystroke that ends the interactive session.
    pub quit_key: char,
}
