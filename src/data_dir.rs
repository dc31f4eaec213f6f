use std::path::{Path, PathBuf};

/// Manages the player's `$XDG_CONFIG_HOME/<player>/` directory layout.
///
/// The player keeps its control FIFO, its output log and its own config
/// file side by side in one directory. This struct provides accessors for
/// each well-known path; it never creates or removes anything itself.
#[derive(Debug, Clone)]
pub struct PlayerDir {
    root: PathBuf,
}

impl PlayerDir {
    /// Create a new PlayerDir referencing the given root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the directory for `player` from the environment.
    ///
    /// Uses `$XDG_CONFIG_HOME/<player>` when set and non-empty, otherwise
    /// `$HOME/.config/<player>`. Falls back to a relative `.config` if no
    /// home directory can be determined.
    pub fn from_env(player: &str) -> Self {
        let xdg = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
        Self::new(config_home(xdg, dirs::home_dir()).join(player))
    }

    /// The root directory (e.g. `~/.config/pianobar/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default path of the control FIFO.
    pub fn ctl(&self) -> PathBuf {
        self.root.join("ctl")
    }

    /// Default path of the output log the player appends to.
    pub fn out(&self) -> PathBuf {
        self.root.join("out")
    }

    /// Path to the player's own config file.
    pub fn config(&self) -> PathBuf {
        self.root.join("config")
    }
}

fn config_home(xdg: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    match xdg {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => home
            .map(|h| h.join(".config"))
            .unwrap_or_else(|| PathBuf::from(".config")),
    }
}
