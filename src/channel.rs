//! Control channel: the named pipe the player reads commands from.
use crate::error::FatalError;
use nix::sys::stat::Mode;
use std::io::Write;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

/// Destination for forwarded keystroke bytes.
pub trait CommandSink: Send + Sync {
    fn send(&self, bytes: &[u8]) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct ControlChannel {
    path: PathBuf,
}

impl ControlChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_fifo(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.file_type().is_fifo())
            .unwrap_or(false)
    }

    /// Make sure a FIFO exists at the channel path.
    ///
    /// An existing FIFO is left alone. Otherwise, with `create_if_missing`
    /// a new FIFO is made (mode 0600); without it nothing is touched and
    /// the missing channel is reported as fatal.
    pub fn ensure(&self, create_if_missing: bool) -> Result<(), FatalError> {
        if self.is_fifo() {
            return Ok(());
        }

        if !create_if_missing {
            if self.path.exists() {
                return Err(FatalError::ControlChannel {
                    path: self.path.clone(),
                    reason: "not a named pipe".to_string(),
                });
            }
            return Err(FatalError::ControlChannelMissing {
                path: self.path.clone(),
            });
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FatalError::ControlChannel {
                path: self.path.clone(),
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        nix::unistd::mkfifo(self.path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| {
            FatalError::ControlChannel {
                path: self.path.clone(),
                reason: format!("mkfifo failed: {e}"),
            }
        })?;

        if !self.is_fifo() {
            return Err(FatalError::ControlChannel {
                path: self.path.clone(),
                reason: "not a named pipe after creation".to_string(),
            });
        }

        tracing::info!(path = %self.path.display(), "created control channel");
        Ok(())
    }

    /// Write `bytes` to the channel.
    ///
    /// Opening blocks until the player has the read end open; there is no
    /// timeout.
    pub fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut fifo = std::fs::OpenOptions::new().write(true).open(&self.path)?;
        fifo.write_all(bytes)?;
        fifo.flush()
    }
}

impl CommandSink for ControlChannel {
    fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        tracing::debug!(len = bytes.len(), "forwarding to control channel");
        self.write(bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every send in order.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub sent: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingSink {
        pub fn concatenated(&self) -> Vec<u8> {
            self.sent.lock().unwrap().concat()
        }

        pub fn messages(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl CommandSink for RecordingSink {
        fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_ensure_creates_fifo_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ctl");
        let channel = ControlChannel::new(&path);

        channel.ensure(true).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());

        // Already present: both modes succeed without touching it.
        channel.ensure(true).unwrap();
        channel.ensure(false).unwrap();
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_ensure_creates_missing_parent_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pianobar").join("ctl");
        ControlChannel::new(&path).ensure(true).unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());
    }

    #[test]
    fn test_ensure_without_create_is_fatal_and_does_not_mutate() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ctl");
        let channel = ControlChannel::new(&path);

        let err = channel.ensure(false).unwrap_err();
        assert!(matches!(err, FatalError::ControlChannelMissing { .. }));
        assert_eq!(err.exit_code(), 1);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_regular_file_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ctl");
        std::fs::write(&path, "oops").unwrap();
        let channel = ControlChannel::new(&path);

        let err = channel.ensure(true).unwrap_err();
        assert!(matches!(err, FatalError::ControlChannel { .. }));
        assert_eq!(err.exit_code(), 1);

        let err = channel.ensure(false).unwrap_err();
        assert!(matches!(err, FatalError::ControlChannel { .. }));

        // The stray file is left in place.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "oops");
    }

    #[test]
    fn test_write_reaches_reader() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ctl");
        let channel = ControlChannel::new(&path);
        channel.ensure(true).unwrap();

        let reader_path = path.clone();
        let reader = std::thread::spawn(move || std::fs::read(reader_path).unwrap());

        channel.send(b"n").unwrap();
        assert_eq!(reader.join().unwrap(), b"n");
    }
}
