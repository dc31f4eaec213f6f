//! Output relay: shows the tail of the player's output log and follows it.
use crate::error::FatalError;
use crate::lifecycle::Coordinator;
use std::borrow::Cow;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

/// How often the log is checked for growth once caught up.
const FOLLOW_POLL: Duration = Duration::from_millis(200);

const SCAN_BLOCK: usize = 8192;

pub struct OutputFollower {
    path: PathBuf,
    lines: usize,
    crlf: bool,
}

impl OutputFollower {
    pub fn new(path: impl Into<PathBuf>, lines: usize) -> Self {
        Self {
            path: path.into(),
            lines,
            crlf: false,
        }
    }

    /// Render `\n` as `\r\n`, for a terminal in raw mode.
    pub fn crlf(mut self, on: bool) -> Self {
        self.crlf = on;
        self
    }

    /// Spawn the follower writing into `out`.
    ///
    /// The log must already exist as a regular file; otherwise nothing is
    /// spawned and the missing log is reported as fatal. The follower only
    /// stops on its own if the log or `out` fails, and then it ends the
    /// session through `coordinator`.
    pub fn start<W>(
        self,
        out: W,
        coordinator: Arc<Coordinator>,
    ) -> Result<JoinHandle<()>, FatalError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let is_file = std::fs::metadata(&self.path)
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(FatalError::OutputLogMissing {
                path: self.path.clone(),
            });
        }

        tracing::debug!(path = %self.path.display(), lines = self.lines, "following output log");
        Ok(tokio::spawn(async move {
            if let Err(e) = self.follow(out).await {
                tracing::warn!(path = %self.path.display(), error = %e, "output follower stopped");
            }
            coordinator.shutdown();
        }))
    }

    async fn follow<W>(&self, mut out: W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut file = std::fs::File::open(&self.path)?;
        let mut pos = tail_offset(&mut file, self.lines)?;
        file.seek(SeekFrom::Start(pos))?;
        let mut file = tokio::fs::File::from_std(file);

        let mut buf = vec![0u8; SCAN_BLOCK];
        loop {
            let n = file.read(&mut buf).await?;
            if n > 0 {
                pos += n as u64;
                out.write_all(&render(&buf[..n], self.crlf)).await?;
                out.flush().await?;
                continue;
            }

            // Caught up. A shorter file means it was truncated underneath us.
            let len = tokio::fs::metadata(&self.path).await?.len();
            if len < pos {
                tracing::debug!(path = %self.path.display(), "output log truncated, rewinding");
                pos = file.seek(SeekFrom::Start(0)).await?;
                continue;
            }
            tokio::time::sleep(FOLLOW_POLL).await;
        }
    }
}

fn render(chunk: &[u8], crlf: bool) -> Cow<'_, [u8]> {
    if !crlf || !chunk.contains(&b'\n') {
        return Cow::Borrowed(chunk);
    }
    let mut rendered = Vec::with_capacity(chunk.len() + chunk.len() / 16);
    for &b in chunk {
        if b == b'\n' {
            rendered.push(b'\r');
        }
        rendered.push(b);
    }
    Cow::Owned(rendered)
}

/// Byte offset where the last `lines` lines of `file` begin.
///
/// A trailing newline does not count as an extra empty line. Scans backwards
/// in blocks so large logs are not read in full.
fn tail_offset(file: &mut std::fs::File, lines: usize) -> std::io::Result<u64> {
    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 || lines == 0 {
        return Ok(len);
    }

    let mut buf = [0u8; SCAN_BLOCK];
    let mut pos = len;
    let mut seen = 0;
    while pos > 0 {
        let chunk = pos.min(SCAN_BLOCK as u64) as usize;
        pos -= chunk as u64;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut buf[..chunk])?;

        for i in (0..chunk).rev() {
            let at = pos + i as u64;
            if buf[i] != b'\n' || at == len - 1 {
                continue;
            }
            seen += 1;
            if seen == lines {
                return Ok(at + 1);
            }
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::tests::recording_coordinator;
    use crate::lifecycle::LifecycleState;
    use std::io::Write;

    fn offset_of(contents: &[u8], lines: usize) -> u64 {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), contents).unwrap();
        let mut file = std::fs::File::open(tmp.path()).unwrap();
        tail_offset(&mut file, lines).unwrap()
    }

    #[test]
    fn test_tail_offset_with_trailing_newline() {
        assert_eq!(offset_of(b"a\nb\nc\n", 2), 2);
        assert_eq!(offset_of(b"a\nb\nc\n", 1), 4);
        assert_eq!(offset_of(b"a\nb\nc\n", 3), 0);
    }

    #[test]
    fn test_tail_offset_without_trailing_newline() {
        assert_eq!(offset_of(b"a\nb\nc", 1), 4);
        assert_eq!(offset_of(b"a\nb\nc", 2), 2);
    }

    #[test]
    fn test_tail_offset_fewer_lines_than_requested() {
        assert_eq!(offset_of(b"only\n", 30), 0);
        assert_eq!(offset_of(b"", 30), 0);
    }

    #[test]
    fn test_tail_offset_zero_lines_starts_at_end() {
        assert_eq!(offset_of(b"a\nb\n", 0), 4);
    }

    #[test]
    fn test_tail_offset_spans_scan_blocks() {
        let line = "x".repeat(100) + "\n";
        let contents = line.repeat(200);
        let offset = offset_of(contents.as_bytes(), 30);
        assert_eq!(offset, (170 * line.len()) as u64);
    }

    #[test]
    fn test_render_crlf() {
        assert_eq!(&*render(b"a\nb\n", true), b"a\r\nb\r\n");
        assert_eq!(&*render(b"a\nb\n", false), b"a\nb\n");
        assert!(matches!(render(b"no newline", true), Cow::Borrowed(_)));
    }

    #[tokio::test]
    async fn test_missing_log_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let (writer, _reader) = tokio::io::duplex(64);
        let (coordinator, teardown) = recording_coordinator();
        let err = OutputFollower::new(tmp.path().join("out"), 30)
            .start(writer, coordinator)
            .unwrap_err();
        assert!(matches!(err, FatalError::OutputLogMissing { .. }));
        assert_eq!(err.exit_code(), 2);
        assert!(teardown.exit_codes().is_empty());
    }

    #[tokio::test]
    async fn test_directory_is_not_a_log() {
        let tmp = tempfile::tempdir().unwrap();
        let (writer, _reader) = tokio::io::duplex(64);
        let (coordinator, _teardown) = recording_coordinator();
        let err = OutputFollower::new(tmp.path(), 30)
            .start(writer, coordinator)
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_streams_tail_then_appended_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out");
        std::fs::write(&path, "one\ntwo\nthree\n").unwrap();

        let (writer, mut reader) = tokio::io::duplex(1024);
        let (coordinator, _teardown) = recording_coordinator();
        let handle = OutputFollower::new(&path, 2)
            .start(writer, coordinator)
            .unwrap();

        let mut head = vec![0u8; "two\nthree\n".len()];
        tokio::time::timeout(Duration::from_secs(5), reader.read_exact(&mut head))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head, b"two\nthree\n");

        let mut log = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(log, "four").unwrap();

        let mut next = vec![0u8; "four\n".len()];
        tokio::time::timeout(Duration::from_secs(5), reader.read_exact(&mut next))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, b"four\n");

        handle.abort();
    }

    #[tokio::test]
    async fn test_rewinds_after_truncation() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out");
        std::fs::write(&path, "old line that is long\n").unwrap();

        let (writer, mut reader) = tokio::io::duplex(1024);
        let (coordinator, _teardown) = recording_coordinator();
        let handle = OutputFollower::new(&path, 1)
            .crlf(true)
            .start(writer, coordinator)
            .unwrap();

        let mut head = vec![0u8; "old line that is long\r\n".len()];
        tokio::time::timeout(Duration::from_secs(5), reader.read_exact(&mut head))
            .await
            .unwrap()
            .unwrap();

        std::fs::write(&path, "new\n").unwrap();
        let mut next = vec![0u8; "new\r\n".len()];
        tokio::time::timeout(Duration::from_secs(5), reader.read_exact(&mut next))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, b"new\r\n");

        handle.abort();
    }

    #[tokio::test]
    async fn test_closed_output_ends_the_session() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out");
        std::fs::write(&path, "one\n").unwrap();

        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        let (coordinator, teardown) = recording_coordinator();
        coordinator.mark_running();
        let handle = OutputFollower::new(&path, 30)
            .start(writer, coordinator.clone())
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(coordinator.state(), LifecycleState::Terminated);
        assert_eq!(teardown.exit_codes(), vec![0]);
    }
}
