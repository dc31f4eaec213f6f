//! Input relay: raw keystrokes from the terminal into the control channel.
//!
//! The loop runs in the foreground and blocks on every read. Key bytes are
//! passed through untouched; the only translations are Enter → `\n` and the
//! quit/cancel keys, which end the session instead of being forwarded.
use crate::channel::CommandSink;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// One keystroke as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keystroke {
    /// Literal bytes to forward.
    Bytes(Vec<u8>),
    /// A key press with no character payload (Enter).
    Empty,
    /// End of input, cancel, or the quit key.
    Quit,
}

/// Blocking source of keystrokes.
pub trait KeySource {
    fn next_key(&mut self) -> std::io::Result<Keystroke>;
}

/// Why the relay loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    Quit,
    ReadFailed,
}

/// Forward keystrokes from `source` to `sink` until quit or read failure.
///
/// A failed write is logged and the loop carries on; the death watcher
/// takes care of a player that has gone away.
pub fn relay(source: &mut dyn KeySource, sink: &dyn CommandSink) -> RelayEnd {
    loop {
        let bytes = match source.next_key() {
            Ok(Keystroke::Quit) => {
                tracing::debug!("quit requested");
                return RelayEnd::Quit;
            }
            Err(e) => {
                tracing::debug!(error = %e, "input read failed, ending session");
                return RelayEnd::ReadFailed;
            }
            Ok(Keystroke::Empty) => b"\n".to_vec(),
            Ok(Keystroke::Bytes(bytes)) => bytes,
        };
        if let Err(e) = sink.send(&bytes) {
            tracing::warn!(error = %e, "failed to forward keystroke");
        }
    }
}

/// Map a terminal key event onto a [`Keystroke`]. `None` means ignore it.
pub fn translate(key: KeyEvent, quit_key: char) -> Option<Keystroke> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char('c' | 'd') if ctrl => Some(Keystroke::Quit),
        KeyCode::Char(c) if ctrl => c
            .is_ascii_alphabetic()
            .then(|| Keystroke::Bytes(vec![(c.to_ascii_lowercase() as u8) & 0x1f])),
        KeyCode::Char(c) if c == quit_key => Some(Keystroke::Quit),
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            Some(Keystroke::Bytes(c.encode_utf8(&mut buf).as_bytes().to_vec()))
        }
        KeyCode::Enter => Some(Keystroke::Empty),
        KeyCode::Tab => Some(Keystroke::Bytes(vec![b'\t'])),
        KeyCode::Backspace => Some(Keystroke::Bytes(vec![0x7f])),
        KeyCode::Esc => Some(Keystroke::Bytes(vec![0x1b])),
        _ => None,
    }
}

/// Keystrokes from the controlling terminal in raw mode.
///
/// Raw mode is entered on open and left again on drop.
pub struct TerminalKeys {
    quit_key: char,
}

impl TerminalKeys {
    pub fn open(quit_key: char) -> std::io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self { quit_key })
    }
}

impl KeySource for TerminalKeys {
    fn next_key(&mut self) -> std::io::Result<Keystroke> {
        loop {
            if let Event::Key(key) = event::read()? {
                if let Some(keystroke) = translate(key, self.quit_key) {
                    return Ok(keystroke);
                }
            }
        }
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}
