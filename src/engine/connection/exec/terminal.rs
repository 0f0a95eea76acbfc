//! Local terminal size and window-change notifications for TTY execs.

use std::io::{self, IsTerminal};
use std::process::{Command, Stdio};

const STTY_COMMAND: &str = "stty";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct TerminalSize {
    pub(super) width: u16,
    pub(super) height: u16,
}

pub(super) trait TerminalSizeProvider {
    fn terminal_size(&self) -> Option<TerminalSize>;
}

/// Reads the controlling terminal's size with `stty size`.
pub(super) struct SystemTerminalSizeProvider;

impl TerminalSizeProvider for SystemTerminalSizeProvider {
    fn terminal_size(&self) -> Option<TerminalSize> {
        if !(io::stdin().is_terminal() && io::stdout().is_terminal()) {
            return None;
        }

        // stty reports on its stdin, so it must see ours.
        let output = Command::new(STTY_COMMAND)
            .arg("size")
            .stdin(Stdio::inherit())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }

        parse_stty_size(std::str::from_utf8(&output.stdout).ok()?)
    }
}

/// `stty size` prints rows then columns.
fn parse_stty_size(output: &str) -> Option<TerminalSize> {
    let mut parts = output.split_whitespace();
    let height = parts.next()?.parse::<u16>().ok()?;
    let width = parts.next()?.parse::<u16>().ok()?;
    Some(TerminalSize { width, height })
}

/// Yields once per `SIGWINCH`; never yields where that signal does not exist.
pub(super) struct ResizeWatcher {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl ResizeWatcher {
    /// A watcher that never fires.
    pub(super) const fn inert() -> Self {
        Self {
            #[cfg(unix)]
            signal: None,
        }
    }

    /// Subscribe to window-change signals for this process.
    #[cfg(unix)]
    pub(super) fn subscribe() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::window_change()).map(|listener| Self {
            signal: Some(listener),
        })
    }

    #[cfg(not(unix))]
    pub(super) fn subscribe() -> io::Result<Self> {
        Ok(Self::inert())
    }

    /// Wait for the next window change.
    pub(super) async fn changed(&mut self) {
        #[cfg(unix)]
        {
            if let Some(listener) = self.signal.as_mut() {
                if listener.recv().await.is_some() {
                    return;
                }
                self.signal = None;
            }
        }
        std::future::pending::<()>().await;
    }
}
