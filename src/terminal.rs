use anyhow::Context;
use crossterm::{
    ExecutableCommand, cursor,
    terminal::{self, ClearType},
};
use std::io::{Stdout, Write, stdout};
use std::sync::Once;

/// Smallest terminal the status line and one picture row fit into.
pub const MIN_SIZE: (u16, u16) = (4, 2);

static PANIC_HOOK: Once = Once::new();

/// Raw mode plus alternate screen for as long as the guard lives.
///
/// A panic while the guard is alive restores the terminal before the panic
/// message is printed.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn new() -> anyhow::Result<Self> {
        PANIC_HOOK.call_once(|| {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                restore();
                previous(info);
            }));
        });

        terminal::enable_raw_mode().context("enable raw mode")?;
        let guard = Self { _private: () };

        let mut out = stdout();
        out.execute(terminal::EnterAlternateScreen)
            .context("enter alternate screen")?
            .execute(terminal::Clear(ClearType::All))
            .context("clear screen")?
            .execute(cursor::Hide)
            .context("hide cursor")?;

        Ok(guard)
    }

    pub fn stdout() -> Stdout {
        stdout()
    }

    /// Terminal size in cells, rejecting sizes too small to draw into.
    pub fn size() -> anyhow::Result<(u16, u16)> {
        let (cols, rows) = terminal::size().context("get terminal size")?;
        if cols < MIN_SIZE.0 || rows < MIN_SIZE.1 {
            anyhow::bail!(
                "terminal too small (need at least {}x{}, got {cols}x{rows})",
                MIN_SIZE.0,
                MIN_SIZE.1
            );
        }
        Ok((cols, rows))
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        restore();
    }
}

fn restore() {
    let _ = terminal::disable_raw_mode();
    let mut out = stdout();
    // End synchronized update, re-enable autowrap, reset colors.
    let _ = out.write_all(b"\x1b[?2026l\x1b[?7h\x1b[0m");
    let _ = out.flush();
    let _ = out.execute(cursor::Show);
    let _ = out.execute(terminal::LeaveAlternateScreen);
}
