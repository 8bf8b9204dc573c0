use anyhow::{bail, Context};
use crossterm::{
    cursor, execute, queue, style,
    terminal::{self, ClearType},
};
use log::warn;
use std::io::{stdout, BufWriter, Stdout, Write};

/// Smallest terminal the host can lay a container and HUD out in.
pub const MIN_COLS: u16 = 4;
pub const MIN_ROWS: u16 = 2;

/// Owns the terminal while the studio runs: raw mode, alternate screen and
/// hidden cursor. Dropping it undoes whatever the half-block renderer may
/// have left switched on mid-frame.
pub struct TerminalGuard {
    sync_updates: bool,
}

impl TerminalGuard {
    pub fn enter(sync_updates: bool) -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("enable raw mode")?;
        // Constructed before the remaining steps so Drop restores raw mode
        // if one of them fails.
        let guard = Self { sync_updates };

        execute!(
            stdout(),
            terminal::EnterAlternateScreen,
            terminal::Clear(ClearType::All),
            cursor::Hide,
            cursor::MoveTo(0, 0)
        )
        .context("prepare studio screen")?;
        Ok(guard)
    }

    /// Buffered writer for whole frames.
    pub fn writer(&self) -> BufWriter<Stdout> {
        BufWriter::with_capacity(1 << 16, stdout())
    }

    /// Terminal size in cells as `(cols, rows)`.
    pub fn size() -> anyhow::Result<(u16, u16)> {
        terminal::size().context("get terminal size")
    }

    /// Like [`TerminalGuard::size`], but refuses terminals too small to draw in.
    pub fn usable_size() -> anyhow::Result<(u16, u16)> {
        let (cols, rows) = Self::size()?;
        if cols < MIN_COLS || rows < MIN_ROWS {
            bail!("terminal too small (need at least {MIN_COLS}x{MIN_ROWS}, got {cols}x{rows})");
        }
        Ok((cols, rows))
    }

    fn restore(&self) -> std::io::Result<()> {
        let mut out = stdout();
        if self.sync_updates {
            queue!(out, terminal::EndSynchronizedUpdate)?;
        }
        queue!(
            out,
            terminal::EnableLineWrap,
            style::ResetColor,
            cursor::Show,
            terminal::LeaveAlternateScreen
        )?;
        out.flush()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        if let Err(err) = self.restore() {
            warn!("restoring terminal: {err}");
        }
    }
}
