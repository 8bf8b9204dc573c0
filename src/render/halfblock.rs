use crate::render::{draw_overlay_panel, truncate_chars, Frame, Renderer};
use std::io::Write;

const UPPER_HALF: char = '\u{2580}';

/// Two vertical pixels per cell: foreground paints the top half, background
/// the bottom. A surface that does not match the cell grid (for example
/// between a terminal resize and the next frame) is sampled nearest-neighbour.
#[derive(Default)]
pub struct HalfBlockRenderer {
    fg: Option<(u8, u8, u8)>,
    bg: Option<(u8, u8, u8)>,
}

impl HalfBlockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_colors(
        &mut self,
        out: &mut dyn Write,
        top: (u8, u8, u8),
        bottom: (u8, u8, u8),
    ) -> std::io::Result<()> {
        if self.fg != Some(top) {
            write!(out, "\x1b[38;2;{};{};{}m", top.0, top.1, top.2)?;
            self.fg = Some(top);
        }
        if self.bg != Some(bottom) {
            write!(out, "\x1b[48;2;{};{};{}m", bottom.0, bottom.1, bottom.2)?;
            self.bg = Some(bottom);
        }
        Ok(())
    }
}

impl Renderer for HalfBlockRenderer {
    fn name(&self) -> &'static str {
        "halfblock"
    }

    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        let cols = frame.term_cols as usize;
        let rows = frame.visual_rows as usize;
        if cols == 0 || rows == 0 {
            return Ok(());
        }
        let grid_h = rows * 2;
        let (w, h) = (frame.pixel_width, frame.pixel_height);
        let sample = |x: usize, y: usize| {
            if w == 0 || h == 0 {
                return (0, 0, 0);
            }
            frame.pixel(x * w / cols, y * h / grid_h)
        };

        if frame.sync_updates {
            out.write_all(b"\x1b[?2026h")?;
        }
        // Autowrap off while full-width rows are painted.
        out.write_all(b"\x1b[H\x1b[0m\x1b[?7l")?;
        self.fg = None;
        self.bg = None;

        for row in 0..rows {
            for x in 0..cols {
                let top = sample(x, row * 2);
                let bottom = sample(x, row * 2 + 1);
                self.set_colors(out, top, bottom)?;
                write!(out, "{UPPER_HALF}")?;
            }
            out.write_all(b"\x1b[0m\r\n")?;
            self.fg = None;
            self.bg = None;
        }

        let mut hud = frame.hud.lines();
        for i in 0..frame.hud_rows as usize {
            write!(out, "\x1b[{};1H\x1b[0m\x1b[2K", rows + i + 1)?;
            if let Some(line) = hud.next() {
                write!(out, "{}", truncate_chars(line, cols))?;
            }
        }

        if let Some(text) = frame.overlay {
            draw_overlay_panel(out, frame.term_cols, frame.term_rows, text)?;
        }

        out.write_all(b"\x1b[?7h")?;
        if frame.sync_updates {
            out.write_all(b"\x1b[?2026l")?;
        }
        out.flush()?;
        Ok(())
    }
}
