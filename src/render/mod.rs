mod halfblock;

pub use halfblock::HalfBlockRenderer;

use std::io::Write;

/// One terminal frame: an RGBA surface for the visual area plus HUD text.
pub struct Frame<'a> {
    pub term_cols: u16,
    pub term_rows: u16,
    pub visual_rows: u16,
    pub pixel_width: usize,
    pub pixel_height: usize,
    pub pixels_rgba: &'a [u8],
    pub hud: &'a str,
    pub hud_rows: u16,
    pub overlay: Option<&'a str>,
    pub sync_updates: bool,
}

impl Frame<'_> {
    /// Pixel at `(x, y)`, black when outside the buffer.
    pub fn pixel(&self, x: usize, y: usize) -> (u8, u8, u8) {
        if x >= self.pixel_width || y >= self.pixel_height {
            return (0, 0, 0);
        }
        let i = (y * self.pixel_width + x) * 4;
        match self.pixels_rgba.get(i..i + 3) {
            Some(p) => (p[0], p[1], p[2]),
            None => (0, 0, 0),
        }
    }
}

pub trait Renderer {
    fn name(&self) -> &'static str;
    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()>;
}

/// Draws `text` in a framed panel centred over the visual; the first line is
/// the title.
pub fn draw_overlay_panel(
    out: &mut dyn Write,
    term_cols: u16,
    term_rows: u16,
    text: &str,
) -> anyhow::Result<()> {
    let cols = term_cols as usize;
    let rows = term_rows as usize;
    if text.trim().is_empty() || cols < 10 || rows < 4 {
        return Ok(());
    }

    let inner_max = cols - 4;
    let lines = text
        .lines()
        .map(|l| truncate_chars(l, inner_max))
        .take(rows - 2)
        .collect::<Vec<_>>();
    let inner_w = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(1, inner_max);

    let box_w = inner_w + 4;
    let box_h = lines.len() + 2;
    let col0 = (cols - box_w) / 2 + 1;
    let row0 = (rows.saturating_sub(box_h)) / 2 + 1;
    let edge = "-".repeat(box_w - 2);

    out.write_all(b"\x1b[0m\x1b[38;2;230;236;250m\x1b[48;2;8;10;20m")?;
    write!(out, "\x1b[{row0};{col0}H+{edge}+")?;
    for (i, line) in lines.iter().enumerate() {
        let pad = inner_w - line.chars().count();
        let row = row0 + 1 + i;
        if i == 0 {
            write!(
                out,
                "\x1b[{row};{col0}H| \x1b[1m{line}\x1b[22m{:pad$} |",
                ""
            )?;
        } else {
            write!(out, "\x1b[{row};{col0}H| {line}{:pad$} |", "")?;
        }
    }
    write!(out, "\x1b[{};{col0}H+{edge}+", row0 + box_h - 1)?;
    out.write_all(b"\x1b[0m")?;
    Ok(())
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
