mod ascii;
mod halfblock;

pub use ascii::AsciiRenderer;
pub use halfblock::HalfBlockRenderer;

use std::io::Write;

/// One composed frame ready for the terminal. The pixel buffer may be smaller
/// than the cell grid (`--scale`); renderers pick the nearest pixel.
pub struct Frame<'a> {
    pub term_cols: u16,
    pub visual_rows: u16,
    pub pixel_width: usize,
    pub pixel_height: usize,
    pub pixels_rgba: &'a [u8],
    pub status: &'a str,
    pub sync_updates: bool,
}

impl Frame<'_> {
    /// RGB at virtual position (`x`, `y`) of a `vw × vh` grid laid over the pixels.
    pub fn rgb_at(&self, x: usize, y: usize, vw: usize, vh: usize) -> (u8, u8, u8) {
        let px = (x * self.pixel_width / vw.max(1)).min(self.pixel_width - 1);
        let py = (y * self.pixel_height / vh.max(1)).min(self.pixel_height - 1);
        let i = (py * self.pixel_width + px) * 4;
        (self.pixels_rgba[i], self.pixels_rgba[i + 1], self.pixels_rgba[i + 2])
    }

    fn is_drawable(&self) -> bool {
        self.term_cols > 0
            && self.visual_rows > 0
            && self.pixel_width > 0
            && self.pixel_height > 0
            && self.pixels_rgba.len() >= self.pixel_width * self.pixel_height * 4
    }
}

pub trait Renderer {
    fn name(&self) -> &'static str;
    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()>;
}

pub(crate) fn luma_u8(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 54 + g as u32 * 183 + b as u32 * 19) >> 8) as u8
}

/// Starts a frame: sync mode, cursor home, autowrap off. Returns false when
/// there is nothing to draw.
pub(crate) fn frame_begin(frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<bool> {
    if !frame.is_drawable() {
        return Ok(false);
    }
    if frame.sync_updates {
        out.write_all(b"\x1b[?2026h")?;
    }
    // Autowrap off while painting full-width rows, or the last column wraps.
    out.write_all(b"\x1b[H\x1b[0m\x1b[?7l")?;
    Ok(true)
}

/// Writes the status line under the picture and ends the frame.
pub(crate) fn frame_end(frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
    let cols = frame.term_cols as usize;
    write!(out, "\x1b[{};1H\x1b[0m\x1b[2K", frame.visual_rows as usize + 1)?;
    let status: String = frame.status.chars().take(cols).collect();
    out.write_all(status.as_bytes())?;
    out.write_all(b"\x1b[?7h")?;
    if frame.sync_updates {
        out.write_all(b"\x1b[?2026l")?;
    }
    out.flush()?;
    Ok(())
}
