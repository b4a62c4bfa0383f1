use crate::render::{Frame, Renderer, frame_begin, frame_end, luma_u8};
use std::io::Write;

#[derive(Default)]
pub struct AsciiRenderer {
    last_fg: Option<(u8, u8, u8)>,
}

impl AsciiRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for AsciiRenderer {
    fn name(&self) -> &'static str {
        "ascii"
    }

    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        if !frame_begin(frame, out)? {
            return Ok(());
        }
        self.last_fg = None;

        // Dark to bright.
        const RAMP: &[u8] = b" .,:;irsXA253hMHGS#9B&@";
        let cols = frame.term_cols as usize;
        let rows = frame.visual_rows as usize;

        for y in 0..rows {
            for x in 0..cols {
                let fg = frame.rgb_at(x, y, cols, rows);
                let l = luma_u8(fg.0, fg.1, fg.2) as usize;
                let ch = RAMP[l * (RAMP.len() - 1) / 255];
                if self.last_fg != Some(fg) {
                    write!(out, "\x1b[38;2;{};{};{}m", fg.0, fg.1, fg.2)?;
                    self.last_fg = Some(fg);
                }
                out.write_all(&[ch])?;
            }
            out.write_all(b"\r\n")?;
        }

        frame_end(frame, out)
    }
}
