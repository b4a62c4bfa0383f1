use crate::render::{Frame, Renderer, frame_begin, frame_end};
use std::io::Write;

/// Two pixels per cell: the upper half block in the foreground color over
/// the lower pixel as background.
#[derive(Default)]
pub struct HalfBlockRenderer {
    last_fg: Option<(u8, u8, u8)>,
    last_bg: Option<(u8, u8, u8)>,
}

impl HalfBlockRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for HalfBlockRenderer {
    fn name(&self) -> &'static str {
        "halfblock"
    }

    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        if !frame_begin(frame, out)? {
            return Ok(());
        }
        self.last_fg = None;
        self.last_bg = None;

        const HALF_BLOCK: char = '\u{2580}';
        let cols = frame.term_cols as usize;
        let rows = frame.visual_rows as usize;
        let vh = rows * 2;

        for row in 0..rows {
            for x in 0..cols {
                let top = frame.rgb_at(x, row * 2, cols, vh);
                let bot = frame.rgb_at(x, row * 2 + 1, cols, vh);
                if self.last_fg != Some(top) {
                    write!(out, "\x1b[38;2;{};{};{}m", top.0, top.1, top.2)?;
                    self.last_fg = Some(top);
                }
                if self.last_bg != Some(bot) {
                    write!(out, "\x1b[48;2;{};{};{}m", bot.0, bot.1, bot.2)?;
                    self.last_bg = Some(bot);
                }
                write!(out, "{HALF_BLOCK}")?;
            }
            out.write_all(b"\r\n")?;
        }

        frame_end(frame, out)
    }
}
