use crate::audio::{AudioSystem, SampleRing};
use crate::catalog::PresetCatalog;
use crate::config::{Config, RendererMode};
use crate::engine::Visualizer;
use crate::render::{AsciiRenderer, Frame, HalfBlockRenderer, Renderer};
use crate::terminal::TerminalGuard;
use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::io::BufWriter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// About a third of a second of stereo audio at 48 kHz.
const RING_FRAMES: usize = 16_384;
const STATUS_ROWS: u16 = 1;

pub fn run(cfg: Config) -> anyhow::Result<()> {
    cfg.validate()?;
    let catalog = PresetCatalog::open(cfg.catalog.as_deref(), cfg.curated.as_deref())
        .context("load preset catalog")?;

    let ring = Arc::new(SampleRing::new(RING_FRAMES));
    let audio = match AudioSystem::start(cfg.source, cfg.device.as_deref(), Arc::clone(&ring)) {
        Ok(a) => Some(a),
        Err(e) => {
            warn!(source = ?cfg.source, error = %e, "audio capture unavailable");
            None
        }
    };

    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());

    let mut renderer: Box<dyn Renderer> = match cfg.renderer {
        RendererMode::HalfBlock => Box::new(HalfBlockRenderer::new()),
        RendererMode::Ascii => Box::new(AsciiRenderer::new()),
    };
    let px_h_mul = match cfg.renderer {
        RendererMode::HalfBlock => 2,
        RendererMode::Ascii => 1,
    };

    let mut last_size = TerminalGuard::size()?;
    let (w, h) = render_size(last_size, px_h_mul, cfg.scale);
    let mut vcfg = cfg.visualizer(w, h);
    if let Some(a) = &audio {
        vcfg.sample_rate_hz = a.sample_rate_hz;
    }
    let mut vis = Visualizer::new(&vcfg, catalog, ring, audio.is_some())
        .context("start visualizer")?;
    vis.set_blocked(&cfg.blocked);
    let names = vis.subscribe();
    if let Some(name) = &cfg.preset {
        vis.load_named(name)?;
    }

    let mut resize_gate = ResizeGate::default();
    let mut preset_name = String::new();
    let mut fps = FpsCounter::new();
    let target = Duration::from_secs_f32(1.0 / cfg.fps as f32);
    let source_label = match &audio {
        Some(_) => format!("{:?}", cfg.source).to_lowercase(),
        None => "no audio".to_string(),
    };

    loop {
        let now = Instant::now();

        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    if handle_key(k.code, k.modifiers, &mut vis) {
                        return Ok(());
                    }
                }
                Event::Resize(c, r) => last_size = (c, r),
                _ => {}
            }
        }

        // Resize events can be missed in some terminals.
        let sz = crossterm::terminal::size()?;
        if sz != last_size {
            last_size = sz;
        }
        let want = render_size(last_size, px_h_mul, cfg.scale);
        if resize_gate.should_attempt(want, vis.size()) {
            // On failure the previous size stays and the frame is scaled to fit.
            let ok = vis.resize(want.0, want.1).is_ok();
            resize_gate.record(want, ok);
        }

        while let Ok(n) = names.try_recv() {
            preset_name = n;
        }
        let sched = vis.scheduler();
        let status = format!(
            " {} | {} | auto {} | shuffle {} | {:.0} fps | n/p next/prev  a auto  s shuffle  q quit",
            preset_name,
            source_label,
            on_off(sched.auto_switch()),
            on_off(sched.shuffle()),
            fps.fps(),
        );

        let (pw, ph) = vis.size();
        let pixels = vis.render_frame_at(now);
        fps.tick();

        let visual_rows = last_size.1.saturating_sub(STATUS_ROWS).max(1);
        let frame = Frame {
            term_cols: last_size.0,
            visual_rows,
            pixel_width: pw,
            pixel_height: ph,
            pixels_rgba: pixels,
            status: &status,
            sync_updates: cfg.sync_updates,
        };
        renderer.render(&frame, &mut out)?;

        let elapsed = now.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
    }
}

/// Render-target size for a terminal of `size` cells.
pub fn render_size(size: (u16, u16), px_h_mul: usize, scale: usize) -> (usize, usize) {
    let (cols, rows) = size;
    let visual_rows = rows.saturating_sub(STATUS_ROWS).max(1) as usize;
    let scale = scale.max(1);
    let w = (cols as usize).div_ceil(scale).max(1);
    let h = (visual_rows * px_h_mul).div_ceil(scale).max(1);
    (w, h)
}

/// Remembers the last render size the pipeline refused, so a failing resize
/// is retried only once the wanted size changes.
#[derive(Debug, Default)]
pub struct ResizeGate {
    refused: Option<(usize, usize)>,
}

impl ResizeGate {
    pub fn should_attempt(&self, want: (usize, usize), current: (usize, usize)) -> bool {
        want != current && self.refused != Some(want)
    }

    pub fn record(&mut self, want: (usize, usize), ok: bool) {
        self.refused = (!ok).then_some(want);
    }
}

/// Returns true when the key asks to quit.
fn handle_key(code: KeyCode, mods: KeyModifiers, vis: &mut Visualizer) -> bool {
    if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
        return true;
    }
    match code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => return true,
        KeyCode::Right | KeyCode::Char('n') | KeyCode::Char('N') => vis.advance_to_next(),
        KeyCode::Left | KeyCode::Char('p') | KeyCode::Char('P') => vis.previous(),
        KeyCode::Char('a') | KeyCode::Char('A') => vis.toggle_auto_switch(),
        KeyCode::Char('s') | KeyCode::Char('S') => vis.toggle_shuffle(),
        _ => {}
    }
    false
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}

struct FpsCounter {
    last: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f32();
        if dt >= 0.5 {
            self.fps = self.frames as f32 / dt;
            self.frames = 0;
            self.last = now;
        }
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}
