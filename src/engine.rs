use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::audio::{
    AnalyzerConfig, AudioBytes, AudioLevels, LevelMeter, SampleRing, SpectrumAnalyzer, WaveData,
    analyzer::WAVE_SAMPLES,
};
use crate::catalog::{PresetCatalog, PresetDefinition};
use crate::config::VisualizerConfig;
use crate::error::{CatalogError, EngineError, PipelineError};
use crate::runtime::{GlobalVars, PresetRuntime};
use crate::scheduler::PresetScheduler;
use crate::visual::{FramePipeline, make_backend};

/// The consumer-facing visualizer: audio in, composed RGBA frames out.
///
/// Owns the catalog, scheduler, the running preset and the frame pipeline.
/// Everything here runs on the render thread; only the sample ring is shared
/// with the capture callback.
pub struct Visualizer {
    catalog: PresetCatalog,
    scheduler: PresetScheduler,
    runtime: Option<PresetRuntime>,
    pipeline: FramePipeline,

    ring: Arc<SampleRing>,
    analyzer: SpectrumAnalyzer,
    meter: LevelMeter,
    wave: WaveData,
    capture_available: bool,
    analyzer_ok: bool,
    snap_left: Vec<f32>,
    snap_right: Vec<f32>,
    levels: AudioLevels,

    mesh: (usize, usize),
    start: Instant,
    last_frame: Option<Instant>,
    frame: u64,
    fps: f32,

    listeners: Vec<Sender<String>>,
}

impl Visualizer {
    pub fn new(
        config: &VisualizerConfig,
        catalog: PresetCatalog,
        ring: Arc<SampleRing>,
        capture_available: bool,
    ) -> Result<Self, EngineError> {
        if catalog.is_empty() {
            return Err(CatalogError::Empty.into());
        }
        let (analyzer, analyzer_ok) =
            match SpectrumAnalyzer::new(AnalyzerConfig::for_stream(config.fft_size, config.sample_rate_hz)) {
                Ok(a) => (a, true),
                Err(e) => {
                    warn!(
                        error = %e,
                        sample_rate_hz = config.sample_rate_hz,
                        "spectrum analyzer unavailable, rendering with neutral levels"
                    );
                    (SpectrumAnalyzer::new(AnalyzerConfig::default())?, false)
                }
            };
        let backend = make_backend(config.engine)?;
        let pipeline = FramePipeline::new(
            config.width,
            config.height,
            config.mesh_cols,
            config.mesh_rows,
            backend,
        )?;
        if !capture_available && analyzer_ok {
            warn!("audio capture unavailable, rendering with neutral levels");
        }

        let now = Instant::now();
        let mut scheduler = PresetScheduler::new(catalog.len(), now);
        scheduler.set_auto_switch(config.auto_switch, config.switch_interval, config.shuffle, now);
        let snap = analyzer.fft_size().max(WAVE_SAMPLES);

        Ok(Self {
            catalog,
            scheduler,
            runtime: None,
            pipeline,
            ring,
            analyzer,
            meter: LevelMeter::new(),
            wave: WaveData::default(),
            capture_available,
            analyzer_ok,
            snap_left: vec![0.0; snap],
            snap_right: vec![0.0; snap],
            levels: AudioLevels::neutral(),
            mesh: (config.mesh_cols, config.mesh_rows),
            start: now,
            last_frame: None,
            frame: 0,
            fps: config.fps.max(1.0),
            listeners: Vec::new(),
        })
    }

    pub fn catalog(&self) -> &PresetCatalog {
        &self.catalog
    }

    pub fn scheduler(&self) -> &PresetScheduler {
        &self.scheduler
    }

    pub fn runtime(&self) -> Option<&PresetRuntime> {
        self.runtime.as_ref()
    }

    pub fn preset_name(&self) -> Option<&str> {
        self.runtime.as_ref().map(|r| r.name())
    }

    pub fn levels(&self) -> AudioLevels {
        self.levels
    }

    pub fn size(&self) -> (usize, usize) {
        self.pipeline.size()
    }

    pub fn backend_name(&self) -> &'static str {
        self.pipeline.backend_name()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Whether audio drives the levels: capture is running and the analyzer
    /// could be built for its sample rate.
    pub fn capture_available(&self) -> bool {
        self.capture_available && self.analyzer_ok
    }

    pub fn set_capture_available(&mut self, available: bool) {
        if self.capture_available && !available {
            warn!("audio capture lost, rendering with neutral levels");
        }
        self.capture_available = available;
        self.meter.reset();
    }

    /// Receives the name of every preset loaded from now on.
    pub fn subscribe(&mut self) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    /// Replaces the running preset with a fresh runtime for `def`. The
    /// definition need not come from the catalog.
    pub fn load_preset(&mut self, def: &PresetDefinition) {
        let now = Instant::now();
        match self.catalog.position(&def.name) {
            Some(i) => {
                self.scheduler.select(i, now);
            }
            None => self.scheduler.restart_timer(now),
        }
        self.load_preset_at(def, now);
    }

    fn load_preset_at(&mut self, def: &PresetDefinition, now: Instant) {
        let globals = self.globals(now);
        self.runtime = Some(PresetRuntime::new(def, &globals));
        info!(preset = %def.name, "preset loaded");
        self.listeners.retain(|tx| tx.send(def.name.clone()).is_ok());
    }

    fn load_index(&mut self, index: usize, now: Instant) -> bool {
        let Some(def) = self.catalog.get(index).cloned() else {
            return false;
        };
        self.scheduler.select(index, now);
        self.load_preset_at(&def, now);
        true
    }

    pub fn load_named(&mut self, name: &str) -> Result<(), CatalogError> {
        let index = self
            .catalog
            .position(name)
            .ok_or_else(|| CatalogError::UnknownPreset(name.to_string()))?;
        self.load_index(index, Instant::now());
        Ok(())
    }

    pub fn advance_to_next(&mut self) {
        let now = Instant::now();
        if let Some(i) = self.scheduler.next(now) {
            self.load_index(i, now);
        }
    }

    pub fn previous(&mut self) {
        let now = Instant::now();
        if let Some(i) = self.scheduler.prev(now) {
            self.load_index(i, now);
        }
    }

    pub fn set_auto_switch(&mut self, enabled: bool, interval_ms: u64, randomized: bool) {
        self.scheduler.set_auto_switch(
            enabled,
            Duration::from_millis(interval_ms),
            randomized,
            Instant::now(),
        );
    }

    pub fn toggle_auto_switch(&mut self) {
        self.scheduler.toggle_auto_switch(Instant::now());
    }

    pub fn toggle_shuffle(&mut self) {
        self.scheduler.toggle_shuffle();
    }

    /// Skips the named presets when switching. Unknown names are ignored.
    pub fn set_blocked(&mut self, names: &[String]) {
        let indices = self.indices_of(names);
        self.scheduler.set_blocked(&indices);
    }

    /// Narrows switching to the named presets; `None` clears the filter.
    pub fn set_playlist(&mut self, names: Option<&[String]>) {
        let indices = names.map(|n| self.indices_of(n));
        self.scheduler.set_playlist(indices.as_deref());
    }

    fn indices_of(&self, names: &[String]) -> Vec<usize> {
        names
            .iter()
            .filter_map(|n| {
                let idx = self.catalog.position(n);
                if idx.is_none() {
                    debug!(name = %n, "unknown preset name ignored");
                }
                idx
            })
            .collect()
    }

    pub fn latest_samples(&self, count: usize) -> (Vec<f32>, Vec<f32>) {
        self.ring.snapshot(count)
    }

    pub fn latest_audio_bytes(&self, count: usize) -> AudioBytes {
        self.ring.latest_audio_bytes(count)
    }

    /// Resizes the render targets. On failure the previous size stays.
    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), PipelineError> {
        self.pipeline.resize(width, height)
    }

    pub fn render_frame(&mut self) -> &[u8] {
        self.render_frame_at(Instant::now())
    }

    /// Renders one frame as of `now`; offline rendering passes synthetic instants.
    pub fn render_frame_at(&mut self, now: Instant) -> &[u8] {
        if let Some(last) = self.last_frame {
            let dt = now.saturating_duration_since(last).as_secs_f32();
            if dt > 0.0 {
                self.fps = (self.fps * 0.9 + 0.1 / dt).clamp(1.0, 240.0);
            }
        }
        self.last_frame = Some(now);

        if let Some(i) = self.scheduler.poll(now) {
            info!(index = i, "auto switch");
            self.load_index(i, now);
        }
        if self.runtime.is_none() {
            let first = self
                .scheduler
                .active()
                .or_else(|| self.scheduler.candidates().first().copied())
                .unwrap_or(0);
            self.load_index(first, now);
        }

        self.ring.snapshot_into(&mut self.snap_left, &mut self.snap_right);
        let capture_available = self.capture_available();
        let spectrum = self.analyzer.analyze(&self.snap_left, &self.snap_right);
        self.levels = if capture_available {
            self.meter.update(spectrum, self.fps)
        } else {
            AudioLevels::neutral()
        };
        self.wave.update(&self.snap_left, &self.snap_right, spectrum);

        let globals = self.globals(now);
        self.frame += 1;
        match self.runtime.as_mut() {
            Some(rt) => self.pipeline.render(rt, &globals, &self.wave),
            None => self.pipeline.output(),
        }
    }

    fn globals(&self, now: Instant) -> GlobalVars {
        let (width, height) = self.pipeline.size();
        GlobalVars {
            frame: self.frame,
            time: now.saturating_duration_since(self.start).as_secs_f64(),
            fps: self.fps as f64,
            levels: self.levels,
            mesh_cols: self.mesh.0,
            mesh_rows: self.mesh.1,
            width,
            height,
        }
    }
}
