use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "milkwarp", version, about = "MilkDrop-style audio-reactive visualizer for the terminal")]
pub struct Config {
    #[arg(long, value_enum, default_value_t = AudioSource::Mic)]
    pub source: AudioSource,

    /// Input device name (substring match).
    #[arg(long)]
    pub device: Option<String>,

    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    #[arg(long, value_enum, default_value_t = EngineMode::default())]
    pub engine: EngineMode,

    #[arg(long, value_enum, default_value_t = RendererMode::HalfBlock)]
    pub renderer: RendererMode,

    /// Preset catalog JSON; the bundled catalog is used when omitted.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// JSON array of preset names that filters and orders the catalog.
    #[arg(long)]
    pub curated: Option<PathBuf>,

    #[arg(long)]
    pub preset: Option<String>,

    #[arg(long = "auto-switch", overrides_with = "no_auto_switch")]
    pub auto_switch: bool,

    #[arg(long = "no-auto-switch", overrides_with = "auto_switch")]
    pub no_auto_switch: bool,

    #[arg(long, default_value_t = 15.0)]
    pub switch_seconds: f32,

    #[arg(long, default_value_t = false)]
    pub shuffle: bool,

    /// Preset name to skip; may be repeated.
    #[arg(long = "block")]
    pub blocked: Vec<String>,

    #[arg(long, default_value_t = 48)]
    pub mesh_cols: usize,

    #[arg(long, default_value_t = 36)]
    pub mesh_rows: usize,

    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Render at 1/scale of the terminal pixel size and upscale.
    #[arg(long, default_value_t = 1)]
    pub scale: usize,

    #[arg(long, default_value_t = 1024)]
    pub fft_size: usize,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sync_updates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioSource {
    Mic,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RendererMode {
    #[value(alias = "ansi", alias = "text")]
    Ascii,
    #[value(name = "half-block", alias = "halfblock", alias = "half_block", alias = "hb")]
    HalfBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineMode {
    Cpu,
    #[value(alias = "gpu")]
    Metal,
}

impl Default for EngineMode {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Metal
        } else {
            Self::Cpu
        }
    }
}

impl Config {
    pub fn auto_switch_enabled(&self) -> bool {
        // Auto-switching is on unless `--no-auto-switch` was the last word.
        !self.no_auto_switch
    }

    pub fn switch_interval(&self) -> Duration {
        Duration::from_secs_f32(self.switch_seconds.max(0.1))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fps == 0 || self.fps > 240 {
            bail!("--fps must be in 1..=240 (got {})", self.fps);
        }
        if self.scale == 0 || self.scale > 8 {
            bail!("--scale must be in 1..=8 (got {})", self.scale);
        }
        if self.mesh_cols < 2 || self.mesh_rows < 2 || self.mesh_cols > 512 || self.mesh_rows > 512 {
            bail!(
                "--mesh-cols/--mesh-rows must be in 2..=512 (got {}x{})",
                self.mesh_cols,
                self.mesh_rows
            );
        }
        if !self.fft_size.is_power_of_two() || self.fft_size < 64 || self.fft_size > 16384 {
            bail!("--fft-size must be a power of two in 64..=16384 (got {})", self.fft_size);
        }
        if !self.switch_seconds.is_finite() || self.switch_seconds < 1.0 {
            bail!("--switch-seconds must be at least 1 (got {})", self.switch_seconds);
        }
        Ok(())
    }

    /// Engine settings for a render target of `width × height` pixels.
    pub fn visualizer(&self, width: usize, height: usize) -> VisualizerConfig {
        VisualizerConfig {
            width,
            height,
            mesh_cols: self.mesh_cols,
            mesh_rows: self.mesh_rows,
            fps: self.fps as f32,
            fft_size: self.fft_size,
            sample_rate_hz: 48_000,
            engine: self.engine,
            auto_switch: self.auto_switch_enabled(),
            switch_interval: self.switch_interval(),
            shuffle: self.shuffle,
        }
    }
}

/// Settings for [`crate::engine::Visualizer`], independent of the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizerConfig {
    pub width: usize,
    pub height: usize,
    pub mesh_cols: usize,
    pub mesh_rows: usize,
    pub fps: f32,
    pub fft_size: usize,
    pub sample_rate_hz: u32,
    pub engine: EngineMode,
    pub auto_switch: bool,
    pub switch_interval: Duration,
    pub shuffle: bool,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            mesh_cols: 64,
            mesh_rows: 48,
            fps: 60.0,
            fft_size: 1024,
            sample_rate_hz: 48_000,
            engine: EngineMode::Cpu,
            auto_switch: true,
            switch_interval: Duration::from_secs(15),
            shuffle: false,
        }
    }
}
