use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use milkwarp::audio::SampleRing;
use milkwarp::catalog::PresetCatalog;
use milkwarp::config::{EngineMode, VisualizerConfig};
use milkwarp::engine::Visualizer;
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT: &str = "export.mp4";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "export_video",
    version,
    about = "Offline visualizer export (WAV input -> MP4 output via ffmpeg)"
)]
pub(crate) struct Cli {
    #[arg(long, value_name = "WAV")]
    pub(crate) input: PathBuf,

    #[arg(long, value_name = "MP4", default_value = DEFAULT_OUTPUT)]
    pub(crate) output: PathBuf,

    #[arg(long, default_value_t = 1280)]
    pub(crate) width: usize,

    #[arg(long, default_value_t = 720)]
    pub(crate) height: usize,

    #[arg(long, default_value_t = 60)]
    pub(crate) fps: u32,

    #[arg(long, value_name = "SECONDS")]
    pub(crate) duration: Option<f32>,

    #[arg(long, value_name = "JSON")]
    pub(crate) catalog: Option<PathBuf>,

    #[arg(long)]
    pub(crate) preset: Option<String>,

    /// Switch presets every N seconds; off when omitted.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) switch_seconds: Option<f32>,

    #[arg(long, value_enum, default_value_t = EngineMode::Cpu)]
    pub(crate) engine: EngineMode,
}

pub(crate) fn compute_export_duration(audio_duration_s: f32, duration_cap_s: Option<f32>) -> f32 {
    let base = audio_duration_s.max(0.0);
    match duration_cap_s {
        Some(cap) => base.min(cap.max(0.0)),
        None => base,
    }
}

pub(crate) fn compute_frame_count(duration_s: f32, fps: u32) -> usize {
    ((duration_s.max(0.0) * fps as f32).floor() as usize).max(1)
}

/// Audio frames that must be in the ring before frame `index` is rendered.
pub(crate) fn samples_through_frame(index: usize, fps: u32, sample_rate_hz: u32) -> usize {
    ((index as u64 + 1) * sample_rate_hz as u64 / fps.max(1) as u64) as usize
}

pub(crate) fn validate_args(args: &Cli) -> Result<()> {
    if args.width == 0 {
        bail!("--width must be >= 1");
    }
    if args.height == 0 {
        bail!("--height must be >= 1");
    }
    if args.width % 2 != 0 || args.height % 2 != 0 {
        bail!("--width and --height must be even for yuv420p output");
    }
    if args.fps == 0 || args.fps > 240 {
        bail!("--fps must be in 1..=240");
    }
    if let Some(cap) = args.duration {
        if !(cap > 0.0) {
            bail!("--duration must be > 0 seconds");
        }
    }
    if let Some(s) = args.switch_seconds {
        if !(s >= 1.0) {
            bail!("--switch-seconds must be at least 1");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();
    run(Cli::parse())
}

fn run(args: Cli) -> Result<()> {
    validate_args(&args)?;
    ensure_ffmpeg_available()?;

    let wav = read_wav(&args.input).with_context(|| format!("read wav {}", args.input.display()))?;
    if wav.frames() == 0 {
        bail!("wav had no samples");
    }
    let audio_duration_s = wav.frames() as f32 / wav.sample_rate_hz as f32;
    let export_duration_s = compute_export_duration(audio_duration_s, args.duration);
    let frame_count = compute_frame_count(export_duration_s, args.fps);

    let catalog = PresetCatalog::open(args.catalog.as_deref(), None).context("load preset catalog")?;
    let ring = Arc::new(SampleRing::new(16_384));
    let config = VisualizerConfig {
        width: args.width,
        height: args.height,
        fps: args.fps as f32,
        sample_rate_hz: wav.sample_rate_hz,
        engine: args.engine,
        auto_switch: args.switch_seconds.is_some(),
        switch_interval: Duration::from_secs_f32(args.switch_seconds.unwrap_or(15.0)),
        ..VisualizerConfig::default()
    };
    let mut vis = Visualizer::new(&config, catalog, Arc::clone(&ring), true)
        .context("start visualizer")?;
    if let Some(name) = &args.preset {
        vis.load_named(name)?;
    }

    let parent = match args.output.parent() {
        Some(p) if p != Path::new("") => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("create output directory {}", parent.display()))?;

    let encoded_duration_s = frame_count as f32 / args.fps as f32;
    let mut ffmpeg = spawn_ffmpeg(&args, encoded_duration_s)?;
    let mut ffmpeg_in = ffmpeg
        .stdin
        .take()
        .context("failed to open ffmpeg stdin for rawvideo input")?;

    let start = Instant::now();
    let mut fed = 0usize;
    for i in 0..frame_count {
        let through = samples_through_frame(i, args.fps, wav.sample_rate_hz).min(wav.frames());
        if through > fed {
            ring.write_interleaved(&wav.samples[fed * wav.channels..through * wav.channels], wav.channels);
            fed = through;
        }
        let t = Duration::from_secs_f64(i as f64 / args.fps as f64);
        let pixels = vis.render_frame_at(start + t);
        ffmpeg_in
            .write_all(pixels)
            .context("write frame to ffmpeg stdin")?;
    }
    drop(ffmpeg_in);

    let status = ffmpeg.wait().context("wait for ffmpeg")?;
    if !status.success() {
        bail!("ffmpeg exited with status {status}");
    }

    println!(
        "exported {} frames @ {} fps (duration {:.3}s) -> {}",
        frame_count,
        args.fps,
        encoded_duration_s,
        args.output.display()
    );
    Ok(())
}

fn ensure_ffmpeg_available() -> Result<()> {
    match Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!("ffmpeg -version failed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            bail!("ffmpeg not found in PATH (install ffmpeg and retry)")
        }
        Err(err) => Err(anyhow!("failed to run ffmpeg: {err}")),
    }
}

fn spawn_ffmpeg(args: &Cli, duration_s: f32) -> Result<std::process::Child> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
        .arg("-video_size")
        .arg(format!("{}x{}", args.width, args.height))
        .arg("-framerate")
        .arg(args.fps.to_string())
        .args(["-i", "-"])
        .arg("-i")
        .arg(&args.input)
        .args(["-map", "0:v:0", "-map", "1:a:0"])
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"])
        .arg("-t")
        .arg(format!("{duration_s:.6}"))
        .args(["-shortest", "-movflags", "+faststart"])
        .arg(&args.output)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    cmd.spawn().with_context(|| {
        format!(
            "spawn ffmpeg for output {} (audio {})",
            args.output.display(),
            args.input.display()
        )
    })
}

/// Interleaved float samples as decoded from a WAV file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Wav {
    pub(crate) sample_rate_hz: u32,
    pub(crate) channels: usize,
    pub(crate) samples: Vec<f32>,
}

impl Wav {
    pub(crate) fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }
}

pub(crate) fn read_wav(path: &Path) -> Result<Wav> {
    let bytes = fs::read(path)?;
    parse_wav(&bytes)
}

pub(crate) fn parse_wav(bytes: &[u8]) -> Result<Wav> {
    if bytes.len() < 44 {
        bail!("wav too small");
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        bail!("not a RIFF/WAVE file");
    }

    let mut format = 0u16;
    let mut channels = 0u16;
    let mut sample_rate_hz = 0u32;
    let mut bits = 0u16;
    let mut data: Option<&[u8]> = None;

    let le16 = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
    let le32 = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

    let mut pos = 12usize;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = le32(pos + 4) as usize;
        let start = pos + 8;
        let end = start.saturating_add(size).min(bytes.len());

        if id == b"fmt " {
            if size < 16 || start + 16 > bytes.len() {
                bail!("invalid fmt chunk");
            }
            format = le16(start);
            channels = le16(start + 2);
            sample_rate_hz = le32(start + 4);
            bits = le16(start + 14);
        } else if id == b"data" {
            data = Some(&bytes[start..end]);
        }
        pos = start.saturating_add(size) + (size % 2);
    }

    let data = data.context("missing data chunk")?;
    if channels == 0 {
        bail!("invalid channel count");
    }
    if sample_rate_hz == 0 {
        bail!("invalid sample rate");
    }

    let samples: Vec<f32> = match (format, bits) {
        (1, 16) => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect(),
        (3, 32) => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]).clamp(-1.0, 1.0))
            .collect(),
        _ => bail!(
            "unsupported wav format: audio_format={format} bits={bits} (supported: PCM16, Float32)"
        ),
    };
    let channels = channels as usize;
    let whole = samples.len() / channels * channels;
    let mut samples = samples;
    samples.truncate(whole);
    Ok(Wav {
        sample_rate_hz,
        channels,
        samples,
    })
}
