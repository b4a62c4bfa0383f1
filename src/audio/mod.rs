pub mod analyzer;
pub mod meter;
pub mod ring;

use crate::config::AudioSource;
use crate::error::CaptureError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use std::io::{self, Write};
use std::sync::Arc;

pub use analyzer::{AnalyzerConfig, SpectrumAnalyzer, SpectrumFrame, WaveData};
pub use meter::{AudioLevels, LevelMeter};
pub use ring::{AudioBytes, SampleRing};

#[cfg(target_os = "macos")]
use screencapturekit::cm::AudioBufferList;
#[cfg(target_os = "macos")]
use screencapturekit::prelude::*;

pub fn list_input_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let devices = host.input_devices().map_err(CaptureError::Devices)?;

    let mut out = io::stdout();
    writeln!(out, "Input devices:")?;
    for dev in devices {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {}", name)?;
    }
    Ok(())
}

enum AudioBackend {
    Cpal(cpal::Stream),
    #[cfg(target_os = "macos")]
    ScreenCaptureKit(SCStream),
}

/// Live capture feeding a shared [`SampleRing`].
pub struct AudioSystem {
    backend: Option<AudioBackend>,
    ring: Arc<SampleRing>,
    pub sample_rate_hz: u32,
}

impl AudioSystem {
    pub fn start(
        source: AudioSource,
        device_query: Option<&str>,
        ring: Arc<SampleRing>,
    ) -> Result<Self, CaptureError> {
        match source {
            AudioSource::Mic => Self::start_mic(device_query, ring),
            AudioSource::System => Self::start_system(ring),
        }
    }

    fn start_mic(device_query: Option<&str>, ring: Arc<SampleRing>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = select_mic_input_device(&host, device_query)?;
        let supported = device.default_input_config()?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let err_fn = |err| tracing::warn!("audio stream error: {err}");
        let sink = Arc::clone(&ring);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| push_interleaved(data, channels, &sink),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| push_interleaved(data, channels, &sink),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| push_interleaved(data, channels, &sink),
                err_fn,
                None,
            )?,
            fmt => return Err(CaptureError::UnsupportedFormat(format!("{fmt:?}"))),
        };

        stream.play()?;
        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate_hz,
            channels,
            "microphone capture started"
        );

        Ok(Self {
            backend: Some(AudioBackend::Cpal(stream)),
            ring,
            sample_rate_hz,
        })
    }

    fn start_system(ring: Arc<SampleRing>) -> Result<Self, CaptureError> {
        #[cfg(not(target_os = "macos"))]
        {
            let _ = ring;
            Err(CaptureError::SystemUnsupported)
        }

        #[cfg(target_os = "macos")]
        {
            let sample_rate_hz = 48_000u32;
            let handler = SystemAudioHandler {
                ring: Arc::clone(&ring),
            };
            let stream = start_system_audio_stream(handler)?;
            tracing::info!(sample_rate_hz, "system audio capture started");

            Ok(Self {
                backend: Some(AudioBackend::ScreenCaptureKit(stream)),
                ring,
                sample_rate_hz,
            })
        }
    }

    pub fn ring(&self) -> Arc<SampleRing> {
        Arc::clone(&self.ring)
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_some()
    }

    /// Tears down the capture session. Calling it again does nothing.
    pub fn stop(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };
        match backend {
            AudioBackend::Cpal(stream) => {
                let _ = stream.pause();
            }
            #[cfg(target_os = "macos")]
            AudioBackend::ScreenCaptureKit(stream) => {
                let _ = stream.stop_capture();
            }
        }
        tracing::info!("audio capture stopped");
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.stop();
    }
}

fn select_mic_input_device(
    host: &cpal::Host,
    device_query: Option<&str>,
) -> Result<cpal::Device, CaptureError> {
    let devices = host.input_devices()?.collect::<Vec<_>>();

    let want = device_query.map(|s| s.to_lowercase());
    if let Some(want) = want.as_deref() {
        if let Some(dev) = devices.iter().find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(want))
                .unwrap_or(false)
        }) {
            return Ok(dev.clone());
        }
        return Err(CaptureError::DeviceNotFound(want.to_string()));
    }

    host.default_input_device()
        .ok_or(CaptureError::NoDefaultDevice)
}

fn push_interleaved<T: Sample<Float = f32> + Copy>(data: &[T], channels: usize, ring: &SampleRing) {
    let channels = channels.max(1);
    ring.extend(data.chunks_exact(channels).map(|frame| {
        let l = frame[0].to_float_sample();
        let r = frame.get(1).map(|s| s.to_float_sample()).unwrap_or(l);
        [l, r]
    }));
}

#[cfg(target_os = "macos")]
struct SystemAudioHandler {
    ring: Arc<SampleRing>,
}

#[cfg(target_os = "macos")]
impl SCStreamOutputTrait for SystemAudioHandler {
    fn did_output_sample_buffer(&self, sample: CMSampleBuffer, of_type: SCStreamOutputType) {
        if !matches!(of_type, SCStreamOutputType::Audio) {
            return;
        }

        let _ = sample.make_data_ready();
        let Some(fmt) = sample.format_description() else {
            return;
        };
        if fmt.audio_is_big_endian() {
            return;
        }

        let is_float = fmt.audio_is_float();
        let bits = fmt.audio_bits_per_channel().unwrap_or(32);
        let channels = fmt.audio_channel_count().unwrap_or(2).max(1) as usize;

        let Some(abl) = sample.audio_buffer_list() else {
            return;
        };

        if is_float && bits == 32 {
            push_buffer_list::<f32>(&abl, channels, &self.ring, |s| s);
        } else if !is_float && bits == 16 {
            push_buffer_list::<i16>(&abl, channels, &self.ring, |s| s as f32 / 32768.0);
        }
    }
}

#[cfg(target_os = "macos")]
fn start_system_audio_stream(
    handler: impl SCStreamOutputTrait + 'static,
) -> Result<SCStream, CaptureError> {
    // Requires the Screen Recording permission for the hosting terminal app.
    let content = SCShareableContent::get().map_err(|e| CaptureError::System(format!(
        "SCShareableContent::get() (Screen Recording permission required): {e}"
    )))?;
    let displays = content.displays();
    let display = displays
        .get(0)
        .ok_or_else(|| CaptureError::System("no displays found".to_string()))?;

    let filter = SCContentFilter::create()
        .with_display(display)
        .with_excluding_windows(&[])
        .build();

    // Audio only; a throttled video stream delivers audio in large late chunks.
    let config = SCStreamConfiguration::new()
        .with_width(2)
        .with_height(2)
        .with_queue_depth(1)
        .with_fps(60)
        .with_captures_audio(true)
        .with_sample_rate(48_000)
        .with_channel_count(2);

    let mut stream = SCStream::new(&filter, &config);
    stream.add_output_handler(handler, SCStreamOutputType::Audio);
    stream
        .start_capture()
        .map_err(|e| CaptureError::System(format!("SCStream::start_capture(): {e}")))?;
    Ok(stream)
}

#[cfg(target_os = "macos")]
fn push_buffer_list<T: Copy>(
    list: &AudioBufferList,
    channels: usize,
    ring: &SampleRing,
    to_f32: impl Fn(T) -> f32,
) {
    if list.num_buffers() == 1 {
        let Some(buf) = list.get(0) else {
            return;
        };
        let data = buf.data();
        if data.is_empty() {
            return;
        }
        let samples = cast_samples::<T>(data);
        let ch = (buf.number_channels as usize).max(channels).max(1);
        ring.extend(samples.chunks_exact(ch).map(|frame| {
            let l = to_f32(frame[0]).clamp(-1.0, 1.0);
            let r = if ch > 1 { to_f32(frame[1]).clamp(-1.0, 1.0) } else { l };
            [l, r]
        }));
        return;
    }

    // Planar: one buffer per channel.
    let chans = list
        .iter()
        .map(|b| b.data())
        .filter(|d| !d.is_empty())
        .take(channels.min(2))
        .map(cast_samples::<T>)
        .collect::<Vec<_>>();
    let Some(left) = chans.first() else {
        return;
    };
    let right = chans.get(1).unwrap_or(left);
    let frames = left.len().min(right.len());
    ring.extend((0..frames).map(|i| {
        [
            to_f32(left[i]).clamp(-1.0, 1.0),
            to_f32(right[i]).clamp(-1.0, 1.0),
        ]
    }));
}

#[cfg(target_os = "macos")]
fn cast_samples<T>(data: &[u8]) -> &[T] {
    // CoreAudio buffers are aligned for their sample type.
    unsafe { std::slice::from_raw_parts(data.as_ptr().cast(), data.len() / std::mem::size_of::<T>()) }
}
