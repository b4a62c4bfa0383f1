#[allow(dead_code)]
#[path = "../src/bin/export_video.rs"]
mod export_video;

use approx::assert_abs_diff_eq;
use clap::Parser;
use milkwarp::config::EngineMode;
use std::path::PathBuf;

fn parse(extra: &[&str]) -> export_video::Cli {
    let mut argv = vec!["export_video", "--input", "song.wav"];
    argv.extend_from_slice(extra);
    export_video::Cli::try_parse_from(argv).expect("parse should succeed")
}

fn wav_bytes(format: u16, channels: u16, rate: u32, bits: u16, data: &[u8]) -> Vec<u8> {
    let block = channels * bits / 8;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&format.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&(rate * block as u32).to_le_bytes());
    out.extend_from_slice(&block.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

// ── Arguments ───────────────────────────────────────────────────────────────

#[test]
fn defaults_are_stable() {
    let args = parse(&[]);
    assert_eq!(args.input, PathBuf::from("song.wav"));
    assert_eq!(args.output, PathBuf::from("export.mp4"));
    assert_eq!((args.width, args.height, args.fps), (1280, 720, 60));
    assert_eq!(args.duration, None);
    assert_eq!(args.switch_seconds, None);
    assert_eq!(args.engine, EngineMode::Cpu);
    assert!(export_video::validate_args(&args).is_ok());
}

#[test]
fn overrides_parse() {
    let args = parse(&[
        "--output",
        "clips/out.mp4",
        "--width",
        "640",
        "--height",
        "360",
        "--fps",
        "30",
        "--duration",
        "12.5",
        "--preset",
        "Mirror Bloom",
        "--switch-seconds",
        "4",
    ]);
    assert_eq!(args.output, PathBuf::from("clips/out.mp4"));
    assert_eq!((args.width, args.height, args.fps), (640, 360, 30));
    assert_eq!(args.duration, Some(12.5));
    assert_eq!(args.preset.as_deref(), Some("Mirror Bloom"));
    assert_eq!(args.switch_seconds, Some(4.0));
    assert!(export_video::validate_args(&args).is_ok());
}

#[test]
fn input_is_required() {
    assert!(export_video::Cli::try_parse_from(["export_video"]).is_err());
}

#[test]
fn odd_dimensions_are_rejected() {
    assert!(export_video::validate_args(&parse(&["--width", "641"])).is_err());
    assert!(export_video::validate_args(&parse(&["--height", "0"])).is_err());
}

#[test]
fn fps_and_durations_are_range_checked() {
    assert!(export_video::validate_args(&parse(&["--fps", "0"])).is_err());
    assert!(export_video::validate_args(&parse(&["--fps", "241"])).is_err());
    assert!(export_video::validate_args(&parse(&["--duration", "0"])).is_err());
    assert!(export_video::validate_args(&parse(&["--switch-seconds", "0.5"])).is_err());
    assert!(export_video::validate_args(&parse(&["--switch-seconds", "1"])).is_ok());
}

// ── Timing ──────────────────────────────────────────────────────────────────

#[test]
fn duration_is_capped() {
    assert_abs_diff_eq!(export_video::compute_export_duration(10.0, None), 10.0);
    assert_abs_diff_eq!(export_video::compute_export_duration(10.0, Some(4.0)), 4.0);
    assert_abs_diff_eq!(export_video::compute_export_duration(3.0, Some(4.0)), 3.0);
    assert_abs_diff_eq!(export_video::compute_export_duration(-1.0, None), 0.0);
}

#[test]
fn frame_count_floors_but_never_hits_zero() {
    assert_eq!(export_video::compute_frame_count(2.0, 30), 60);
    assert_eq!(export_video::compute_frame_count(1.99, 30), 59);
    assert_eq!(export_video::compute_frame_count(0.0, 60), 1);
}

#[test]
fn audio_feed_tracks_frame_index() {
    assert_eq!(export_video::samples_through_frame(0, 60, 48_000), 800);
    assert_eq!(export_video::samples_through_frame(59, 60, 48_000), 48_000);
    assert_eq!(export_video::samples_through_frame(0, 0, 48_000), 48_000);
}

// ── WAV decoding ────────────────────────────────────────────────────────────

#[test]
fn pcm16_stereo_decodes() {
    let data = [i16::MAX, i16::MIN, 0, 16384]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect::<Vec<_>>();
    let wav = export_video::parse_wav(&wav_bytes(1, 2, 44_100, 16, &data)).unwrap();
    assert_eq!(wav.sample_rate_hz, 44_100);
    assert_eq!(wav.channels, 2);
    assert_eq!(wav.frames(), 2);
    assert_abs_diff_eq!(wav.samples[0], 32767.0 / 32768.0);
    assert_abs_diff_eq!(wav.samples[1], -1.0);
    assert_abs_diff_eq!(wav.samples[3], 0.5);
}

#[test]
fn float32_mono_decodes_and_clamps() {
    let data = [0.25f32, -2.0, 1.5]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect::<Vec<_>>();
    let wav = export_video::parse_wav(&wav_bytes(3, 1, 48_000, 32, &data)).unwrap();
    assert_eq!(wav.samples, vec![0.25, -1.0, 1.0]);
    assert_eq!(wav.frames(), 3);
}

#[test]
fn trailing_partial_frame_is_dropped() {
    let data = [1i16, 2, 3].iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<_>>();
    let wav = export_video::parse_wav(&wav_bytes(1, 2, 8_000, 16, &data)).unwrap();
    assert_eq!(wav.samples.len(), 2);
}

#[test]
fn malformed_wavs_are_rejected() {
    assert!(export_video::parse_wav(b"RIFF").is_err());
    let mut bad = wav_bytes(1, 1, 8_000, 16, &[0; 4]);
    bad[8..12].copy_from_slice(b"AVI ");
    assert!(export_video::parse_wav(&bad).is_err());
    assert!(export_video::parse_wav(&wav_bytes(1, 1, 8_000, 24, &[0; 6])).is_err());
    assert!(export_video::parse_wav(&wav_bytes(1, 0, 8_000, 16, &[0; 4])).is_err());
}

#[test]
fn wav_is_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    std::fs::write(&path, wav_bytes(1, 1, 8_000, 16, &[0, 0, 0, 64])).unwrap();
    let wav = export_video::read_wav(&path).unwrap();
    assert_eq!(wav.samples, vec![0.0, 0.5]);
    assert!(export_video::read_wav(&dir.path().join("missing.wav")).is_err());
}
