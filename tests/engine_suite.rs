use milkwarp::audio::{AudioLevels, SampleRing};
use milkwarp::catalog::{PresetCatalog, PresetDefinition};
use milkwarp::config::{EngineMode, VisualizerConfig};
use milkwarp::engine::Visualizer;
use milkwarp::error::{CatalogError, EngineError};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn config() -> VisualizerConfig {
    VisualizerConfig {
        width: 64,
        height: 48,
        mesh_cols: 16,
        mesh_rows: 12,
        auto_switch: false,
        ..VisualizerConfig::default()
    }
}

fn visualizer_with(cfg: &VisualizerConfig, capture: bool) -> (Visualizer, Arc<SampleRing>) {
    let ring = Arc::new(SampleRing::new(4096));
    let vis = Visualizer::new(cfg, PresetCatalog::builtin().unwrap(), Arc::clone(&ring), capture)
        .expect("visualizer");
    (vis, ring)
}

fn visualizer() -> Visualizer {
    visualizer_with(&config(), true).0
}

fn lit(px: &[u8]) -> bool {
    px.chunks_exact(4).any(|p| p[0] != 0 || p[1] != 0 || p[2] != 0)
}

// ── Construction ────────────────────────────────────────────────────────────

#[test]
fn empty_catalog_is_rejected() {
    let ring = Arc::new(SampleRing::new(16));
    let err = Visualizer::new(&config(), PresetCatalog::default(), ring, true).err().unwrap();
    assert!(matches!(err, EngineError::Catalog(CatalogError::Empty)));
}

#[test]
fn bad_fft_size_falls_back_to_neutral_levels() {
    let cfg = VisualizerConfig {
        fft_size: 1000,
        ..config()
    };
    let (mut vis, ring) = visualizer_with(&cfg, true);
    assert!(!vis.capture_available());
    ring.extend((0..4096).map(|i| if i % 2 == 0 { [0.9, 0.9] } else { [-0.9, -0.9] }));
    assert_eq!(vis.render_frame().len(), 64 * 48 * 4);
    assert_eq!(vis.levels(), AudioLevels::neutral());
}

#[test]
fn low_sample_rates_still_drive_levels() {
    for rate in [16_000, 22_050, 24_000] {
        let cfg = VisualizerConfig {
            sample_rate_hz: rate,
            ..config()
        };
        let (mut vis, ring) = visualizer_with(&cfg, true);
        assert!(vis.capture_available(), "{rate} Hz");
        let start = Instant::now();
        for f in 0..30u64 {
            ring.extend((0..rate as u64 / 60).map(|i| {
                let t = (f * rate as u64 / 60 + i) as f32 / rate as f32;
                let s = (t * 2.0 * std::f32::consts::PI * 80.0).sin() * 0.8;
                [s, s]
            }));
            vis.render_frame_at(start + Duration::from_millis(f * 16));
        }
        assert_ne!(vis.levels(), AudioLevels::neutral(), "{rate} Hz");
    }
}

#[cfg(not(target_os = "macos"))]
#[test]
fn metal_engine_fails_off_macos() {
    let cfg = VisualizerConfig {
        engine: EngineMode::Metal,
        ..config()
    };
    let ring = Arc::new(SampleRing::new(16));
    let err = Visualizer::new(&cfg, PresetCatalog::builtin().unwrap(), ring, true).err().unwrap();
    assert!(matches!(err, EngineError::Pipeline(_)));
}

// ── Rendering ───────────────────────────────────────────────────────────────

#[test]
fn first_frame_loads_the_first_preset() {
    let mut vis = visualizer();
    assert!(vis.preset_name().is_none());
    let len = vis.render_frame().len();
    assert_eq!(len, 64 * 48 * 4);
    assert_eq!(vis.preset_name(), Some("Slow Tunnel"));
    assert_eq!(vis.frame_count(), 1);
    assert_eq!(vis.backend_name(), "cpu");
}

#[test]
fn basic_wave_shows_up_on_silence() {
    let mut vis = visualizer();
    let start = Instant::now();
    let mut any = false;
    for f in 0..3u64 {
        any |= lit(vis.render_frame_at(start + Duration::from_millis(f * 16)));
    }
    assert!(any);
}

#[test]
fn every_builtin_preset_renders() {
    let (mut vis, ring) = visualizer_with(&config(), true);
    let names = vis.catalog().names().map(str::to_string).collect::<Vec<_>>();
    let start = Instant::now();
    for (k, name) in names.iter().enumerate() {
        vis.load_named(name).unwrap();
        for f in 0..4u64 {
            ring.extend((0..800).map(|i| {
                let t = (f * 800 + i) as f32 / 48_000.0;
                let s = (t * 2.0 * std::f32::consts::PI * 110.0).sin() * 0.6;
                [s, -s]
            }));
            let at = start + Duration::from_millis((k as u64 * 4 + f) * 16);
            let px = vis.render_frame_at(at);
            assert_eq!(px.len(), 64 * 48 * 4, "{name}");
        }
        assert_eq!(vis.preset_name(), Some(name.as_str()));
    }
}

#[test]
fn missing_capture_uses_neutral_levels() {
    let (mut vis, ring) = visualizer_with(&config(), false);
    ring.extend((0..2048).map(|i| {
        let s = if i % 2 == 0 { 0.9 } else { -0.9 };
        [s, s]
    }));
    vis.render_frame();
    assert_eq!(vis.levels(), AudioLevels::neutral());
    assert!(!vis.capture_available());
}

#[test]
fn resize_changes_the_output() {
    let mut vis = visualizer();
    vis.render_frame();
    vis.resize(32, 20).unwrap();
    assert_eq!(vis.size(), (32, 20));
    assert_eq!(vis.render_frame().len(), 32 * 20 * 4);
    assert!(vis.resize(0, 0).is_err());
    assert_eq!(vis.size(), (32, 20));
}

// ── Switching ───────────────────────────────────────────────────────────────

#[test]
fn subscribers_hear_every_load() {
    let mut vis = visualizer();
    let rx = vis.subscribe();
    vis.load_named("Vector Field").unwrap();
    vis.advance_to_next();
    vis.previous();
    let names = rx.try_iter().collect::<Vec<_>>();
    assert_eq!(names, vec!["Vector Field", "Mirror Bloom", "Vector Field"]);
}

#[test]
fn dropped_subscribers_are_forgotten() {
    let mut vis = visualizer();
    drop(vis.subscribe());
    let rx = vis.subscribe();
    vis.load_named("Plain Feedback").unwrap();
    assert_eq!(rx.recv().unwrap(), "Plain Feedback");
}

#[test]
fn unknown_preset_name_is_an_error() {
    let mut vis = visualizer();
    let err = vis.load_named("No Such Preset").unwrap_err();
    assert!(matches!(err, CatalogError::UnknownPreset(_)));
    assert!(vis.preset_name().is_none());
}

#[test]
fn lookup_ignores_case() {
    let mut vis = visualizer();
    vis.load_named("mirror bloom").unwrap();
    assert_eq!(vis.preset_name(), Some("Mirror Bloom"));
}

#[test]
fn blocked_presets_are_skipped_when_advancing() {
    let mut vis = visualizer();
    vis.set_blocked(&["Radial Breath".to_string(), "Nonexistent".to_string()]);
    vis.load_named("Slow Tunnel").unwrap();
    vis.advance_to_next();
    assert_eq!(vis.preset_name(), Some("Orbiting Lanterns"));
}

#[test]
fn playlist_limits_advancing() {
    let mut vis = visualizer();
    let list = ["Plain Feedback", "Slow Tunnel"].map(String::from);
    vis.set_playlist(Some(&list));
    vis.load_named("Plain Feedback").unwrap();
    vis.advance_to_next();
    assert_eq!(vis.preset_name(), Some("Slow Tunnel"));
    vis.advance_to_next();
    assert_eq!(vis.preset_name(), Some("Plain Feedback"));
}

#[test]
fn auto_switch_fires_on_the_render_clock() {
    let cfg = VisualizerConfig {
        auto_switch: true,
        switch_interval: Duration::from_secs(1),
        ..config()
    };
    let (mut vis, _) = visualizer_with(&cfg, true);
    let start = Instant::now();
    vis.render_frame_at(start);
    assert_eq!(vis.preset_name(), Some("Slow Tunnel"));
    vis.render_frame_at(start + Duration::from_millis(500));
    assert_eq!(vis.preset_name(), Some("Slow Tunnel"));
    vis.render_frame_at(start + Duration::from_millis(1_100));
    assert_eq!(vis.preset_name(), Some("Radial Breath"));
}

#[test]
fn toggles_reach_the_scheduler() {
    let mut vis = visualizer();
    assert!(!vis.scheduler().auto_switch());
    vis.toggle_auto_switch();
    assert!(vis.scheduler().auto_switch());
    vis.toggle_shuffle();
    assert!(vis.scheduler().shuffle());
    vis.set_auto_switch(false, 5_000, false);
    assert!(!vis.scheduler().auto_switch());
    assert_eq!(vis.scheduler().interval(), Duration::from_secs(5));
}

#[test]
fn outside_definition_loads_without_touching_the_catalog() {
    let mut vis = visualizer();
    let def = PresetDefinition {
        name: "Scratch".to_string(),
        ..PresetDefinition::default()
    };
    vis.load_preset(&def);
    assert_eq!(vis.preset_name(), Some("Scratch"));
    assert_eq!(vis.catalog().len(), 8);
    vis.render_frame();
    assert_eq!(vis.preset_name(), Some("Scratch"));
}

#[test]
fn latest_samples_come_from_the_ring() {
    let (vis, ring) = visualizer_with(&config(), true);
    ring.write(0.5, -0.5);
    let (l, r) = vis.latest_samples(2);
    assert_eq!(l, vec![0.0, 0.5]);
    assert_eq!(r, vec![0.0, -0.5]);
    assert_eq!(vis.latest_audio_bytes(1).left, vec![192]);
}
