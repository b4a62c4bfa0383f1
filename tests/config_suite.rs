use clap::Parser;
use milkwarp::config::{AudioSource, Config, EngineMode, RendererMode, VisualizerConfig};
use std::time::Duration;

fn parse(args: &[&str]) -> Config {
    Config::try_parse_from(std::iter::once("milkwarp").chain(args.iter().copied()))
        .expect("arguments parse")
}

#[test]
fn defaults_are_valid() {
    let cfg = parse(&[]);
    cfg.validate().unwrap();
    assert_eq!(cfg.source, AudioSource::Mic);
    assert_eq!(cfg.renderer, RendererMode::HalfBlock);
    assert_eq!(cfg.engine, EngineMode::default());
    assert!(cfg.auto_switch_enabled());
    assert_eq!(cfg.switch_interval(), Duration::from_secs(15));
    assert_eq!((cfg.mesh_cols, cfg.mesh_rows), (48, 36));
    assert!(cfg.blocked.is_empty());
}

#[test]
fn auto_switch_flags_last_one_wins() {
    assert!(!parse(&["--no-auto-switch"]).auto_switch_enabled());
    assert!(parse(&["--no-auto-switch", "--auto-switch"]).auto_switch_enabled());
    assert!(!parse(&["--auto-switch", "--no-auto-switch"]).auto_switch_enabled());
}

#[test]
fn blocked_presets_accumulate() {
    let cfg = parse(&["--block", "Slow Tunnel", "--block", "Vector Field"]);
    assert_eq!(cfg.blocked, vec!["Slow Tunnel", "Vector Field"]);
}

#[test]
fn renderer_aliases() {
    assert_eq!(parse(&["--renderer", "hb"]).renderer, RendererMode::HalfBlock);
    assert_eq!(parse(&["--renderer", "ansi"]).renderer, RendererMode::Ascii);
    assert_eq!(parse(&["--engine", "gpu"]).engine, EngineMode::Metal);
}

#[test]
fn unknown_flag_is_rejected() {
    assert!(Config::try_parse_from(["milkwarp", "--kitty"]).is_err());
}

#[test]
fn validate_rejects_out_of_range_values() {
    for args in [
        &["--fps", "0"][..],
        &["--fps", "500"],
        &["--scale", "0"],
        &["--scale", "9"],
        &["--mesh-cols", "1"],
        &["--mesh-rows", "1000"],
        &["--fft-size", "1000"],
        &["--fft-size", "32"],
        &["--switch-seconds", "0.5"],
    ] {
        assert!(parse(args).validate().is_err(), "{args:?} should be rejected");
    }
}

#[test]
fn visualizer_config_carries_the_flags() {
    let cfg = parse(&[
        "--engine",
        "cpu",
        "--mesh-cols",
        "32",
        "--mesh-rows",
        "24",
        "--fps",
        "30",
        "--shuffle",
        "--no-auto-switch",
        "--switch-seconds",
        "8",
    ]);
    let vc = cfg.visualizer(320, 200);
    assert_eq!(
        vc,
        VisualizerConfig {
            width: 320,
            height: 200,
            mesh_cols: 32,
            mesh_rows: 24,
            fps: 30.0,
            engine: EngineMode::Cpu,
            auto_switch: false,
            switch_interval: Duration::from_secs(8),
            shuffle: true,
            ..VisualizerConfig::default()
        }
    );
}
