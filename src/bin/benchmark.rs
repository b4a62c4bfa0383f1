use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use milkwarp::audio::SampleRing;
use milkwarp::catalog::PresetCatalog;
use milkwarp::config::{EngineMode, VisualizerConfig};
use milkwarp::engine::Visualizer;
use milkwarp::eqn::{ExecEnv, MegaBuf, SlotTable, Vm, compile};

const SAMPLE_RATE_HZ: u32 = 48_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Cpu,
    Metal,
    Both,
}

struct Args {
    mode: Mode,
    frames: usize,
    presets: usize,
    w: usize,
    h: usize,
    ci_smoke: bool,
    max_ms: f64,
}

fn parse_args() -> Args {
    let mut args = Args {
        mode: Mode::Cpu,
        frames: 120,
        presets: usize::MAX,
        w: 160,
        h: 88,
        ci_smoke: false,
        max_ms: 40.0,
    };

    let argv = std::env::args().skip(1).collect::<Vec<_>>();
    let mut i = 0usize;
    while i < argv.len() {
        let k = argv[i].as_str();
        let v = argv.get(i + 1).map(|s| s.as_str());
        match (k, v) {
            ("--mode", Some("cpu")) => {
                args.mode = Mode::Cpu;
                i += 2;
            }
            ("--mode", Some("metal")) => {
                args.mode = Mode::Metal;
                i += 2;
            }
            ("--mode", Some("both")) => {
                args.mode = Mode::Both;
                i += 2;
            }
            ("--frames", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.frames = n.max(1);
                }
                i += 2;
            }
            ("--presets", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.presets = n.max(1);
                }
                i += 2;
            }
            ("--size", Some(x)) => {
                if let Some((w, h)) = x.split_once('x') {
                    if let (Ok(w), Ok(h)) = (w.parse::<usize>(), h.parse::<usize>()) {
                        args.w = w.max(1);
                        args.h = h.max(1);
                    }
                }
                i += 2;
            }
            ("--ci-smoke", _) => {
                args.ci_smoke = true;
                i += 1;
            }
            ("--max-ms", Some(x)) => {
                if let Ok(v) = x.parse::<f64>() {
                    args.max_ms = v.max(0.1);
                }
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }
    args
}

/// One video frame's worth of a beating two-tone signal.
fn synth_audio(ring: &SampleRing, frame: usize) {
    let per_frame = (SAMPLE_RATE_HZ / 60) as usize;
    let base = frame * per_frame;
    let hit = frame % 24 < 3;
    ring.extend((0..per_frame).map(|n| {
        let t = (base + n) as f32 / SAMPLE_RATE_HZ as f32;
        let kick = if hit { (t * 2.0 * std::f32::consts::PI * 60.0).sin() * 0.8 } else { 0.0 };
        let tone = (t * 2.0 * std::f32::consts::PI * 880.0).sin() * 0.2;
        [kick + tone, kick - tone]
    }));
}

fn bench_engine(args: &Args, engine: EngineMode) -> Result<()> {
    let catalog = PresetCatalog::builtin()?;
    let count = catalog.len().min(args.presets);
    let names = catalog.names().take(count).map(str::to_string).collect::<Vec<_>>();
    let ring = Arc::new(SampleRing::new(8192));
    let config = VisualizerConfig {
        width: args.w,
        height: args.h,
        engine,
        auto_switch: false,
        ..VisualizerConfig::default()
    };
    let mut vis = Visualizer::new(&config, catalog, Arc::clone(&ring), true)?;

    println!(
        "{} benchmark: presets={} frames/preset={} size={}x{}",
        vis.backend_name(),
        count,
        args.frames,
        args.w,
        args.h
    );

    let mut total_time = Duration::ZERO;
    let mut total_frames = 0usize;
    let mut black = Vec::new();
    let mut slow = Vec::new();
    let clock = Instant::now();

    for (idx, name) in names.iter().enumerate() {
        vis.load_named(name)?;
        ring.clear();
        let start = Instant::now();
        let mut lit = 0usize;
        for f in 0..args.frames {
            synth_audio(&ring, f);
            let at = clock + Duration::from_secs_f64((total_frames + f) as f64 / 60.0);
            let px = vis.render_frame_at(at);
            if px.chunks_exact(4).any(|p| p[0] != 0 || p[1] != 0 || p[2] != 0) {
                lit += 1;
            }
        }
        let elapsed = start.elapsed();
        total_time += elapsed;
        total_frames += args.frames;
        let ms = elapsed.as_secs_f64() * 1000.0 / args.frames as f64;
        println!("{:>2}. {:<34} {:>8.3} ms/frame  lit={:>3}/{}", idx, name, ms, lit, args.frames);
        if lit == 0 {
            black.push(name.clone());
        }
        if ms > args.max_ms {
            slow.push((name.clone(), ms));
        }
    }

    let avg_ms = total_time.as_secs_f64() * 1000.0 / total_frames.max(1) as f64;
    let fps = if avg_ms > 0.0 { 1000.0 / avg_ms } else { 0.0 };
    println!("summary: {:>8.3} ms/frame avg  {:>7.2} FPS", avg_ms, fps);

    if args.ci_smoke {
        if !black.is_empty() || !slow.is_empty() {
            eprintln!("CI smoke: FAIL");
            if !black.is_empty() {
                eprintln!("  black presets: {}", black.join(", "));
            }
            for (name, ms) in slow {
                eprintln!("  slow preset: {} ({:.3} ms/frame > {:.3})", name, ms, args.max_ms);
            }
            anyhow::bail!("ci smoke failed");
        }
        println!("CI smoke: PASS (max_ms={:.3})", args.max_ms);
    }
    Ok(())
}

/// Raw VM throughput on a per-pixel-sized workload.
fn bench_equations() -> Result<()> {
    const SRC: &str = "zoom = 1 + 0.05*sin(rad*8 + time); rot = 0.1*cos(ang*3 - time*0.5); \
                       dx = 0.01*sin(x*6.28); dy = 0.01*cos(y*6.28);";
    const RUNS: usize = 49 * 37 * 60;

    let mut slots = SlotTable::new();
    let program = compile(SRC, &mut slots)?;
    let (rad, ang, x, y, time) = (
        slots.reserve("rad"),
        slots.reserve("ang"),
        slots.reserve("x"),
        slots.reserve("y"),
        slots.reserve("time"),
    );
    let mut vars = vec![0.0f64; slots.len()];
    let mut megabuf = MegaBuf::new();
    let mut gmegabuf = MegaBuf::new();
    let mut vm = Vm::new();

    let start = Instant::now();
    for i in 0..RUNS {
        let f = i as f64;
        vars[rad as usize] = (f * 0.001).fract();
        vars[ang as usize] = f * 0.01;
        vars[x as usize] = (f * 0.02).fract();
        vars[y as usize] = (f * 0.03).fract();
        vars[time as usize] = f / 1000.0;
        let mut env = ExecEnv {
            vars: &mut vars,
            megabuf: &mut megabuf,
            gmegabuf: &mut gmegabuf,
        };
        vm.run(&program, &mut env)?;
    }
    let elapsed = start.elapsed();
    println!(
        "equations: {} runs in {:.1} ms ({:.1} ns/run, {} ops)",
        RUNS,
        elapsed.as_secs_f64() * 1000.0,
        elapsed.as_secs_f64() * 1e9 / RUNS as f64,
        program.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args();
    bench_equations()?;
    match args.mode {
        Mode::Cpu => bench_engine(&args, EngineMode::Cpu),
        Mode::Metal => bench_engine(&args, EngineMode::Metal),
        Mode::Both => {
            bench_engine(&args, EngineMode::Cpu)?;
            bench_engine(&args, EngineMode::Metal)
        }
    }
}
