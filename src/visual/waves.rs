use std::f32::consts::PI;

use crate::audio::{AudioLevels, WaveData};
use crate::runtime::{PresetFrame, WavePoint, WaveRender};

use super::canvas::{Blend, Canvas, Rgba};

const SMOOTH_TAPS: [f32; 4] = [-0.15, 1.15, 1.15, -0.15];

/// 5-tap smoothing that inserts an interpolated point between every pair,
/// turning `n` points into `2n - 1`.
pub fn smooth_points(input: &[WavePoint], out: &mut Vec<WavePoint>) {
    out.clear();
    let n = input.len();
    if n < 3 {
        out.extend_from_slice(input);
        return;
    }
    let inv = 1.0 / SMOOTH_TAPS.iter().sum::<f32>();
    let [c1, c2, c3, c4] = SMOOTH_TAPS;
    let mut below = 0;
    for i in 0..n - 1 {
        let above = i + 1;
        let above2 = (i + 2).min(n - 1);
        let (a, b, c, d) = (&input[below], &input[i], &input[above], &input[above2]);
        let mix = |f: fn(&WavePoint) -> f32| (c1 * f(a) + c2 * f(b) + c3 * f(c) + c4 * f(d)) * inv;
        out.push(*b);
        out.push(WavePoint {
            x: mix(|p| p.x),
            y: mix(|p| p.y),
            r: mix(|p| p.r),
            g: mix(|p| p.g),
            b: mix(|p| p.b),
            a: mix(|p| p.a),
        });
        below = i;
    }
    out.push(input[n - 1]);
}

fn color(p: &WavePoint) -> Rgba {
    [p.r, p.g, p.b, p.a]
}

/// Draws the per-preset custom waves produced by the runtime.
pub fn draw_custom_waves(canvas: &mut Canvas, waves: &[WaveRender], scratch: &mut Vec<WavePoint>) {
    for wave in waves {
        let wf = &wave.frame;
        if wf.enabled == 0.0 || wave.points.is_empty() {
            continue;
        }
        let mode = if wf.additive != 0.0 { Blend::Additive } else { Blend::Alpha };
        let thick = wf.draw_thick != 0.0;
        if wf.use_dots != 0.0 {
            for p in &wave.points {
                canvas.plot(p.x, p.y, color(p), mode, thick);
            }
            continue;
        }
        smooth_points(&wave.points, scratch);
        for pair in scratch.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            canvas.line_shaded((a.x, a.y), (b.x, b.y), color(a), color(b), mode, thick);
        }
    }
}

/// Alpha of the built-in wave after volume modulation.
pub fn basic_wave_alpha(frame: &PresetFrame, levels: &AudioLevels) -> f32 {
    let mut alpha = frame.wave_a;
    if frame.mod_wave_alpha_by_volume != 0.0 {
        let span = frame.mod_wave_alpha_end - frame.mod_wave_alpha_start;
        let vol = (levels.bass + levels.mid + levels.treb) / 3.0;
        let t = if span.abs() > 1e-6 {
            (vol - frame.mod_wave_alpha_start) / span
        } else if vol >= frame.mod_wave_alpha_start {
            1.0
        } else {
            0.0
        };
        alpha *= t.clamp(0.0, 1.0);
    }
    alpha.clamp(0.0, 1.0)
}

fn basic_wave_color(frame: &PresetFrame, alpha: f32) -> Rgba {
    let mut c = [
        frame.wave_r.clamp(0.0, 1.0),
        frame.wave_g.clamp(0.0, 1.0),
        frame.wave_b.clamp(0.0, 1.0),
    ];
    if frame.wave_brighten != 0.0 {
        let max = c[0].max(c[1]).max(c[2]);
        if max > 0.01 {
            for v in &mut c {
                *v /= max;
            }
        }
    }
    [c[0], c[1], c[2], alpha]
}

/// Built-in waveform, one of eight `wave_mode` geometries.
#[derive(Debug, Default)]
pub struct BasicWave {
    left: Vec<f32>,
    right: Vec<f32>,
    points: Vec<(f32, f32)>,
}

impl BasicWave {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(
        &mut self,
        canvas: &mut Canvas,
        frame: &PresetFrame,
        levels: &AudioLevels,
        data: &WaveData,
        time: f32,
        aspect: (f32, f32),
    ) {
        let mode = frame.wave_mode_index();
        let mut alpha = basic_wave_alpha(frame, levels);
        self.load_samples(frame, data);

        let (ax, ay) = aspect;
        let ox = frame.wave_x * 2.0 - 1.0;
        let oy = frame.wave_y * 2.0 - 1.0;
        let mystery = frame.wave_mystery;
        let (l, r) = (&self.left, &self.right);
        let n = l.len().min(r.len());
        let pts = &mut self.points;
        pts.clear();
        let mut closed = false;
        let mut dots = frame.wave_dots != 0.0;
        if n < 64 {
            return;
        }

        match mode {
            0 => {
                let count = n / 2;
                for i in 0..count {
                    let rad = 0.5 + 0.4 * r[i] + mystery;
                    let ang = i as f32 / count as f32 * 2.0 * PI + time * 0.2;
                    pts.push((rad * ang.cos() * ay + ox, rad * ang.sin() * ax + oy));
                }
                closed = true;
            }
            1 => {
                alpha *= 1.25;
                let count = n - 32;
                for i in 0..count {
                    let rad = 0.53 + 0.43 * r[i] + mystery;
                    let ang = l[i + 32] * 0.5 * PI + time * 2.3;
                    pts.push((rad * ang.cos() * ay + ox, rad * ang.sin() * ax + oy));
                }
            }
            2 | 3 => {
                // Scatter scales with resolution; mode 3 also rides the treble.
                let px = canvas.width().max(canvas.height()) as f32;
                alpha *= (px / 640.0).clamp(0.5, 2.0);
                if mode == 3 {
                    alpha *= (levels.treb * levels.treb * 1.3).clamp(0.0, 2.0);
                }
                dots = true;
                for i in 0..n - 32 {
                    pts.push((r[i] * ay + ox, l[i + 32] * ax + oy));
                }
            }
            4 => {
                let count = (n / 2).min(canvas.width().max(16));
                let mut y_prev = l[0];
                for i in 0..count {
                    let d = l[i + 1] - l[i];
                    let y = y_prev * 0.5 + (l[i] * 0.47 + d * 0.9) * 0.5;
                    y_prev = y;
                    let x = -1.0 + 2.0 * i as f32 / count as f32 + mystery * 0.25;
                    pts.push((x, y + oy));
                }
            }
            5 => {
                let (s, c) = (time * 0.3).sin_cos();
                for i in 0..n - 32 {
                    let x0 = r[i] * l[i + 32] + l[i] * r[i + 32];
                    let y0 = r[i] * r[i] - l[i + 32] * l[i + 32];
                    pts.push(((x0 * c - y0 * s) * ay + ox, (x0 * s + y0 * c) * ax + oy));
                }
            }
            6 => {
                let ang = 1.57 * mystery;
                let (s, c) = ang.sin_cos();
                let count = n / 2;
                for i in 0..count {
                    let t = i as f32 / count as f32 * 2.0 - 1.0;
                    let along = (t * c * 1.5, t * s * 1.5);
                    let off = l[i] * 0.25;
                    pts.push((along.0 - off * s + ox, along.1 + off * c + oy));
                }
            }
            _ => {
                // Two stacked lines, left above right.
                let sep = (mystery * 0.5 + 0.5).clamp(0.0, 1.0) * 0.5;
                let count = n / 2;
                let color = basic_wave_color(frame, alpha);
                let blend = blend_of(frame);
                let thick = frame.wave_thick != 0.0;
                for (src, dy) in [(l, sep), (r, -sep)] {
                    let mut last = None;
                    for i in 0..count {
                        let x = -1.0 + 2.0 * i as f32 / count as f32;
                        let p = to_norm((x, src[i] * 0.25 + oy + dy));
                        if let Some(q) = last {
                            canvas.line(q, p, color, blend, thick);
                        }
                        last = Some(p);
                    }
                }
                return;
            }
        }

        let color = basic_wave_color(frame, alpha.clamp(0.0, 1.0));
        let blend = blend_of(frame);
        let thick = frame.wave_thick != 0.0;
        if dots {
            for &p in pts.iter() {
                let (x, y) = to_norm(p);
                canvas.plot(x, y, color, blend, thick);
            }
            return;
        }
        for pair in pts.windows(2) {
            canvas.line(to_norm(pair[0]), to_norm(pair[1]), color, blend, thick);
        }
        if closed && pts.len() > 2 {
            canvas.line(to_norm(pts[pts.len() - 1]), to_norm(pts[0]), color, blend, thick);
        }
    }

    fn load_samples(&mut self, frame: &PresetFrame, data: &WaveData) {
        let scale = frame.wave_scale;
        let mix = (frame.wave_smoothing * 0.98).clamp(0.0, 0.98);
        for (dst, src) in [(&mut self.left, &data.time_left), (&mut self.right, &data.time_right)] {
            dst.clear();
            dst.extend(src.iter().map(|v| v * scale));
            for i in 1..dst.len() {
                dst[i] = dst[i] * (1.0 - mix) + dst[i - 1] * mix;
            }
        }
    }
}

fn blend_of(frame: &PresetFrame) -> Blend {
    if frame.additive_wave != 0.0 {
        Blend::Additive
    } else {
        Blend::Alpha
    }
}

// Clip space (-1..1, y up) to normalized canvas coordinates.
fn to_norm(p: (f32, f32)) -> (f32, f32) {
    (p.0 * 0.5 + 0.5, p.1 * 0.5 + 0.5)
}
