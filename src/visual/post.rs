use crate::runtime::PresetFrame;

use super::canvas::{Blend, Canvas, TriVertex, to_byte};
use super::mesh::WarpMesh;

/// Uniforms of the final full-screen pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeParams {
    pub gamma: f32,
    pub echo_zoom: f32,
    pub echo_alpha: f32,
    pub echo_orient: u32,
    pub hue_amount: f32,
    pub brighten: u32,
    pub darken: u32,
    pub solarize: u32,
    pub invert: u32,
    pub _pad: [u32; 3],
    /// Corner tints: top-left, top-right, bottom-left, bottom-right.
    pub shade: [[f32; 4]; 4],
}

impl CompositeParams {
    pub fn from_frame(frame: &PresetFrame, time: f64, rand_start: [f64; 4]) -> Self {
        let flag = |v: f32| u32::from(v != 0.0);
        Self {
            gamma: frame.gamma_adj,
            echo_zoom: if frame.echo_zoom.abs() > 1e-4 { frame.echo_zoom } else { 1.0 },
            echo_alpha: frame.echo_alpha.clamp(0.0, 1.0),
            echo_orient: (frame.echo_orient.max(0.0) as u32) % 4,
            hue_amount: frame.hue_shader.clamp(0.0, 1.0),
            brighten: flag(frame.brighten),
            darken: flag(frame.darken),
            solarize: flag(frame.solarize),
            invert: flag(frame.invert),
            _pad: [0; 3],
            shade: hue_shade(time, rand_start),
        }
    }

    fn tint(&self, u: f32, v: f32) -> [f32; 3] {
        let s = &self.shade;
        let mut out = [0.0; 3];
        for (k, o) in out.iter_mut().enumerate() {
            let top = s[0][k] + (s[1][k] - s[0][k]) * u;
            let bot = s[2][k] + (s[3][k] - s[2][k]) * u;
            let t = top + (bot - top) * v;
            *o = 1.0 + (t - 1.0) * self.hue_amount;
        }
        out
    }
}

/// Slowly cycling per-corner tint colors, each normalized so its brightest
/// channel is 1 and mapped into 0.5..1.
pub fn hue_shade(time: f64, rand_start: [f64; 4]) -> [[f32; 4]; 4] {
    let t = time * 30.0;
    let mut shade = [[0.0f32; 4]; 4];
    for (i, corner) in shade.iter_mut().enumerate() {
        let i = i as f64;
        let rgb = [
            0.6 + 0.3 * (t * 0.0143 + 3.0 + i * 21.0 + rand_start[3]).sin(),
            0.6 + 0.3 * (t * 0.0107 + 1.0 + i * 13.0 + rand_start[1]).sin(),
            0.6 + 0.3 * (t * 0.0129 + 6.0 + i * 9.0 + rand_start[2]).sin(),
        ];
        let max = rgb[0].max(rgb[1]).max(rgb[2]);
        for k in 0..3 {
            corner[k] = (0.5 + 0.5 * rgb[k] / max) as f32;
        }
        corner[3] = 1.0;
    }
    shade
}

/// Software composite pass writing RGBA8 into `out`.
pub fn composite_cpu(params: &CompositeParams, src: &Canvas, out: &mut [u8]) {
    let (w, h) = (src.width(), src.height());
    for y in 0..h {
        let v = (y as f32 + 0.5) / h as f32;
        for x in 0..w {
            let u = (x as f32 + 0.5) / w as f32;
            let mut c = src.get(x, y);
            if params.echo_alpha > 0.0 {
                let e = echo_sample(params, src, u, v);
                for k in 0..3 {
                    c[k] = c[k] * (1.0 - params.echo_alpha) + e[k] * params.echo_alpha;
                }
            }
            let tint = params.tint(u, v);
            let i = (y * w + x) * 4;
            for k in 0..3 {
                let mut p = (c[k] * params.gamma * tint[k]).clamp(0.0, 1.0);
                if params.brighten != 0 {
                    p = p.sqrt();
                }
                if params.darken != 0 {
                    p *= p;
                }
                if params.solarize != 0 {
                    p = p * (1.0 - p) * 4.0;
                }
                if params.invert != 0 {
                    p = 1.0 - p;
                }
                out[i + k] = to_byte(p);
            }
            out[i + 3] = 255;
        }
    }
}

fn echo_sample(params: &CompositeParams, src: &Canvas, u: f32, v: f32) -> [f32; 4] {
    let mut eu = (u - 0.5) / params.echo_zoom;
    let mut ev = (v - 0.5) / params.echo_zoom;
    if params.echo_orient & 1 != 0 {
        eu = -eu;
    }
    if params.echo_orient & 2 != 0 {
        ev = -ev;
    }
    src.sample(eu + 0.5, ev + 0.5, true)
}

/// Short segments from a grid of points toward where their pixels were pulled from.
pub fn draw_motion_vectors(canvas: &mut Canvas, mesh: &WarpMesh, frame: &PresetFrame) {
    if frame.motion_vectors_on == 0.0 || frame.mv_a <= 0.0 {
        return;
    }
    let nx = frame.mv_x.clamp(0.0, 64.0) as usize;
    let ny = frame.mv_y.clamp(0.0, 48.0) as usize;
    if nx == 0 || ny == 0 {
        return;
    }
    let c = [frame.mv_r, frame.mv_g, frame.mv_b, frame.mv_a];
    let min_len = 1.0 / canvas.width().max(canvas.height()) as f32;
    for j in 0..ny {
        let sy = (j as f32 + 0.25) / ny as f32 + frame.mv_dy;
        if !(0.0001..=0.9999).contains(&sy) {
            continue;
        }
        for i in 0..nx {
            let sx = (i as f32 + 0.25) / nx as f32 + frame.mv_dx;
            if !(0.0001..=0.9999).contains(&sx) {
                continue;
            }
            let [u, v] = mesh.uv_at(sx, sy);
            let (dx, dy) = ((u - sx) * frame.mv_l, (v - sy) * frame.mv_l);
            if dx.abs() < min_len && dy.abs() < min_len {
                continue;
            }
            let a = (sx, 1.0 - sy);
            let b = (sx + dx, 1.0 - (sy + dy));
            canvas.line(a, b, c, Blend::Alpha, false);
        }
    }
}

/// Faint dark spot over the center of the screen.
pub fn darken_center(canvas: &mut Canvas, aspect: (f32, f32)) {
    let (ax, ay) = aspect;
    let half = 0.05;
    let center = TriVertex {
        x: 0.5,
        y: 0.5,
        c: [0.0, 0.0, 0.0, 3.0 / 32.0],
        ..TriVertex::default()
    };
    let rim = |x: f32, y: f32| TriVertex {
        x: 0.5 + x * half * ay,
        y: 0.5 + y * half * ax,
        c: [0.0; 4],
        ..TriVertex::default()
    };
    let pts = [rim(-1.0, 0.0), rim(0.0, -1.0), rim(1.0, 0.0), rim(0.0, 1.0)];
    for k in 0..4 {
        canvas.triangle([center, pts[k], pts[(k + 1) % 4]], Blend::Alpha, None);
    }
}

/// Outer then inner border bands, each `size` of the half-screen wide.
pub fn draw_borders(canvas: &mut Canvas, frame: &PresetFrame) {
    let outer = frame.ob_size.clamp(0.0, 0.5) * 0.5;
    let inner = frame.ib_size.clamp(0.0, 0.5) * 0.5;
    let bands = [
        (0.0, outer, [frame.ob_r, frame.ob_g, frame.ob_b, frame.ob_a]),
        (outer, outer + inner, [frame.ib_r, frame.ib_g, frame.ib_b, frame.ib_a]),
    ];
    for (from, to, c) in bands {
        if c[3] <= 0.0 || to <= from {
            continue;
        }
        let (lo, hi) = (from, 1.0 - from);
        let (ilo, ihi) = (to, 1.0 - to);
        canvas.fill_rect(lo, hi, hi, ihi, c, Blend::Alpha);
        canvas.fill_rect(lo, ilo, hi, lo, c, Blend::Alpha);
        canvas.fill_rect(lo, ihi, ilo, ilo, c, Blend::Alpha);
        canvas.fill_rect(ihi, ihi, hi, ilo, c, Blend::Alpha);
    }
}
