use crate::runtime::{PixelInput, PresetFrame, WarpVertex};

use super::canvas::Canvas;

/// Coarse warp grid: `cols × rows` cells, `(cols + 1) × (rows + 1)` vertices,
/// stored row-major from the top-left corner.
#[derive(Debug, Clone)]
pub struct WarpMesh {
    cols: usize,
    rows: usize,
    aspect: (f32, f32),
    clip: Vec<(f32, f32)>,
    inputs: Vec<PixelInput>,
    verts: Vec<WarpVertex>,
    uv: Vec<[f32; 2]>,
}

impl WarpMesh {
    pub fn new(cols: usize, rows: usize, aspect: (f64, f64)) -> Self {
        let mut mesh = Self {
            cols: cols.max(1),
            rows: rows.max(1),
            aspect: (aspect.0 as f32, aspect.1 as f32),
            clip: Vec::new(),
            inputs: Vec::new(),
            verts: Vec::new(),
            uv: Vec::new(),
        };
        mesh.build_inputs();
        mesh
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn vertex_count(&self) -> usize {
        (self.cols + 1) * (self.rows + 1)
    }

    pub fn set_aspect(&mut self, aspect: (f64, f64)) {
        let aspect = (aspect.0 as f32, aspect.1 as f32);
        if aspect != self.aspect {
            self.aspect = aspect;
            self.build_inputs();
        }
    }

    /// Per-vertex inputs handed to the pixel expression.
    pub fn inputs(&self) -> &[PixelInput] {
        &self.inputs
    }

    pub fn vertices(&self) -> &[WarpVertex] {
        &self.verts
    }

    pub fn vertices_mut(&mut self) -> &mut Vec<WarpVertex> {
        &mut self.verts
    }

    /// Inputs alongside the writable per-vertex values, for the pixel pass.
    pub fn split_mut(&mut self) -> (&[PixelInput], &mut Vec<WarpVertex>) {
        (&self.inputs, &mut self.verts)
    }

    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uv
    }

    fn build_inputs(&mut self) {
        let (ax, ay) = self.aspect;
        let n = self.vertex_count();
        self.clip.clear();
        self.inputs.clear();
        self.clip.reserve(n);
        self.inputs.reserve(n);
        for j in 0..=self.rows {
            for i in 0..=self.cols {
                let x = i as f32 / self.cols as f32 * 2.0 - 1.0;
                let y = 1.0 - j as f32 / self.rows as f32 * 2.0;
                let rad = ((x * ax).powi(2) + (y * ay).powi(2)).sqrt();
                let center = 2 * i == self.cols && 2 * j == self.rows;
                let ang = if center { 0.0 } else { (y * ay).atan2(x * ax) };
                self.clip.push((x, y));
                self.inputs.push(PixelInput {
                    x: (x * 0.5 + 0.5) as f64,
                    y: (-y * 0.5 + 0.5) as f64,
                    rad: rad as f64,
                    ang: ang as f64,
                });
            }
        }
        let fallback = WarpVertex::from_frame(&PresetFrame::default());
        self.verts.resize(n, fallback);
        self.uv.resize(n, [0.0, 0.0]);
    }

    /// Recomputes every vertex UV from the current per-vertex warp values.
    pub fn update(&mut self, frame: &PresetFrame, time: f64) {
        let (ax, ay) = self.aspect;
        let t = (time * frame.warp_anim_speed as f64) as f32;
        let inv_scale = 1.0 / if frame.warp_scale != 0.0 { frame.warp_scale } else { 1.0 };
        let f0 = 11.68 + 4.0 * (t * 1.413 + 10.0).cos();
        let f1 = 8.77 + 3.0 * (t * 1.113 + 7.0).cos();
        let f2 = 10.54 + 3.0 * (t * 1.233 + 3.0).cos();
        let f3 = 11.49 + 4.0 * (t * 0.933 + 5.0).cos();

        for (k, uv) in self.uv.iter_mut().enumerate() {
            let (x, y) = self.clip[k];
            let rad = self.inputs[k].rad as f32;
            let p = &self.verts[k];

            let zoom2 = p.zoom.powf(p.zoom_exp.powf(rad * 2.0 - 1.0));
            let zoom2 = if zoom2.is_finite() && zoom2 != 0.0 { zoom2 } else { 1.0 };
            let mut u = x * ax * 0.5 / zoom2 + 0.5;
            let mut v = -y * ay * 0.5 / zoom2 + 0.5;

            u = (u - p.cx) / nonzero(p.sx) + p.cx;
            v = (v - p.cy) / nonzero(p.sy) + p.cy;

            let w = p.warp * 0.0035;
            u += w * (t * 0.333 + inv_scale * (x * f0 - y * f3)).sin();
            v += w * (t * 0.375 - inv_scale * (x * f2 + y * f1)).cos();
            u += w * (t * 0.753 - inv_scale * (x * f1 - y * f2)).cos();
            v += w * (t * 0.825 + inv_scale * (x * f0 + y * f3)).sin();

            let (du, dv) = (u - p.cx, v - p.cy);
            let (s, c) = p.rot.sin_cos();
            u = du * c - dv * s + p.cx;
            v = du * s + dv * c + p.cy;

            u -= p.dx;
            v -= p.dy;

            u = (u - 0.5) / ax + 0.5;
            v = (v - 0.5) / ay + 0.5;
            *uv = if u.is_finite() && v.is_finite() {
                [u, v]
            } else {
                [x * 0.5 + 0.5, -y * 0.5 + 0.5]
            };
        }
    }

    /// Source UV for a screen position (0..1, v down), interpolated across the cell.
    pub fn uv_at(&self, sx: f32, sy: f32) -> [f32; 2] {
        let gx = (sx * self.cols as f32).clamp(0.0, self.cols as f32);
        let gy = (sy * self.rows as f32).clamp(0.0, self.rows as f32);
        let i = (gx.floor() as usize).min(self.cols - 1);
        let j = (gy.floor() as usize).min(self.rows - 1);
        let (tx, ty) = (gx - i as f32, gy - j as f32);
        let stride = self.cols + 1;
        let a = self.uv[j * stride + i];
        let b = self.uv[j * stride + i + 1];
        let c = self.uv[(j + 1) * stride + i];
        let d = self.uv[(j + 1) * stride + i + 1];
        let mut out = [0.0; 2];
        for k in 0..2 {
            let top = a[k] + (b[k] - a[k]) * tx;
            let bot = c[k] + (d[k] - c[k]) * tx;
            out[k] = top + (bot - top) * ty;
        }
        out
    }
}

fn nonzero(v: f32) -> f32 {
    if v == 0.0 { 1.0 } else { v }
}

/// Software warp pass: samples `prev` through the mesh, scaled by `decay`.
pub fn warp_cpu(mesh: &WarpMesh, decay: f32, wrap: bool, prev: &Canvas, target: &mut Canvas) {
    let (w, h) = (target.width(), target.height());
    let decay = decay.clamp(0.0, 1.0);
    let px = target.pixels_mut();
    for y in 0..h {
        let sy = (y as f32 + 0.5) / h as f32;
        for x in 0..w {
            let sx = (x as f32 + 0.5) / w as f32;
            let [u, v] = mesh.uv_at(sx, sy);
            let c = prev.sample(u, v, wrap);
            let i = (y * w + x) * 4;
            for k in 0..3 {
                // Truncation lets faint trails reach black.
                px[i + k] = (c[k] * 255.0 * decay + 1e-3).floor().clamp(0.0, 255.0) as u8;
            }
            px[i + 3] = 255;
        }
    }
}
