use crate::error::PipelineError;

pub type Rgba = [f32; 4];

const SAMPLE_LIMIT: f32 = 1.0e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blend {
    Alpha,
    Additive,
}

/// An RGBA8 render target. Drawing coordinates are normalized (0..1, y up).
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    w: usize,
    h: usize,
    px: Vec<u8>,
}

impl Canvas {
    pub fn new(w: usize, h: usize) -> Result<Self, PipelineError> {
        if w == 0 || h == 0 {
            return Err(PipelineError::ZeroSize { w, h });
        }
        let bytes = w
            .checked_mul(h)
            .and_then(|n| n.checked_mul(4))
            .ok_or(PipelineError::Alloc { w, h, bytes: usize::MAX })?;
        let mut px = Vec::new();
        px.try_reserve_exact(bytes)
            .map_err(|_| PipelineError::Alloc { w, h, bytes })?;
        px.resize(bytes, 0);
        Ok(Self { w, h, px })
    }

    pub fn width(&self) -> usize {
        self.w
    }

    pub fn height(&self) -> usize {
        self.h
    }

    pub fn pixels(&self) -> &[u8] {
        &self.px
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.px
    }

    pub fn clear(&mut self) {
        self.px.fill(0);
        for a in self.px.iter_mut().skip(3).step_by(4) {
            *a = 255;
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Rgba {
        let i = (y * self.w + x) * 4;
        [
            self.px[i] as f32 / 255.0,
            self.px[i + 1] as f32 / 255.0,
            self.px[i + 2] as f32 / 255.0,
            self.px[i + 3] as f32 / 255.0,
        ]
    }

    /// Bilinear sample at texture coordinates (0..1, v down).
    pub fn sample(&self, u: f32, v: f32, wrap: bool) -> Rgba {
        // Keeps the texel arithmetic below in i64 range for runaway UVs.
        let fx = (u * self.w as f32 - 0.5).clamp(-SAMPLE_LIMIT, SAMPLE_LIMIT);
        let fy = (v * self.h as f32 - 0.5).clamp(-SAMPLE_LIMIT, SAMPLE_LIMIT);
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let idx = |x: i64, y: i64| -> usize {
            let (w, h) = (self.w as i64, self.h as i64);
            let (x, y) = if wrap {
                (x.rem_euclid(w), y.rem_euclid(h))
            } else {
                (x.clamp(0, w - 1), y.clamp(0, h - 1))
            };
            ((y * w + x) * 4) as usize
        };
        let (a, b, c, d) = (idx(x0, y0), idx(x0 + 1, y0), idx(x0, y0 + 1), idx(x0 + 1, y0 + 1));

        let mut out = [0.0f32; 4];
        for (k, o) in out.iter_mut().enumerate() {
            let top = self.px[a + k] as f32 * (1.0 - tx) + self.px[b + k] as f32 * tx;
            let bot = self.px[c + k] as f32 * (1.0 - tx) + self.px[d + k] as f32 * tx;
            *o = (top * (1.0 - ty) + bot * ty) / 255.0;
        }
        out
    }

    pub fn blend_px(&mut self, x: i64, y: i64, c: Rgba, mode: Blend) {
        if x < 0 || y < 0 || x >= self.w as i64 || y >= self.h as i64 {
            return;
        }
        let i = (y as usize * self.w + x as usize) * 4;
        let a = c[3].clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        for k in 0..3 {
            let dst = self.px[i + k] as f32 / 255.0;
            let src = c[k].clamp(0.0, 1.0);
            let v = match mode {
                Blend::Alpha => dst * (1.0 - a) + src * a,
                Blend::Additive => dst + src * a,
            };
            self.px[i + k] = to_byte(v);
        }
    }

    pub fn to_px(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.w as f32, (1.0 - y) * self.h as f32)
    }

    pub fn plot(&mut self, x: f32, y: f32, c: Rgba, mode: Blend, thick: bool) {
        let (px, py) = self.to_px(x, y);
        let (px, py) = (px.floor() as i64, py.floor() as i64);
        self.blend_px(px, py, c, mode);
        if thick {
            let (qx, qy) = (px.saturating_add(1), py.saturating_add(1));
            self.blend_px(qx, py, c, mode);
            self.blend_px(px, qy, c, mode);
            self.blend_px(qx, qy, c, mode);
        }
    }

    /// Line between two normalized points; `thick` repeats it at four pixel offsets.
    pub fn line(&mut self, a: (f32, f32), b: (f32, f32), c: Rgba, mode: Blend, thick: bool) {
        self.line_shaded(a, b, c, c, mode, thick);
    }

    pub fn line_shaded(
        &mut self,
        a: (f32, f32),
        b: (f32, f32),
        ca: Rgba,
        cb: Rgba,
        mode: Blend,
        thick: bool,
    ) {
        let (x0, y0) = self.to_px(a.0, a.1);
        let (x1, y1) = self.to_px(b.0, b.1);
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return;
        }
        let offsets: &[(i64, i64)] = if thick {
            &[(0, 0), (1, 0), (0, 1), (1, 1)]
        } else {
            &[(0, 0)]
        };
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().clamp(1.0, 8192.0) as usize;
        // Skip the final pixel so joined segments do not double-blend their shared point.
        for s in 0..steps {
            let t = s as f32 / steps as f32;
            let x = (x0 + (x1 - x0) * t).floor() as i64;
            let y = (y0 + (y1 - y0) * t).floor() as i64;
            let c = lerp4(ca, cb, t);
            for (ox, oy) in offsets {
                self.blend_px(x.saturating_add(*ox), y.saturating_add(*oy), c, mode);
            }
        }
    }

    /// Gouraud-shaded triangle. With `tex`, vertex colors modulate samples of
    /// the given texture at the per-vertex UVs.
    pub fn triangle(&mut self, v: [TriVertex; 3], mode: Blend, tex: Option<&Canvas>) {
        let p = v.map(|vx| self.to_px(vx.x, vx.y));
        if p.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return;
        }
        let area = edge(p[0], p[1], p[2]);
        if area.abs() < 1e-6 {
            return;
        }
        let min_x = p.iter().map(|q| q.0).fold(f32::INFINITY, f32::min).floor().max(0.0) as i64;
        let max_x = p.iter().map(|q| q.0).fold(f32::NEG_INFINITY, f32::max).ceil().min(self.w as f32) as i64;
        let min_y = p.iter().map(|q| q.1).fold(f32::INFINITY, f32::min).floor().max(0.0) as i64;
        let max_y = p.iter().map(|q| q.1).fold(f32::NEG_INFINITY, f32::max).ceil().min(self.h as f32) as i64;

        for y in min_y..max_y {
            for x in min_x..max_x {
                let c = (x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(p[1], p[2], c) / area;
                let w1 = edge(p[2], p[0], c) / area;
                let w2 = edge(p[0], p[1], c) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let mut col = [0.0f32; 4];
                for (k, o) in col.iter_mut().enumerate() {
                    *o = v[0].c[k] * w0 + v[1].c[k] * w1 + v[2].c[k] * w2;
                }
                if let Some(t) = tex {
                    let u = v[0].u * w0 + v[1].u * w1 + v[2].u * w2;
                    let vv = v[0].v * w0 + v[1].v * w1 + v[2].v * w2;
                    let s = t.sample(u, vv, true);
                    for k in 0..3 {
                        col[k] *= s[k];
                    }
                }
                self.blend_px(x, y, col, mode);
            }
        }
    }

    pub fn fill_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, c: Rgba, mode: Blend) {
        let (ax, ay) = self.to_px(x0.min(x1), y0.max(y1));
        let (bx, by) = self.to_px(x0.max(x1), y0.min(y1));
        let (ax, ay) = (ax.round().max(0.0) as i64, ay.round().max(0.0) as i64);
        let (bx, by) = (
            bx.round().min(self.w as f32) as i64,
            by.round().min(self.h as f32) as i64,
        );
        for y in ay..by {
            for x in ax..bx {
                self.blend_px(x, y, c, mode);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TriVertex {
    pub x: f32,
    pub y: f32,
    pub c: Rgba,
    pub u: f32,
    pub v: f32,
}

fn edge(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> f32 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

pub fn lerp4(a: Rgba, b: Rgba, t: f32) -> Rgba {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

pub fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
