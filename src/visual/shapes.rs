use std::f32::consts::PI;

use crate::runtime::ShapeInstance;

use super::canvas::{Blend, Canvas, TriVertex};

/// Draws each enabled shape instance as a filled N-gon with an optional outline.
/// Textured shapes sample `prev`, the last completed frame.
pub fn draw_shapes(canvas: &mut Canvas, shapes: &[ShapeInstance], prev: &Canvas, aspect: (f32, f32)) {
    let mut rim = Vec::with_capacity(101);
    for shape in shapes {
        if shape.enabled == 0.0 {
            continue;
        }
        shape_rim(shape, aspect, &mut rim);
        fill(canvas, shape, &rim, prev);
        outline(canvas, shape, &rim);
    }
}

/// Rim vertices in normalized coordinates plus their texture coordinates.
pub fn shape_rim(shape: &ShapeInstance, aspect: (f32, f32), out: &mut Vec<TriVertex>) {
    let (ax, ay) = aspect;
    let sides = shape.side_count();
    let tex_zoom = if shape.tex_zoom.abs() > 1e-4 { shape.tex_zoom } else { 1.0 };
    out.clear();
    for k in 0..sides {
        let ang = k as f32 / sides as f32 * 2.0 * PI + shape.ang + PI * 0.25;
        let tang = ang + shape.tex_ang;
        out.push(TriVertex {
            x: shape.x + shape.rad * ang.cos() * ay,
            y: shape.y + shape.rad * ang.sin() * ax,
            c: [shape.r2, shape.g2, shape.b2, shape.a2],
            u: 0.5 + 0.5 * tang.cos() / tex_zoom * ay,
            v: 0.5 - 0.5 * tang.sin() / tex_zoom * ax,
        });
    }
}

fn fill(canvas: &mut Canvas, shape: &ShapeInstance, rim: &[TriVertex], prev: &Canvas) {
    if shape.a <= 0.0 && shape.a2 <= 0.0 {
        return;
    }
    let mode = if shape.additive != 0.0 { Blend::Additive } else { Blend::Alpha };
    let tex = (shape.textured != 0.0).then_some(prev);
    let center = TriVertex {
        x: shape.x,
        y: shape.y,
        c: [shape.r, shape.g, shape.b, shape.a],
        u: 0.5,
        v: 0.5,
    };
    for k in 0..rim.len() {
        let next = rim[(k + 1) % rim.len()];
        canvas.triangle([center, rim[k], next], mode, tex);
    }
}

fn outline(canvas: &mut Canvas, shape: &ShapeInstance, rim: &[TriVertex]) {
    if shape.border_a <= 0.0 {
        return;
    }
    let c = [shape.border_r, shape.border_g, shape.border_b, shape.border_a];
    let thick = shape.thick_outline != 0.0;
    for k in 0..rim.len() {
        let (a, b) = (rim[k], rim[(k + 1) % rim.len()]);
        canvas.line((a.x, a.y), (b.x, b.y), c, Blend::Alpha, thick);
    }
}
