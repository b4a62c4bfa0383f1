var_block! {
    /// One drawn instance of a custom shape.
    ShapeInstance, SHAPE_VARS {
        enabled: "enabled" = 0.0,
        sides: "sides" = 4.0,
        additive: "additive" = 0.0,
        thick_outline: "thickoutline" = 0.0,
        textured: "textured" = 0.0,
        num_inst: "num_inst" = 1.0,
        x: "x" = 0.5,
        y: "y" = 0.5,
        rad: "rad" = 0.1,
        ang: "ang" = 0.0,
        tex_ang: "tex_ang" = 0.0,
        tex_zoom: "tex_zoom" = 1.0,
        r: "r" = 1.0,
        g: "g" = 0.0,
        b: "b" = 0.0,
        a: "a" = 1.0,
        r2: "r2" = 0.0,
        g2: "g2" = 1.0,
        b2: "b2" = 0.0,
        a2: "a2" = 0.0,
        border_r: "border_r" = 1.0,
        border_g: "border_g" = 1.0,
        border_b: "border_b" = 1.0,
        border_a: "border_a" = 0.1,
    }
}

var_block! {
    /// Per-frame settings of a custom wave.
    WaveFrame, WAVE_VARS {
        enabled: "enabled" = 0.0,
        samples: "samples" = 512.0,
        sep: "sep" = 0.0,
        spectrum: "bspectrum" = 0.0,
        use_dots: "busedots" = 0.0,
        draw_thick: "bdrawthick" = 0.0,
        additive: "badditive" = 0.0,
        scaling: "scaling" = 1.0,
        smoothing: "smoothing" = 0.5,
        r: "r" = 1.0,
        g: "g" = 1.0,
        b: "b" = 1.0,
        a: "a" = 1.0,
    }
}

pub const MAX_SHAPE_INSTANCES: usize = 1024;
pub const MAX_WAVE_SAMPLES: usize = 512;

impl ShapeInstance {
    pub fn side_count(&self) -> usize {
        (self.sides.round() as i64).clamp(3, 100) as usize
    }
}

impl WaveFrame {
    pub fn sample_count(&self) -> usize {
        (self.samples.round() as i64).clamp(2, MAX_WAVE_SAMPLES as i64) as usize
    }
}

/// A custom wave point in normalized coordinates (0..1, y up).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WavePoint {
    pub x: f32,
    pub y: f32,
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Debug, Clone, Default)]
pub struct WaveRender {
    pub frame: WaveFrame,
    pub points: Vec<WavePoint>,
}
