use crate::catalog::BaseVals;

var_block! {
    /// Fully resolved preset-scope values for one frame, narrowed to `f32`
    /// for the render passes. [`super::PresetRuntime::var`] returns the exact
    /// `f64` a value resolved to.
    PresetFrame, FRAME_VARS {
        decay: "decay" = 0.98,
        gamma_adj: "gammaadj" = 2.0,
        echo_zoom: "echo_zoom" = 2.0,
        echo_alpha: "echo_alpha" = 0.0,
        echo_orient: "echo_orient" = 0.0,
        wave_mode: "wave_mode" = 0.0,
        additive_wave: "additivewave" = 0.0,
        wave_dots: "wave_dots" = 0.0,
        wave_thick: "wave_thick" = 0.0,
        wave_a: "wave_a" = 0.8,
        wave_scale: "wave_scale" = 1.0,
        wave_smoothing: "wave_smoothing" = 0.75,
        wave_mystery: "wave_mystery" = 0.0,
        mod_wave_alpha_by_volume: "modwavealphabyvolume" = 0.0,
        mod_wave_alpha_start: "modwavealphastart" = 0.75,
        mod_wave_alpha_end: "modwavealphaend" = 0.95,
        wave_r: "wave_r" = 1.0,
        wave_g: "wave_g" = 1.0,
        wave_b: "wave_b" = 1.0,
        wave_x: "wave_x" = 0.5,
        wave_y: "wave_y" = 0.5,
        wave_brighten: "wave_brighten" = 1.0,
        wrap: "wrap" = 1.0,
        darken_center: "darken_center" = 0.0,
        brighten: "brighten" = 0.0,
        darken: "darken" = 0.0,
        solarize: "solarize" = 0.0,
        invert: "invert" = 0.0,
        motion_vectors_on: "bmotionvectorson" = 1.0,
        mv_x: "mv_x" = 12.0,
        mv_y: "mv_y" = 9.0,
        mv_dx: "mv_dx" = 0.0,
        mv_dy: "mv_dy" = 0.0,
        mv_l: "mv_l" = 0.9,
        mv_r: "mv_r" = 1.0,
        mv_g: "mv_g" = 1.0,
        mv_b: "mv_b" = 1.0,
        mv_a: "mv_a" = 1.0,
        warp_anim_speed: "warpanimspeed" = 1.0,
        warp_scale: "warpscale" = 1.0,
        zoom_exp: "zoomexp" = 1.0,
        zoom: "zoom" = 1.0,
        rot: "rot" = 0.0,
        cx: "cx" = 0.5,
        cy: "cy" = 0.5,
        dx: "dx" = 0.0,
        dy: "dy" = 0.0,
        warp: "warp" = 1.0,
        sx: "sx" = 1.0,
        sy: "sy" = 1.0,
        ob_size: "ob_size" = 0.01,
        ob_r: "ob_r" = 0.0,
        ob_g: "ob_g" = 0.0,
        ob_b: "ob_b" = 0.0,
        ob_a: "ob_a" = 0.0,
        ib_size: "ib_size" = 0.01,
        ib_r: "ib_r" = 0.25,
        ib_g: "ib_g" = 0.25,
        ib_b: "ib_b" = 0.25,
        ib_a: "ib_a" = 0.0,
        hue_shader: "fshader" = 0.0,
    }
}

impl PresetFrame {
    /// Defaults overridden by whatever `base` provides.
    pub fn with_base(base: &BaseVals) -> Self {
        Self::from_values(
            FRAME_VARS
                .iter()
                .map(|(name, d)| base.get(*name).copied().unwrap_or(*d)),
        )
    }

    pub fn wrap_enabled(&self) -> bool {
        self.wrap != 0.0
    }

    pub fn wave_mode_index(&self) -> u32 {
        (self.wave_mode.max(0.0) as u32) % 8
    }
}

/// Per-vertex warp parameters; the ten values a pixel expression may override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpVertex {
    pub zoom: f32,
    pub zoom_exp: f32,
    pub rot: f32,
    pub warp: f32,
    pub cx: f32,
    pub cy: f32,
    pub dx: f32,
    pub dy: f32,
    pub sx: f32,
    pub sy: f32,
}

pub const WARP_VARS: [&str; 10] = ["zoom", "zoomexp", "rot", "warp", "cx", "cy", "dx", "dy", "sx", "sy"];

impl WarpVertex {
    pub fn from_frame(f: &PresetFrame) -> Self {
        Self {
            zoom: f.zoom,
            zoom_exp: f.zoom_exp,
            rot: f.rot,
            warp: f.warp,
            cx: f.cx,
            cy: f.cy,
            dx: f.dx,
            dy: f.dy,
            sx: f.sx,
            sy: f.sy,
        }
    }

    pub fn from_values(v: [f64; 10]) -> Self {
        Self {
            zoom: v[0] as f32,
            zoom_exp: v[1] as f32,
            rot: v[2] as f32,
            warp: v[3] as f32,
            cx: v[4] as f32,
            cy: v[5] as f32,
            dx: v[6] as f32,
            dy: v[7] as f32,
            sx: v[8] as f32,
            sy: v[9] as f32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelInput {
    pub x: f64,
    pub y: f64,
    pub rad: f64,
    pub ang: f64,
}
