macro_rules! var_block {
    (
        $(#[$meta:meta])*
        $ty:ident, $table:ident {
            $($field:ident : $name:literal = $default:expr),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $ty {
            $(pub $field: f32,)*
        }

        pub const $table: &[(&str, f64)] = &[$(($name, $default)),*];

        impl $ty {
            /// Builds the block from values listed in table order.
            pub fn from_values(mut vals: impl Iterator<Item = f64>) -> Self {
                Self {
                    $($field: vals.next().unwrap_or($default) as f32,)*
                }
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::from_values(std::iter::empty())
            }
        }
    };
}

pub mod frame;
pub mod objects;

use crate::audio::{AudioLevels, WaveData};
use crate::catalog::{BaseVals, PresetDefinition};
use crate::eqn::{ExecEnv, MegaBuf, Program, SlotTable, Vm, compile};

pub use frame::{FRAME_VARS, PixelInput, PresetFrame, WARP_VARS, WarpVertex};
pub use objects::{
    MAX_SHAPE_INSTANCES, MAX_WAVE_SAMPLES, SHAPE_VARS, ShapeInstance, WAVE_VARS, WaveFrame,
    WavePoint, WaveRender,
};

pub const Q_COUNT: usize = 32;
pub const T_COUNT: usize = 8;
pub const REG_COUNT: usize = 100;
pub const MAX_SHAPES: usize = 4;
pub const MAX_WAVES: usize = 4;

const GLOBAL_VARS: [&str; 15] = [
    "frame", "time", "fps", "bass", "mid", "treb", "bass_att", "mid_att", "treb_att", "meshx",
    "meshy", "aspectx", "aspecty", "pixelsx", "pixelsy",
];

const PIXEL_VARS: [&str; 4] = ["x", "y", "rad", "ang"];
const SHAPE_AUX: [&str; 1] = ["instance"];
const WAVE_AUX: [&str; 9] = ["sample", "value1", "value2", "x", "y", "r", "g", "b", "a"];

/// Values refreshed in every context at the start of each evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalVars {
    pub frame: u64,
    pub time: f64,
    pub fps: f64,
    pub levels: AudioLevels,
    pub mesh_cols: usize,
    pub mesh_rows: usize,
    pub width: usize,
    pub height: usize,
}

impl Default for GlobalVars {
    fn default() -> Self {
        Self {
            frame: 0,
            time: 0.0,
            fps: 60.0,
            levels: AudioLevels::neutral(),
            mesh_cols: 64,
            mesh_rows: 48,
            width: 640,
            height: 480,
        }
    }
}

impl GlobalVars {
    pub fn aspect(&self) -> (f64, f64) {
        let w = self.width.max(1) as f64;
        let h = self.height.max(1) as f64;
        let ax = if h > w { w / h } else { 1.0 };
        let ay = if w > h { h / w } else { 1.0 };
        (ax, ay)
    }

    fn values(&self) -> [f64; GLOBAL_VARS.len()] {
        let l = &self.levels;
        let (ax, ay) = self.aspect();
        [
            self.frame as f64,
            self.time,
            self.fps,
            l.bass as f64,
            l.mid as f64,
            l.treb as f64,
            l.bass_att as f64,
            l.mid_att as f64,
            l.treb_att as f64,
            self.mesh_cols as f64,
            self.mesh_rows as f64,
            ax,
            ay,
            self.width as f64,
            self.height as f64,
        ]
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Init,
    Frame,
    Extra,
}

struct ScopeSpec<'a> {
    label: String,
    fields: &'static [(&'static str, f64)],
    base_vals: &'a BaseVals,
    aux: &'a [&'a str],
    seeds: &'a [(&'a str, f64)],
    init: Option<&'a str>,
    frame: Option<&'a str>,
    extra: Option<&'a str>,
}

/// One scripting context: its slot table, variable arena and programs.
struct Scope {
    label: String,
    table: SlotTable,
    vars: Vec<f64>,
    base: Vec<(u16, f64)>,
    fields: Vec<u16>,
    aux: Vec<u16>,
    q: [u16; Q_COUNT],
    t: [u16; T_COUNT],
    reg: [u16; REG_COUNT],
    globals: [u16; GLOBAL_VARS.len()],
    megabuf: MegaBuf,
    init: Program,
    frame: Program,
    extra: Program,
    reported: bool,
}

impl Scope {
    fn build(spec: ScopeSpec<'_>) -> Self {
        let mut table = SlotTable::new();
        let fields = spec
            .fields
            .iter()
            .map(|(name, _)| table.reserve(name))
            .collect::<Vec<_>>();
        let q = std::array::from_fn(|i| table.reserve(&format!("q{}", i + 1)));
        let t = std::array::from_fn(|i| table.reserve(&format!("t{}", i + 1)));
        let reg = std::array::from_fn(|i| table.reserve(&format!("reg{i:02}")));
        let globals = std::array::from_fn(|i| table.reserve(GLOBAL_VARS[i]));
        let aux = spec.aux.iter().map(|n| table.reserve(n)).collect::<Vec<_>>();

        let mut base = spec
            .fields
            .iter()
            .zip(&fields)
            .map(|((name, d), slot)| (*slot, spec.base_vals.get(*name).copied().unwrap_or(*d)))
            .collect::<Vec<_>>();
        for (name, v) in spec.seeds {
            base.push((table.reserve(name), *v));
        }
        for (name, v) in spec.base_vals {
            if table.get(name).is_none() {
                base.push((table.reserve(name), *v));
            }
        }

        let init = compile_or_noop(&spec.label, "init", spec.init, &mut table);
        let frame = compile_or_noop(&spec.label, "frame", spec.frame, &mut table);
        let extra = compile_or_noop(&spec.label, "per-point", spec.extra, &mut table);

        let mut scope = Self {
            label: spec.label,
            vars: vec![0.0; table.len()],
            table,
            base,
            fields,
            aux,
            q,
            t,
            reg,
            globals,
            megabuf: MegaBuf::new(),
            init,
            frame,
            extra,
            reported: false,
        };
        scope.reset_base();
        scope
    }

    fn reset_base(&mut self) {
        for &(s, v) in &self.base {
            self.vars[s as usize] = v;
        }
    }

    fn set_globals(&mut self, vals: &[f64; GLOBAL_VARS.len()]) {
        for (s, v) in self.globals.iter().zip(vals) {
            self.vars[*s as usize] = *v;
        }
    }

    fn set_q(&mut self, q: &[f64; Q_COUNT]) {
        for (s, v) in self.q.iter().zip(q) {
            self.vars[*s as usize] = *v;
        }
    }

    fn get_q(&self) -> [f64; Q_COUNT] {
        std::array::from_fn(|i| self.vars[self.q[i] as usize])
    }

    fn set_t(&mut self, t: &[f64; T_COUNT]) {
        for (s, v) in self.t.iter().zip(t) {
            self.vars[*s as usize] = *v;
        }
    }

    fn get_t(&self) -> [f64; T_COUNT] {
        std::array::from_fn(|i| self.vars[self.t[i] as usize])
    }

    fn set_regs(&mut self, regs: &[f64; REG_COUNT]) {
        for (s, v) in self.reg.iter().zip(regs) {
            self.vars[*s as usize] = *v;
        }
    }

    fn commit_regs(&self, vars: &[f64], regs: &mut [f64; REG_COUNT]) {
        for (dst, s) in regs.iter_mut().zip(&self.reg) {
            *dst = vars[*s as usize];
        }
    }

    fn field_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.fields.iter().map(|s| self.vars[*s as usize])
    }

    fn slot_of(&mut self, name: &str) -> u16 {
        let s = self.table.reserve(name);
        if s as usize >= self.vars.len() {
            self.vars.resize(s as usize + 1, 0.0);
        }
        s
    }

    fn has(&self, stage: Stage) -> bool {
        !self.program(stage).is_empty()
    }

    fn program(&self, stage: Stage) -> &Program {
        match stage {
            Stage::Init => &self.init,
            Stage::Frame => &self.frame,
            Stage::Extra => &self.extra,
        }
    }

    fn run(&mut self, stage: Stage, vm: &mut Vm, gmegabuf: &mut MegaBuf) {
        let prog = match stage {
            Stage::Init => &self.init,
            Stage::Frame => &self.frame,
            Stage::Extra => &self.extra,
        };
        if prog.is_empty() {
            return;
        }
        let mut env = ExecEnv {
            vars: &mut self.vars,
            megabuf: &mut self.megabuf,
            gmegabuf,
        };
        if let Err(e) = vm.run(prog, &mut env) {
            self.report(stage, e);
        }
    }

    // Per-pixel evaluation runs against a transient copy of the variables.
    fn run_detached(&mut self, vars: &mut [f64], vm: &mut Vm, gmegabuf: &mut MegaBuf) {
        let mut env = ExecEnv {
            vars,
            megabuf: &mut self.megabuf,
            gmegabuf,
        };
        if let Err(e) = vm.run(&self.extra, &mut env) {
            self.report(Stage::Extra, e);
        }
    }

    fn report(&mut self, stage: Stage, e: crate::error::EvalError) {
        if !self.reported {
            tracing::debug!(scope = %self.label, ?stage, "expression aborted: {e}");
            self.reported = true;
        }
    }
}

fn compile_or_noop(label: &str, stage: &str, src: Option<&str>, table: &mut SlotTable) -> Program {
    let Some(src) = src else {
        return Program::noop();
    };
    match compile(src, table) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(preset = %label, stage, "expression failed to compile, ignoring it: {e}");
            Program::noop()
        }
    }
}

/// The live scripting state of one loaded preset.
pub struct PresetRuntime {
    name: String,
    preset: Scope,
    shapes: Vec<Scope>,
    waves: Vec<Scope>,
    shape_t_init: Vec<[f64; T_COUNT]>,
    wave_t_init: Vec<[f64; T_COUNT]>,
    regs: [f64; REG_COUNT],
    regs_pending: bool,
    gmegabuf: MegaBuf,
    q_init: [f64; Q_COUNT],
    q_frame: [f64; Q_COUNT],
    rand_start: [f64; 4],
    rand_preset: [f64; 4],
    globals: [f64; GLOBAL_VARS.len()],
    warp_slots: [u16; 10],
    pixel_vars: Vec<f64>,
    frame: PresetFrame,
    vm: Vm,
    shape_out: Vec<ShapeInstance>,
    wave_out: Vec<WaveRender>,
    wave_left: Vec<f32>,
    wave_right: Vec<f32>,
}

impl PresetRuntime {
    pub fn new(def: &PresetDefinition, globals: &GlobalVars) -> Self {
        let rand_start: [f64; 4] = std::array::from_fn(|_| fastrand::f64());
        let rand_preset: [f64; 4] = std::array::from_fn(|_| fastrand::f64());
        let seeds = [
            ("rand_start_x", rand_start[0]),
            ("rand_start_y", rand_start[1]),
            ("rand_start_z", rand_start[2]),
            ("rand_start_w", rand_start[3]),
            ("rand_preset_x", rand_preset[0]),
            ("rand_preset_y", rand_preset[1]),
            ("rand_preset_z", rand_preset[2]),
            ("rand_preset_w", rand_preset[3]),
        ];
        let gvals = globals.values();
        let mut vm = Vm::new();
        let mut gmegabuf = MegaBuf::new();
        let mut regs = [0.0; REG_COUNT];

        let mut preset = Scope::build(ScopeSpec {
            label: def.name.clone(),
            fields: FRAME_VARS,
            base_vals: &def.base_vals,
            aux: &PIXEL_VARS,
            seeds: &seeds,
            init: def.init_eqs_str.as_deref(),
            frame: def.frame_eqs_str.as_deref(),
            extra: def.pixel_eqs_str.as_deref(),
        });
        preset.set_globals(&gvals);
        preset.run(Stage::Init, &mut vm, &mut gmegabuf);
        let q_init = preset.get_q();
        preset.commit_regs(&preset.vars, &mut regs);
        let warp_slots = std::array::from_fn(|i| preset.slot_of(WARP_VARS[i]));

        let mut shapes = Vec::new();
        let mut shape_t_init = Vec::new();
        for (i, spec) in def.shapes.iter().enumerate().take(MAX_SHAPES) {
            if !spec.enabled() {
                continue;
            }
            let mut scope = Scope::build(ScopeSpec {
                label: format!("{} / shape {i}", def.name),
                fields: SHAPE_VARS,
                base_vals: &spec.base_vals,
                aux: &SHAPE_AUX,
                seeds: &[],
                init: spec.init_eqs_str.as_deref(),
                frame: spec.frame_eqs_str.as_deref(),
                extra: None,
            });
            shape_t_init.push(init_object(&mut scope, &gvals, &q_init, &mut regs, &mut vm, &mut gmegabuf));
            shapes.push(scope);
        }

        let mut waves = Vec::new();
        let mut wave_t_init = Vec::new();
        for (i, spec) in def.waves.iter().enumerate().take(MAX_WAVES) {
            if !spec.enabled() {
                continue;
            }
            let mut scope = Scope::build(ScopeSpec {
                label: format!("{} / wave {i}", def.name),
                fields: WAVE_VARS,
                base_vals: &spec.base_vals,
                aux: &WAVE_AUX,
                seeds: &[],
                init: spec.init_eqs_str.as_deref(),
                frame: spec.frame_eqs_str.as_deref(),
                extra: spec.point_eqs_str.as_deref(),
            });
            wave_t_init.push(init_object(&mut scope, &gvals, &q_init, &mut regs, &mut vm, &mut gmegabuf));
            waves.push(scope);
        }

        let frame = PresetFrame::from_values(preset.field_values());
        tracing::debug!(
            preset = %def.name,
            shapes = shapes.len(),
            waves = waves.len(),
            pixel_eqs = preset.has(Stage::Extra),
            "preset runtime built"
        );

        Self {
            name: def.name.clone(),
            preset,
            shapes,
            waves,
            shape_t_init,
            wave_t_init,
            regs,
            regs_pending: false,
            gmegabuf,
            q_init,
            q_frame: q_init,
            rand_start,
            rand_preset,
            globals: gvals,
            warp_slots,
            pixel_vars: Vec::new(),
            frame,
            vm,
            shape_out: Vec::new(),
            wave_out: Vec::new(),
            wave_left: Vec::new(),
            wave_right: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &PresetFrame {
        &self.frame
    }

    pub fn has_pixel_eqs(&self) -> bool {
        self.preset.has(Stage::Extra)
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    pub fn reg(&self, index: usize) -> f64 {
        self.regs.get(index).copied().unwrap_or(0.0)
    }

    pub fn q(&self, index: usize) -> f64 {
        self.q_frame.get(index).copied().unwrap_or(0.0)
    }

    pub fn gmegabuf(&self, index: f64) -> f64 {
        self.gmegabuf.get(index)
    }

    pub fn rand_start(&self) -> [f64; 4] {
        self.rand_start
    }

    pub fn rand_preset(&self) -> [f64; 4] {
        self.rand_preset
    }

    /// Current value of a preset-scope variable.
    pub fn var(&self, name: &str) -> Option<f64> {
        self.preset
            .table
            .get(&name.to_ascii_lowercase())
            .map(|s| self.preset.vars[s as usize])
    }

    /// Runs the per-frame expression and resolves the frame snapshot.
    pub fn update_frame(&mut self, globals: &GlobalVars) -> &PresetFrame {
        self.flush_regs();
        self.globals = globals.values();

        let p = &mut self.preset;
        p.reset_base();
        p.set_q(&self.q_init);
        p.set_regs(&self.regs);
        p.set_globals(&self.globals);
        p.run(Stage::Frame, &mut self.vm, &mut self.gmegabuf);
        self.q_frame = p.get_q();

        if p.has(Stage::Extra) {
            // Committed once the whole mesh has been evaluated.
            self.regs_pending = true;
        } else {
            p.commit_regs(&p.vars, &mut self.regs);
        }
        self.frame = PresetFrame::from_values(p.field_values());
        &self.frame
    }

    /// Per-vertex warp values for the mesh. Without a pixel expression every
    /// vertex gets the frame values.
    pub fn eval_pixels(&mut self, inputs: &[PixelInput], out: &mut Vec<WarpVertex>) {
        out.clear();
        if !self.preset.has(Stage::Extra) {
            let v = WarpVertex::from_frame(&self.frame);
            out.extend(std::iter::repeat_n(v, inputs.len()));
            return;
        }

        self.pixel_vars.clear();
        self.pixel_vars.extend_from_slice(&self.preset.vars);
        let frame_vals: [f64; 10] =
            std::array::from_fn(|i| self.preset.vars[self.warp_slots[i] as usize]);
        let input_slots = [
            self.preset.aux[0],
            self.preset.aux[1],
            self.preset.aux[2],
            self.preset.aux[3],
        ];

        for input in inputs {
            let vars = &mut self.pixel_vars;
            vars[input_slots[0] as usize] = input.x;
            vars[input_slots[1] as usize] = input.y;
            vars[input_slots[2] as usize] = input.rad;
            vars[input_slots[3] as usize] = input.ang;
            for (s, v) in self.warp_slots.iter().zip(&frame_vals) {
                vars[*s as usize] = *v;
            }
            self.preset
                .run_detached(&mut self.pixel_vars, &mut self.vm, &mut self.gmegabuf);
            let vals = std::array::from_fn(|i| self.pixel_vars[self.warp_slots[i] as usize]);
            out.push(WarpVertex::from_values(vals));
        }

        self.preset.commit_regs(&self.pixel_vars, &mut self.regs);
        self.regs_pending = false;
    }

    pub fn eval_shapes(&mut self) -> &[ShapeInstance] {
        self.flush_regs();
        self.shape_out.clear();

        for (k, scope) in self.shapes.iter_mut().enumerate() {
            scope.reset_base();
            let count = ShapeInstance::from_values(scope.field_values())
                .num_inst
                .round()
                .clamp(1.0, MAX_SHAPE_INSTANCES as f32) as usize;
            let instance_slot = scope.aux[0] as usize;
            scope.set_regs(&self.regs);

            for j in 0..count {
                scope.reset_base();
                scope.set_q(&self.q_frame);
                scope.set_t(&self.shape_t_init[k]);
                scope.set_globals(&self.globals);
                scope.vars[instance_slot] = j as f64;
                scope.run(Stage::Frame, &mut self.vm, &mut self.gmegabuf);
                self.shape_out
                    .push(ShapeInstance::from_values(scope.field_values()));
            }
            scope.commit_regs(&scope.vars, &mut self.regs);
        }

        &self.shape_out
    }

    pub fn eval_waves(&mut self, data: &WaveData) -> &[WaveRender] {
        self.flush_regs();
        self.wave_out
            .resize_with(self.waves.len(), WaveRender::default);

        for (k, scope) in self.waves.iter_mut().enumerate() {
            scope.reset_base();
            scope.set_q(&self.q_frame);
            scope.set_t(&self.wave_t_init[k]);
            scope.set_regs(&self.regs);
            scope.set_globals(&self.globals);
            scope.run(Stage::Frame, &mut self.vm, &mut self.gmegabuf);

            let wf = WaveFrame::from_values(scope.field_values());
            let out = &mut self.wave_out[k];
            out.frame = wf;
            out.points.clear();

            if wf.enabled != 0.0 {
                let n = wf.sample_count();
                wave_values(&wf, data, n, &mut self.wave_left, &mut self.wave_right);
                let point_eqs = scope.has(Stage::Extra);
                let slots = scope.aux.clone();
                for j in 0..n {
                    let (v1, v2) = (self.wave_left[j], self.wave_right[j]);
                    let mut p = WavePoint {
                        x: 0.5 + v1,
                        y: 0.5 + v2,
                        r: wf.r,
                        g: wf.g,
                        b: wf.b,
                        a: wf.a,
                    };
                    if point_eqs {
                        let seed = [
                            j as f64 / (n - 1) as f64,
                            v1 as f64,
                            v2 as f64,
                            p.x as f64,
                            p.y as f64,
                            p.r as f64,
                            p.g as f64,
                            p.b as f64,
                            p.a as f64,
                        ];
                        for (s, v) in slots.iter().zip(seed) {
                            scope.vars[*s as usize] = v;
                        }
                        scope.run(Stage::Extra, &mut self.vm, &mut self.gmegabuf);
                        let get = |i: usize| scope.vars[slots[i] as usize] as f32;
                        p = WavePoint {
                            x: get(3),
                            y: get(4),
                            r: get(5),
                            g: get(6),
                            b: get(7),
                            a: get(8),
                        };
                    }
                    out.points.push(p);
                }
            }
            scope.commit_regs(&scope.vars, &mut self.regs);
        }

        &self.wave_out
    }

    fn flush_regs(&mut self) {
        if self.regs_pending {
            self.preset.commit_regs(&self.preset.vars, &mut self.regs);
            self.regs_pending = false;
        }
    }
}

fn init_object(
    scope: &mut Scope,
    globals: &[f64; GLOBAL_VARS.len()],
    q: &[f64; Q_COUNT],
    regs: &mut [f64; REG_COUNT],
    vm: &mut Vm,
    gmegabuf: &mut MegaBuf,
) -> [f64; T_COUNT] {
    scope.set_globals(globals);
    scope.set_q(q);
    scope.set_regs(regs);
    scope.run(Stage::Init, vm, gmegabuf);
    scope.commit_regs(&scope.vars, regs);
    scope.get_t()
}

// Fills `left`/`right` with `n` smoothed, scaled sample values for a custom wave.
fn wave_values(wf: &WaveFrame, data: &WaveData, n: usize, left: &mut Vec<f32>, right: &mut Vec<f32>) {
    let (src_l, src_r) = if wf.spectrum != 0.0 {
        (&data.spec_left, &data.spec_right)
    } else {
        (&data.time_left, &data.time_right)
    };
    let len = src_l.len().min(src_r.len());
    left.clear();
    right.clear();
    if len == 0 {
        left.resize(n, 0.0);
        right.resize(n, 0.0);
        return;
    }

    let sep = (wf.sep.max(0.0) as usize).min(len);
    let scale = wf.scaling * 0.5;
    let spectrum = wf.spectrum != 0.0;
    for j in 0..n {
        let i = if spectrum {
            j * (len - 1) / (n - 1).max(1)
        } else {
            (len.saturating_sub(n + sep) + j).min(len - 1)
        };
        left.push(src_l[i] * scale);
        right.push(src_r[(i + sep).min(len - 1)] * scale);
    }

    let s = wf.smoothing.clamp(0.0, 0.99);
    for buf in [&mut *left, &mut *right] {
        for j in 1..buf.len() {
            buf[j] = buf[j] * (1.0 - s) + buf[j - 1] * s;
        }
    }
}
