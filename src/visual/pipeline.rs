use tracing::{info, warn};

use crate::audio::WaveData;
use crate::error::PipelineError;
use crate::runtime::{GlobalVars, PresetRuntime, WavePoint};

use super::canvas::Canvas;
use super::mesh::{self, WarpMesh};
use super::post::{self, CompositeParams};
use super::shapes::draw_shapes;
use super::waves::{BasicWave, draw_custom_waves};
use super::RenderBackend;

/// Feedback renderer: two same-size targets swapped every frame, a warp mesh,
/// and the overlay and composite passes in between.
pub struct FramePipeline {
    width: usize,
    height: usize,
    prev: Canvas,
    target: Canvas,
    output: Vec<u8>,
    mesh: WarpMesh,
    backend: Box<dyn RenderBackend>,
    basic_wave: BasicWave,
    wave_scratch: Vec<WavePoint>,
    gpu_failed: bool,
}

impl FramePipeline {
    pub fn new(
        width: usize,
        height: usize,
        mesh_cols: usize,
        mesh_rows: usize,
        mut backend: Box<dyn RenderBackend>,
    ) -> Result<Self, PipelineError> {
        let (prev, target, output) = allocate(width, height)?;
        backend.resize(width, height)?;
        let aspect = GlobalVars { width, height, ..GlobalVars::default() }.aspect();
        info!(width, height, backend = backend.name(), "frame pipeline ready");
        Ok(Self {
            width,
            height,
            prev,
            target,
            output,
            mesh: WarpMesh::new(mesh_cols, mesh_rows, aspect),
            backend,
            basic_wave: BasicWave::new(),
            wave_scratch: Vec::new(),
            gpu_failed: false,
        })
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn mesh(&self) -> &WarpMesh {
        &self.mesh
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Last composed frame (RGBA8, row-major from the top-left).
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Feedback texture of the last frame, before compositing.
    pub fn feedback(&self) -> &Canvas {
        &self.prev
    }

    /// Reallocates both targets. On failure the previous size and the last
    /// output stay in place.
    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), PipelineError> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let (prev, target, output) = match allocate(width, height) {
            Ok(t) => t,
            Err(e) => {
                warn!(width, height, error = %e, "render target resize failed");
                return Err(e);
            }
        };
        if let Err(e) = self.backend.resize(width, height) {
            warn!(width, height, error = %e, "backend resize failed");
            let _ = self.backend.resize(self.width, self.height);
            return Err(e);
        }
        self.prev = prev;
        self.target = target;
        self.output = output;
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Renders one frame for `runtime` and returns the composed pixels.
    pub fn render(
        &mut self,
        runtime: &mut PresetRuntime,
        globals: &GlobalVars,
        wave: &WaveData,
    ) -> &[u8] {
        let frame = *runtime.update_frame(globals);
        let aspect = globals.aspect();
        let aspect32 = (aspect.0 as f32, aspect.1 as f32);
        let time = globals.time;

        self.mesh.set_aspect(aspect);
        let (inputs, verts) = self.mesh.split_mut();
        runtime.eval_pixels(inputs, verts);
        self.mesh.update(&frame, time);

        let wrap = frame.wrap_enabled();
        if let Err(e) = self
            .backend
            .warp(&self.mesh, frame.decay, wrap, &self.prev, &mut self.target)
        {
            self.note_gpu_failure(&e);
            mesh::warp_cpu(&self.mesh, frame.decay, wrap, &self.prev, &mut self.target);
        }

        post::draw_motion_vectors(&mut self.target, &self.mesh, &frame);
        let shapes = runtime.eval_shapes();
        draw_shapes(&mut self.target, shapes, &self.prev, aspect32);
        let waves = runtime.eval_waves(wave);
        draw_custom_waves(&mut self.target, waves, &mut self.wave_scratch);
        self.basic_wave.draw(
            &mut self.target,
            &frame,
            &globals.levels,
            wave,
            time as f32,
            aspect32,
        );
        if frame.darken_center != 0.0 {
            post::darken_center(&mut self.target, aspect32);
        }
        post::draw_borders(&mut self.target, &frame);

        let params = CompositeParams::from_frame(&frame, time, runtime.rand_start());
        if let Err(e) = self.backend.composite(&params, &self.target, &mut self.output) {
            self.note_gpu_failure(&e);
            post::composite_cpu(&params, &self.target, &mut self.output);
        }

        std::mem::swap(&mut self.prev, &mut self.target);
        &self.output
    }

    fn note_gpu_failure(&mut self, e: &PipelineError) {
        if !self.gpu_failed {
            warn!(backend = self.backend.name(), error = %e, "backend pass failed, using cpu");
            self.gpu_failed = true;
        }
    }
}

fn allocate(width: usize, height: usize) -> Result<(Canvas, Canvas, Vec<u8>), PipelineError> {
    let mut prev = Canvas::new(width, height)?;
    let mut target = Canvas::new(width, height)?;
    prev.clear();
    target.clear();
    let bytes = width * height * 4;
    let mut output = Vec::new();
    output
        .try_reserve_exact(bytes)
        .map_err(|_| PipelineError::Alloc { w: width, h: height, bytes })?;
    output.resize(bytes, 0);
    Ok((prev, target, output))
}
