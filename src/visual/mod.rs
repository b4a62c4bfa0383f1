pub mod canvas;
pub mod mesh;
#[cfg(target_os = "macos")]
pub mod metal;
pub mod pipeline;
pub mod post;
pub mod shapes;
pub mod waves;

pub use canvas::{Blend, Canvas};
pub use mesh::WarpMesh;
pub use pipeline::FramePipeline;
pub use post::CompositeParams;

use crate::config::EngineMode;
use crate::error::PipelineError;

/// The two full-screen passes a backend may accelerate. Everything drawn
/// between them (vectors, shapes, waves, borders) stays on the CPU canvas.
pub trait RenderBackend {
    fn name(&self) -> &'static str;

    fn resize(&mut self, w: usize, h: usize) -> Result<(), PipelineError>;

    fn warp(
        &mut self,
        mesh: &WarpMesh,
        decay: f32,
        wrap: bool,
        prev: &Canvas,
        target: &mut Canvas,
    ) -> Result<(), PipelineError>;

    fn composite(
        &mut self,
        params: &CompositeParams,
        src: &Canvas,
        out: &mut [u8],
    ) -> Result<(), PipelineError>;
}

#[derive(Debug, Default)]
pub struct CpuBackend;

impl RenderBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn resize(&mut self, w: usize, h: usize) -> Result<(), PipelineError> {
        if w == 0 || h == 0 {
            return Err(PipelineError::ZeroSize { w, h });
        }
        Ok(())
    }

    fn warp(
        &mut self,
        mesh: &WarpMesh,
        decay: f32,
        wrap: bool,
        prev: &Canvas,
        target: &mut Canvas,
    ) -> Result<(), PipelineError> {
        mesh::warp_cpu(mesh, decay, wrap, prev, target);
        Ok(())
    }

    fn composite(
        &mut self,
        params: &CompositeParams,
        src: &Canvas,
        out: &mut [u8],
    ) -> Result<(), PipelineError> {
        post::composite_cpu(params, src, out);
        Ok(())
    }
}

pub fn make_backend(mode: EngineMode) -> Result<Box<dyn RenderBackend>, PipelineError> {
    match mode {
        EngineMode::Cpu => Ok(Box::new(CpuBackend)),
        #[cfg(target_os = "macos")]
        EngineMode::Metal => Ok(Box::new(metal::MetalBackend::new()?)),
        #[cfg(not(target_os = "macos"))]
        EngineMode::Metal => Err(PipelineError::Gpu(
            "the metal engine is only available on macOS".to_string(),
        )),
    }
}
