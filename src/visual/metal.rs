use metal::*;
use objc::rc::autoreleasepool;
use tracing::info;

use crate::error::PipelineError;

use super::canvas::Canvas;
use super::mesh::WarpMesh;
use super::post::CompositeParams;
use super::RenderBackend;

const MAX_TEXTURE_SIZE: usize = 16384;

#[repr(C)]
#[derive(Clone, Copy)]
struct WarpUniforms {
    w: u32,
    h: u32,
    cols: u32,
    rows: u32,
    decay: f32,
    wrap: u32,
}

#[derive(Clone, Copy)]
enum Kernel {
    Warp,
    Composite,
}

/// Runs the warp and composite passes as Metal compute kernels. Each pass
/// uploads the CPU canvas, dispatches, and reads the result back.
pub struct MetalBackend {
    device: Device,
    queue: CommandQueue,
    warp: ComputePipelineState,
    composite: ComputePipelineState,
    wrap_sampler: SamplerState,
    clamp_sampler: SamplerState,

    w: usize,
    h: usize,
    tex_src: Texture,
    tex_dst: Texture,
    staging: Buffer,
    readback: Buffer,
    bpr: usize,

    uv: Buffer,
    uv_capacity: usize,
    uniforms: Buffer,
}

fn gpu_err(what: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Gpu(format!("{what}: {e}"))
}

impl MetalBackend {
    pub fn new() -> Result<Self, PipelineError> {
        let device = Device::system_default()
            .ok_or_else(|| PipelineError::Gpu("no Metal device found".to_string()))?;
        let queue = device.new_command_queue();

        let options = CompileOptions::new();
        options.set_fast_math_enabled(false);
        let library = device
            .new_library_with_source(METAL_SRC, &options)
            .map_err(|e| gpu_err("Metal shader compile failed", e))?;

        let pipeline = |name: &str| -> Result<ComputePipelineState, PipelineError> {
            let func = library
                .get_function(name, None)
                .map_err(|e| gpu_err(&format!("Metal get_function({name}) failed"), e))?;
            device
                .new_compute_pipeline_state_with_function(&func)
                .map_err(|e| gpu_err("Metal compute pipeline creation failed", e))
        };
        let warp = pipeline("warp")?;
        let composite = pipeline("composite")?;

        let sampler = |mode: MTLSamplerAddressMode| {
            let desc = SamplerDescriptor::new();
            desc.set_min_filter(MTLSamplerMinMagFilter::Linear);
            desc.set_mag_filter(MTLSamplerMinMagFilter::Linear);
            desc.set_address_mode_s(mode);
            desc.set_address_mode_t(mode);
            device.new_sampler(&desc)
        };
        let wrap_sampler = sampler(MTLSamplerAddressMode::Repeat);
        let clamp_sampler = sampler(MTLSamplerAddressMode::ClampToEdge);

        let uniforms = device.new_buffer(
            std::mem::size_of::<CompositeParams>().max(std::mem::size_of::<WarpUniforms>()) as u64,
            MTLResourceOptions::StorageModeShared,
        );
        let uv = device.new_buffer(8, MTLResourceOptions::StorageModeShared);
        let (tex_src, tex_dst, staging, readback, bpr) = make_resources(&device, 1, 1);

        info!(device = %device.name(), "metal backend ready");
        Ok(Self {
            device,
            queue,
            warp,
            composite,
            wrap_sampler,
            clamp_sampler,
            w: 1,
            h: 1,
            tex_src,
            tex_dst,
            staging,
            readback,
            bpr,
            uv,
            uv_capacity: 1,
            uniforms,
        })
    }

    fn write_uniforms<T: Copy>(&self, value: &T) {
        // SAFETY: the uniforms buffer is shared memory sized for the largest uniform block.
        unsafe {
            std::ptr::copy_nonoverlapping(
                (value as *const T).cast::<u8>(),
                self.uniforms.contents().cast::<u8>(),
                std::mem::size_of::<T>(),
            );
        }
    }

    fn upload_uvs(&mut self, uvs: &[[f32; 2]]) {
        if uvs.len() > self.uv_capacity {
            self.uv = self.device.new_buffer(
                std::mem::size_of_val(uvs) as u64,
                MTLResourceOptions::StorageModeShared,
            );
            self.uv_capacity = uvs.len();
        }
        // SAFETY: the buffer holds at least `uv_capacity` float2 entries.
        unsafe {
            std::ptr::copy_nonoverlapping(
                uvs.as_ptr().cast::<u8>(),
                self.uv.contents().cast::<u8>(),
                std::mem::size_of_val(uvs),
            );
        }
    }

    /// Uploads `src`, runs `kernel` from the source texture into the
    /// destination texture, and copies the result into `out`.
    fn run_pass(&self, kernel: Kernel, wrap: bool, src: &[u8], out: &mut [u8]) -> Result<(), PipelineError> {
        let row_bytes = self.w * 4;
        let need = row_bytes * self.h;
        if src.len() < need || out.len() < need {
            return Err(PipelineError::Gpu(format!(
                "pixel buffer size mismatch for {}x{}",
                self.w, self.h
            )));
        }

        // SAFETY: staging holds `bpr * h` bytes; rows are copied within bounds.
        unsafe {
            let dst = std::slice::from_raw_parts_mut(
                self.staging.contents().cast::<u8>(),
                self.bpr * self.h,
            );
            for y in 0..self.h {
                dst[y * self.bpr..y * self.bpr + row_bytes]
                    .copy_from_slice(&src[y * row_bytes..(y + 1) * row_bytes]);
            }
        }

        let size = MTLSize::new(self.w as u64, self.h as u64, 1);
        let origin = MTLOrigin { x: 0, y: 0, z: 0 };
        let cmd = autoreleasepool(|| {
            let cmd = self.queue.new_command_buffer();

            let blit = cmd.new_blit_command_encoder();
            blit.copy_from_buffer_to_texture(
                &self.staging,
                0,
                self.bpr as u64,
                (self.bpr * self.h) as u64,
                size,
                &self.tex_src,
                0,
                0,
                origin,
                MTLBlitOption::None,
            );
            blit.end_encoding();

            let encoder = cmd.new_compute_command_encoder();
            match kernel {
                Kernel::Warp => {
                    encoder.set_compute_pipeline_state(&self.warp);
                    let sampler = if wrap { &self.wrap_sampler } else { &self.clamp_sampler };
                    encoder.set_sampler_state(0, Some(sampler));
                    encoder.set_buffer(1, Some(&self.uv), 0);
                }
                Kernel::Composite => {
                    encoder.set_compute_pipeline_state(&self.composite);
                    encoder.set_sampler_state(0, Some(&self.wrap_sampler));
                }
            }
            encoder.set_texture(0, Some(&self.tex_src));
            encoder.set_texture(1, Some(&self.tex_dst));
            encoder.set_buffer(0, Some(&self.uniforms), 0);
            encoder.dispatch_threads(size, MTLSize::new(16, 16, 1));
            encoder.end_encoding();

            let blit = cmd.new_blit_command_encoder();
            blit.copy_from_texture_to_buffer(
                &self.tex_dst,
                0,
                0,
                origin,
                size,
                &self.readback,
                0,
                self.bpr as u64,
                (self.bpr * self.h) as u64,
                MTLBlitOption::None,
            );
            blit.end_encoding();

            let owned = cmd.to_owned();
            owned.commit();
            owned
        });
        cmd.wait_until_completed();
        if cmd.status() == MTLCommandBufferStatus::Error {
            return Err(PipelineError::Gpu("Metal command buffer failed".to_string()));
        }

        // SAFETY: the readback buffer holds `bpr * h` bytes written by the blit above.
        unsafe {
            let rb = std::slice::from_raw_parts(self.readback.contents().cast::<u8>(), self.bpr * self.h);
            for y in 0..self.h {
                out[y * row_bytes..(y + 1) * row_bytes]
                    .copy_from_slice(&rb[y * self.bpr..y * self.bpr + row_bytes]);
            }
        }
        Ok(())
    }
}

impl RenderBackend for MetalBackend {
    fn name(&self) -> &'static str {
        "metal"
    }

    fn resize(&mut self, w: usize, h: usize) -> Result<(), PipelineError> {
        if w == 0 || h == 0 {
            return Err(PipelineError::ZeroSize { w, h });
        }
        if (w, h) == (self.w, self.h) {
            return Ok(());
        }
        if w > MAX_TEXTURE_SIZE || h > MAX_TEXTURE_SIZE {
            return Err(PipelineError::Gpu(format!(
                "{w}x{h} exceeds the {MAX_TEXTURE_SIZE} texture limit"
            )));
        }
        let (tex_src, tex_dst, staging, readback, bpr) = make_resources(&self.device, w, h);
        self.tex_src = tex_src;
        self.tex_dst = tex_dst;
        self.staging = staging;
        self.readback = readback;
        self.bpr = bpr;
        self.w = w;
        self.h = h;
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
        self.upload_uvs(mesh.uvs());
        self.write_uniforms(&WarpUniforms {
            w: self.w as u32,
            h: self.h as u32,
            cols: mesh.cols() as u32,
            rows: mesh.rows() as u32,
            decay: decay.clamp(0.0, 1.0),
            wrap: u32::from(wrap),
        });
        self.run_pass(Kernel::Warp, wrap, prev.pixels(), target.pixels_mut())
    }

    fn composite(
        &mut self,
        params: &CompositeParams,
        src: &Canvas,
        out: &mut [u8],
    ) -> Result<(), PipelineError> {
        self.write_uniforms(params);
        self.run_pass(Kernel::Composite, true, src.pixels(), out)
    }
}

fn make_resources(device: &Device, w: usize, h: usize) -> (Texture, Texture, Buffer, Buffer, usize) {
    let desc = TextureDescriptor::new();
    desc.set_texture_type(MTLTextureType::D2);
    desc.set_pixel_format(MTLPixelFormat::RGBA8Unorm);
    desc.set_width(w as u64);
    desc.set_height(h as u64);
    desc.set_storage_mode(MTLStorageMode::Private);
    desc.set_usage(MTLTextureUsage::ShaderRead | MTLTextureUsage::ShaderWrite);

    let tex_src = device.new_texture(&desc);
    let tex_dst = device.new_texture(&desc);

    let align = (device.minimum_linear_texture_alignment_for_pixel_format(MTLPixelFormat::RGBA8Unorm) as usize).max(16);
    let bpr = (w * 4).div_ceil(align) * align;
    let len = (bpr * h) as u64;
    let staging = device.new_buffer(len, MTLResourceOptions::StorageModeShared);
    let readback = device.new_buffer(len, MTLResourceOptions::StorageModeShared);
    (tex_src, tex_dst, staging, readback, bpr)
}

const METAL_SRC: &str = r#"
#include <metal_stdlib>
using namespace metal;

struct WarpUniforms {
    uint w;
    uint h;
    uint cols;
    uint rows;
    float decay;
    uint wrap;
};

struct CompositeUniforms {
    float gamma;
    float echo_zoom;
    float echo_alpha;
    uint echo_orient;
    float hue_amount;
    uint brighten;
    uint darken;
    uint solarize;
    uint invert;
    uint pad0;
    uint pad1;
    uint pad2;
    float4 shade[4];
};

kernel void warp(
    texture2d<float, access::sample> prev [[texture(0)]],
    texture2d<float, access::write> out [[texture(1)]],
    sampler s [[sampler(0)]],
    constant WarpUniforms& u [[buffer(0)]],
    const device float2* uv [[buffer(1)]],
    uint2 gid [[thread_position_in_grid]])
{
    if (gid.x >= u.w || gid.y >= u.h) return;
    float2 p = (float2(gid) + 0.5) / float2(u.w, u.h);
    float gx = clamp(p.x * float(u.cols), 0.0, float(u.cols));
    float gy = clamp(p.y * float(u.rows), 0.0, float(u.rows));
    uint i = min(uint(gx), u.cols - 1);
    uint j = min(uint(gy), u.rows - 1);
    float tx = gx - float(i);
    float ty = gy - float(j);
    uint stride = u.cols + 1;
    float2 a = uv[j * stride + i];
    float2 b = uv[j * stride + i + 1];
    float2 c = uv[(j + 1) * stride + i];
    float2 d = uv[(j + 1) * stride + i + 1];
    float2 t = mix(mix(a, b, tx), mix(c, d, tx), ty);
    float3 col = prev.sample(s, t).rgb;
    float3 v = floor(col * 255.0 * u.decay + 1e-3) / 255.0;
    out.write(float4(clamp(v, 0.0, 1.0), 1.0), gid);
}

kernel void composite(
    texture2d<float, access::sample> src [[texture(0)]],
    texture2d<float, access::write> out [[texture(1)]],
    sampler s [[sampler(0)]],
    constant CompositeUniforms& p [[buffer(0)]],
    uint2 gid [[thread_position_in_grid]])
{
    uint w = out.get_width();
    uint h = out.get_height();
    if (gid.x >= w || gid.y >= h) return;
    float2 uv = (float2(gid) + 0.5) / float2(w, h);
    float3 c = src.read(gid).rgb;
    if (p.echo_alpha > 0.0) {
        float2 e = (uv - 0.5) / p.echo_zoom;
        if (p.echo_orient & 1u) e.x = -e.x;
        if (p.echo_orient & 2u) e.y = -e.y;
        c = mix(c, src.sample(s, e + 0.5).rgb, p.echo_alpha);
    }
    float3 top = mix(p.shade[0].rgb, p.shade[1].rgb, uv.x);
    float3 bot = mix(p.shade[2].rgb, p.shade[3].rgb, uv.x);
    float3 tint = mix(float3(1.0), mix(top, bot, uv.y), p.hue_amount);
    c = clamp(c * p.gamma * tint, 0.0, 1.0);
    if (p.brighten != 0u) c = sqrt(c);
    if (p.darken != 0u) c = c * c;
    if (p.solarize != 0u) c = c * (1.0 - c) * 4.0;
    if (p.invert != 0u) c = 1.0 - c;
    out.write(float4(c, 1.0), gid);
}
"#;
