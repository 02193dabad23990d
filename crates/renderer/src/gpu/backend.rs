use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::backend::{FrameError, GraphicsBackend, MeshHandle, ProgramHandle, ShaderHandle};
use crate::shaders::{self, CompiledShader, ShaderStage};
use crate::types::PowerPreference;

use super::context::GpuContext;
use super::uniforms::SceneUniforms;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

struct GpuShader {
    compiled: CompiledShader,
    module: wgpu::ShaderModule,
}

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    vertex: usize,
    fragment: usize,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// One recorded draw plus the uniform values it was issued with.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DrawCall {
    program: ProgramHandle,
    mesh: MeshHandle,
    index_count: u32,
    uniforms: SceneUniforms,
}

struct PendingFrame {
    clear: wgpu::Color,
    program: Option<ProgramHandle>,
    draws: Vec<DrawCall>,
}

/// [`GraphicsBackend`] that renders into a winit window through wgpu.
///
/// Calls between `begin_frame` and `end_frame` are recorded and encoded in
/// `end_frame`, one render pass per draw so every draw sees its own uniforms.
pub struct WgpuBackend {
    // Declared before `window` so the surface is dropped first.
    context: GpuContext,
    window: Arc<Window>,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniforms: SceneUniforms,
    shaders: Vec<GpuShader>,
    programs: Vec<GpuProgram>,
    meshes: Vec<GpuMesh>,
    frame: Option<PendingFrame>,
    device_lost: Arc<AtomicBool>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>, power: PowerPreference) -> Result<Self> {
        let size = window.inner_size();
        let context = GpuContext::new(window.as_ref(), size, power)?;

        let device_lost = Arc::new(AtomicBool::new(false));
        let lost_flag = device_lost.clone();
        context
            .device
            .set_device_lost_callback(move |reason, message| {
                warn!(?reason, %message, "GPU device lost");
                lost_flag.store(true, Ordering::SeqCst);
            });

        let uniform_layout =
            context
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("scene uniform layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

        let uniforms = SceneUniforms::new(context.size.width, context.size.height);
        let uniform_buffer =
            context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("scene uniforms"),
                    contents: uniforms.as_bytes(),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scene uniform bind group"),
                layout: &uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

        Ok(Self {
            context,
            window,
            uniform_layout,
            uniform_buffer,
            uniform_bind_group,
            uniforms,
            shaders: Vec::new(),
            programs: Vec::new(),
            meshes: Vec::new(),
            frame: None,
            device_lost,
        })
    }

    /// Runs `build` inside a validation error scope and reports any error it raised.
    fn scoped<T>(&self, build: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = build(device);
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    fn check_device(&self) -> Result<(), FrameError> {
        if self.device_lost.load(Ordering::SeqCst) {
            Err(FrameError::SurfaceLost)
        } else {
            Ok(())
        }
    }

    fn acquire_frame(&mut self) -> Result<wgpu::SurfaceTexture, FrameError> {
        match self.context.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                Err(FrameError::Transient("surface outdated; reconfigured".into()))
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                Err(FrameError::Fatal("surface out of memory".into()))
            }
            Err(other) => Err(FrameError::Transient(format!("surface error: {other:?}"))),
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String> {
        let compiled = shaders::compile_glsl(stage, source)?;
        let label = format!("horizon {stage} shader");
        let module = self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Owned(source.to_owned()),
                    stage: stage.to_naga(),
                    defines: &[],
                },
            })
        })?;
        self.shaders.push(GpuShader { compiled, module });
        Ok(ShaderHandle::new(self.shaders.len() - 1))
    }

    fn link(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, String> {
        let vertex_shader = self
            .shaders
            .get(vertex.index())
            .ok_or_else(|| format!("unknown shader handle {}", vertex.index()))?;
        let fragment_shader = self
            .shaders
            .get(fragment.index())
            .ok_or_else(|| format!("unknown shader handle {}", fragment.index()))?;
        shaders::check_interface(&vertex_shader.compiled, &fragment_shader.compiled)?;

        let surface_format = self.context.surface_format;
        let pipeline = self.scoped(|device| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("horizon pipeline layout"),
                bind_group_layouts: &[&self.uniform_layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("horizon pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &vertex_shader.module,
                    entry_point: Some("main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_shader.module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        })?;

        self.programs.push(GpuProgram {
            pipeline,
            vertex: vertex.index(),
            fragment: fragment.index(),
        });
        Ok(ProgramHandle::new(self.programs.len() - 1))
    }

    fn validate(&mut self, program: ProgramHandle) -> Result<(), String> {
        let linked = self
            .programs
            .get(program.index())
            .ok_or_else(|| format!("unknown program handle {}", program.index()))?;
        shaders::validate_module(&self.shaders[linked.vertex].compiled)?;
        shaders::validate_module(&self.shaders[linked.fragment].compiled)?;

        // The pipeline's reflected layout must accept the uniform buffer.
        self.scoped(|device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("horizon validation bind group"),
                layout: &linked.pipeline.get_bind_group_layout(0),
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                }],
            })
        })
        .map(|_| ())
    }

    fn upload_mesh(
        &mut self,
        vertices: &[[f32; 3]],
        indices: &[u16],
    ) -> Result<MeshHandle, String> {
        if let Some(&bad) = indices.iter().find(|&&index| index as usize >= vertices.len()) {
            return Err(format!(
                "index {bad} out of range for {} vertices",
                vertices.len()
            ));
        }
        let device = &self.context.device;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad vertices"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad indices"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.push(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        });
        Ok(MeshHandle::new(self.meshes.len() - 1))
    }

    fn begin_frame(&mut self, width: u32, height: u32) -> Result<(), FrameError> {
        self.check_device()?;
        if width == 0 || height == 0 {
            return Err(FrameError::Transient(format!(
                "zero-sized surface {width}x{height}"
            )));
        }
        let size = PhysicalSize::new(width, height);
        if self.context.size != size {
            debug!(width, height, "resizing surface");
            self.context.resize(size);
        }
        self.frame = Some(PendingFrame {
            clear: wgpu::Color::BLACK,
            program: None,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) {
        if let Some(frame) = self.frame.as_mut() {
            frame.clear = wgpu::Color {
                r: f64::from(color[0]),
                g: f64::from(color[1]),
                b: f64::from(color[2]),
                a: f64::from(color[3]),
            };
        }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if let Some(frame) = self.frame.as_mut() {
            frame.program = Some(program);
        }
    }

    fn set_uniform_2f(&mut self, name: &str, x: f32, y: f32) {
        self.uniforms.set_vec2(name, x, y);
    }

    fn set_uniform_1f(&mut self, name: &str, x: f32) {
        self.uniforms.set_float(name, x);
    }

    fn draw_indexed_triangles(
        &mut self,
        mesh: MeshHandle,
        index_count: u32,
    ) -> Result<(), FrameError> {
        let uniforms = self.uniforms;
        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| FrameError::Fatal("draw issued outside a frame".into()))?;
        let program = frame
            .program
            .ok_or_else(|| FrameError::Fatal("draw issued without a bound program".into()))?;
        if program.index() >= self.programs.len() {
            return Err(FrameError::Fatal(format!(
                "unknown program handle {}",
                program.index()
            )));
        }
        let available = self
            .meshes
            .get(mesh.index())
            .map(|mesh| mesh.index_count)
            .ok_or_else(|| FrameError::Fatal(format!("unknown mesh handle {}", mesh.index())))?;
        frame.draws.push(DrawCall {
            program,
            mesh,
            index_count: index_count.min(available),
            uniforms,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), FrameError> {
        let Some(pending) = self.frame.take() else {
            return Ok(());
        };
        self.check_device()?;
        let surface_texture = self.acquire_frame()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let device = &self.context.device;

        let (width, height) = (self.context.size.width, self.context.size.height);
        // Each draw is submitted on its own so the uniform write queued for it
        // lands before its pass and after the previous one.
        for pass in plan_passes(&pending) {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("horizon frame encoder"),
            });
            if let Some(draw) = pass.draw {
                self.context
                    .queue
                    .write_buffer(&self.uniform_buffer, 0, draw.uniforms.as_bytes());
            }
            {
                let mut render_pass = begin_pass(&mut encoder, &view, pass.load);
                if let Some(draw) = pass.draw {
                    let program = &self.programs[draw.program.index()];
                    let mesh = &self.meshes[draw.mesh.index()];
                    render_pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
                    render_pass.set_pipeline(&program.pipeline);
                    render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
                    render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    render_pass
                        .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                    render_pass.draw_indexed(0..draw.index_count, 0, 0..1);
                }
            }
            self.context.queue.submit(std::iter::once(encoder.finish()));
        }

        self.window.pre_present_notify();
        surface_texture.present();
        Ok(())
    }
}

/// One render pass of a frame: the first clears, later ones load.
#[derive(Debug, Clone, Copy)]
struct PlannedPass {
    load: wgpu::LoadOp<wgpu::Color>,
    draw: Option<DrawCall>,
}

fn plan_passes(frame: &PendingFrame) -> Vec<PlannedPass> {
    if frame.draws.is_empty() {
        // Still honour the clear when nothing was drawn.
        return vec![PlannedPass {
            load: wgpu::LoadOp::Clear(frame.clear),
            draw: None,
        }];
    }
    frame
        .draws
        .iter()
        .enumerate()
        .map(|(index, draw)| PlannedPass {
            load: if index == 0 {
                wgpu::LoadOp::Clear(frame.clear)
            } else {
                wgpu::LoadOp::Load
            },
            draw: Some(*draw),
        })
        .collect()
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("horizon pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw_at(time: f32) -> DrawCall {
        let mut uniforms = SceneUniforms::new(64, 32);
        uniforms.set_float("u_time", time);
        DrawCall {
            program: ProgramHandle::new(0),
            mesh: MeshHandle::new(0),
            index_count: 6,
            uniforms,
        }
    }

    fn frame(draws: Vec<DrawCall>) -> PendingFrame {
        PendingFrame {
            clear: wgpu::Color::RED,
            program: Some(ProgramHandle::new(0)),
            draws,
        }
    }

    #[test]
    fn empty_frame_still_clears() {
        let passes = plan_passes(&frame(Vec::new()));
        assert_eq!(passes.len(), 1);
        assert!(matches!(passes[0].load, wgpu::LoadOp::Clear(color) if color == wgpu::Color::RED));
        assert!(passes[0].draw.is_none());
    }

    #[test]
    fn single_draw_clears_and_carries_its_uniforms() {
        let passes = plan_passes(&frame(vec![draw_at(1.5)]));
        assert_eq!(passes.len(), 1);
        assert!(matches!(passes[0].load, wgpu::LoadOp::Clear(_)));
        assert_eq!(passes[0].draw.map(|draw| draw.uniforms.time), Some(1.5));
    }

    #[test]
    fn later_draws_load_and_keep_their_own_uniforms() {
        let passes = plan_passes(&frame(vec![draw_at(1.0), draw_at(2.0)]));
        assert_eq!(passes.len(), 2);
        assert!(matches!(passes[1].load, wgpu::LoadOp::Load));
        let times: Vec<f32> = passes
            .iter()
            .filter_map(|pass| pass.draw.map(|draw| draw.uniforms.time))
            .collect();
        assert_eq!(times, vec![1.0, 2.0]);
    }
}
