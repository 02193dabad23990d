use tracing::{debug, error, info, warn};

use crate::backend::{FrameError, GraphicsBackend, MeshHandle, ProgramHandle, ShaderHandle};
use crate::mesh::QuadMesh;
use crate::scene::FrameContext;
use crate::shaders::{ShaderSources, ShaderStage};

/// Colour the frame buffer is cleared to before the quad is drawn.
pub const CLEAR_COLOR: [f32; 4] = [0.75, 0.85, 0.8, 1.0];

pub const RESOLUTION_UNIFORM: &str = "u_resolution";
pub const TIME_UNIFORM: &str = "u_time";

/// Terminal failures of the one-time setup sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error("failed to compile {stage} shader: {log}")]
    ShaderCompileFailed { stage: ShaderStage, log: String },
    #[error("failed to link shader program: {0}")]
    ProgramLinkFailed(String),
    #[error("failed to validate shader program: {0}")]
    ProgramValidateFailed(String),
    #[error("failed to upload quad mesh: {0}")]
    MeshUploadFailed(String),
}

/// Why a frame was not drawn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Setup has not completed (or previously failed); nothing was drawn.
    #[error("renderer is not ready (phase: {0:?})")]
    NotReady(RendererPhase),
    /// The graphics context was lost; the renderer is back to `Uninitialized`.
    #[error("graphics context lost; setup must run again")]
    ContextLost,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Lifecycle of a [`SceneRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererPhase {
    Uninitialized,
    Ready,
    Failed,
}

/// Outcome of a successful [`SceneRenderer::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The backend asked to skip this frame; the next one should succeed.
    Skipped,
}

/// GPU objects created once by setup and reused by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneResources {
    pub program: ProgramHandle,
    pub mesh: MeshHandle,
    pub index_count: u32,
}

enum Phase {
    Uninitialized,
    Ready(SceneResources),
    Failed(SetupError),
}

/// Drives a [`GraphicsBackend`] through setup and the per-frame draw.
pub struct SceneRenderer<B> {
    backend: B,
    sources: ShaderSources,
    phase: Phase,
    frames_drawn: u64,
}

impl<B: GraphicsBackend> SceneRenderer<B> {
    /// Creates an uninitialised renderer for the bundled horizon shaders.
    pub fn new(backend: B) -> Self {
        Self::with_sources(backend, ShaderSources::default())
    }

    pub fn with_sources(backend: B, sources: ShaderSources) -> Self {
        Self {
            backend,
            sources,
            phase: Phase::Uninitialized,
            frames_drawn: 0,
        }
    }

    pub fn phase(&self) -> RendererPhase {
        match self.phase {
            Phase::Uninitialized => RendererPhase::Uninitialized,
            Phase::Ready(_) => RendererPhase::Ready,
            Phase::Failed(_) => RendererPhase::Failed,
        }
    }

    pub fn resources(&self) -> Option<&SceneResources> {
        match &self.phase {
            Phase::Ready(resources) => Some(resources),
            _ => None,
        }
    }

    pub fn setup_error(&self) -> Option<&SetupError> {
        match &self.phase {
            Phase::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Compiles, links, and validates the program and uploads the quad.
    ///
    /// Runs once; a renderer that is already ready returns immediately and a
    /// failed renderer reports its original error without retrying.
    pub fn setup(&mut self) -> Result<(), SetupError> {
        match &self.phase {
            Phase::Ready(_) => return Ok(()),
            Phase::Failed(err) => return Err(err.clone()),
            Phase::Uninitialized => {}
        }

        match self.build_resources() {
            Ok(resources) => {
                info!(
                    program = resources.program.index(),
                    mesh = resources.mesh.index(),
                    "scene renderer ready"
                );
                self.phase = Phase::Ready(resources);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "scene renderer setup failed");
                self.phase = Phase::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn build_resources(&mut self) -> Result<SceneResources, SetupError> {
        let vertex = self.compile_stage(ShaderStage::Vertex)?;
        let fragment = self.compile_stage(ShaderStage::Fragment)?;

        let program = self
            .backend
            .link(vertex, fragment)
            .map_err(SetupError::ProgramLinkFailed)?;
        debug!(program = program.index(), "linked shader program");

        self.backend
            .validate(program)
            .map_err(SetupError::ProgramValidateFailed)?;

        let quad = QuadMesh;
        let mesh = self
            .backend
            .upload_mesh(quad.vertices(), quad.indices())
            .map_err(SetupError::MeshUploadFailed)?;

        Ok(SceneResources {
            program,
            mesh,
            index_count: quad.index_count(),
        })
    }

    fn compile_stage(&mut self, stage: ShaderStage) -> Result<ShaderHandle, SetupError> {
        let handle = self
            .backend
            .compile(stage, self.sources.source(stage))
            .map_err(|log| SetupError::ShaderCompileFailed { stage, log })?;
        debug!(%stage, shader = handle.index(), "compiled shader");
        Ok(handle)
    }

    /// Draws one frame at the size and time carried by `frame`.
    pub fn render_frame(&mut self, frame: FrameContext) -> Result<FrameStatus, RenderError> {
        let resources = match &self.phase {
            Phase::Ready(resources) => *resources,
            _ => return Err(RenderError::NotReady(self.phase())),
        };

        match self.draw(&resources, &frame) {
            Ok(()) => {
                self.frames_drawn = self.frames_drawn.saturating_add(1);
                Ok(FrameStatus::Presented)
            }
            Err(FrameError::Transient(reason)) => {
                warn!(%reason, "skipping frame");
                Ok(FrameStatus::Skipped)
            }
            Err(FrameError::SurfaceLost) => {
                warn!("graphics context lost; dropping scene resources");
                self.phase = Phase::Uninitialized;
                Err(RenderError::ContextLost)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn draw(&mut self, resources: &SceneResources, frame: &FrameContext) -> Result<(), FrameError> {
        let backend = &mut self.backend;
        backend.begin_frame(frame.width, frame.height)?;
        backend.clear(CLEAR_COLOR);
        backend.use_program(resources.program);
        backend.set_uniform_2f(RESOLUTION_UNIFORM, frame.width as f32, frame.height as f32);
        backend.set_uniform_1f(TIME_UNIFORM, frame.elapsed_seconds);
        backend.draw_indexed_triangles(resources.mesh, resources.index_count)?;
        backend.end_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::SoftwareBackend;

    #[test]
    fn setup_moves_to_ready() {
        let mut renderer = SceneRenderer::new(SoftwareBackend::new());
        assert_eq!(renderer.phase(), RendererPhase::Uninitialized);
        renderer.setup().expect("setup");
        assert_eq!(renderer.phase(), RendererPhase::Ready);
        assert_eq!(renderer.resources().map(|r| r.index_count), Some(6));
    }

    #[test]
    fn render_before_setup_is_rejected() {
        let mut renderer = SceneRenderer::new(SoftwareBackend::new());
        let err = renderer
            .render_frame(FrameContext::new(4, 4, 0.0))
            .unwrap_err();
        assert_eq!(err, RenderError::NotReady(RendererPhase::Uninitialized));
        assert_eq!(renderer.backend().frames_drawn(), 0);
    }

    #[test]
    fn failed_setup_is_sticky() {
        let sources = ShaderSources::new("#version 450\nthis is not glsl", "");
        let mut renderer = SceneRenderer::with_sources(SoftwareBackend::new(), sources);
        let first = renderer.setup().unwrap_err();
        assert!(matches!(
            first,
            SetupError::ShaderCompileFailed {
                stage: ShaderStage::Vertex,
                ..
            }
        ));
        assert_eq!(renderer.phase(), RendererPhase::Failed);
        assert_eq!(renderer.setup().unwrap_err(), first);
        assert_eq!(renderer.setup_error(), Some(&first));
    }

    #[test]
    fn frames_are_counted() {
        let mut renderer = SceneRenderer::new(SoftwareBackend::new());
        renderer.setup().unwrap();
        for step in 0..3 {
            let status = renderer
                .render_frame(FrameContext::new(8, 6, step as f32 * 0.5))
                .unwrap();
            assert_eq!(status, FrameStatus::Presented);
        }
        assert_eq!(renderer.frames_drawn(), 3);
    }
}
