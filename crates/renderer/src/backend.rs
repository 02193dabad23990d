//! The graphics-API seam the scene renderer drives.
//!
//! The renderer never talks to `wgpu` (or anything else) directly; it only
//! issues the calls below. [`crate::gpu::WgpuBackend`] draws to a window and
//! [`crate::software::SoftwareBackend`] rasterises on the CPU.

use crate::shaders::ShaderStage;

/// Compiled shader object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub(crate) usize);

/// Linked vertex + fragment program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) usize);

/// Uploaded vertex and index buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub(crate) usize);

impl ShaderHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl ProgramHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl MeshHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Failures a backend can report while producing a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The graphics context is gone; every handle is invalid.
    #[error("graphics context lost")]
    SurfaceLost,
    /// This frame could not be produced but the next one may succeed.
    #[error("frame skipped: {0}")]
    Transient(String),
    #[error("fatal frame error: {0}")]
    Fatal(String),
}

/// Calls the scene renderer needs from a graphics API.
///
/// Setup calls return the driver's diagnostic log on failure. Uniforms are
/// addressed by the names the fragment shader declares.
pub trait GraphicsBackend {
    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String>;

    fn link(&mut self, vertex: ShaderHandle, fragment: ShaderHandle)
        -> Result<ProgramHandle, String>;

    fn validate(&mut self, program: ProgramHandle) -> Result<(), String>;

    /// Uploads positions (three floats per vertex) and a triangle index list.
    fn upload_mesh(&mut self, vertices: &[[f32; 3]], indices: &[u16])
        -> Result<MeshHandle, String>;

    /// Resizes the drawable surface to `width` x `height` and sets the viewport to cover it.
    fn begin_frame(&mut self, width: u32, height: u32) -> Result<(), FrameError>;

    fn clear(&mut self, color: [f32; 4]);

    fn use_program(&mut self, program: ProgramHandle);

    fn set_uniform_2f(&mut self, name: &str, x: f32, y: f32);

    fn set_uniform_1f(&mut self, name: &str, x: f32);

    fn draw_indexed_triangles(&mut self, mesh: MeshHandle, index_count: u32)
        -> Result<(), FrameError>;

    /// Finishes the frame (presents it when there is a surface).
    fn end_frame(&mut self) -> Result<(), FrameError>;
}
