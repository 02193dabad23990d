//! Renderer crate for Horizon, an animated sun/moon/horizon scene.
//!
//! A single vertex + fragment shader pair is drawn over a static full-screen
//! quad once per display refresh. The flow is:
//!
//! ```text
//!   horizon CLI
//!          │ RendererConfig
//!          ▼
//!   run_window ──▶ winit event loop ──▶ SceneRenderer::render_frame()
//!                                              │
//!                                              └─▶ GraphicsBackend (wgpu | software)
//! ```
//!
//! [`SceneRenderer`] owns the one-time setup (compile, link, validate, upload
//! the quad) and the per-frame contract (viewport, clear, two uniforms, one
//! indexed draw). It only talks to the graphics API through the
//! [`GraphicsBackend`] trait. [`scene::shade`] is the CPU twin of the fragment
//! shader and backs the software renderer used for still exports.

pub mod backend;
mod export;
mod gpu;
pub mod mesh;
mod runtime;
pub mod scene;
pub mod shaders;
pub mod software;
mod state;
mod types;
mod window;

pub use backend::{FrameError, GraphicsBackend, MeshHandle, ProgramHandle, ShaderHandle};
pub use export::{export_still, render_still, StillRequest};
pub use gpu::{SceneUniforms, WgpuBackend};
pub use runtime::{
    time_source_for_policy, BoxedTimeSource, FixedTimeSource, RenderPolicy, SystemTimeSource,
    TimeSample, TimeSource,
};
pub use scene::FrameContext;
pub use shaders::{ShaderSources, ShaderStage};
pub use software::SoftwareBackend;
pub use state::{
    FrameStatus, RenderError, RendererPhase, SceneRenderer, SceneResources, SetupError,
    CLEAR_COLOR, RESOLUTION_UNIFORM, TIME_UNIFORM,
};
pub use types::{parse_surface_size, PowerPreference, RendererConfig};
pub use window::run_window;
