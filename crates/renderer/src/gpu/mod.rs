//! wgpu implementation of the graphics backend.
//!
//! - `context` owns instance/device/surface wiring and reconfigures the
//!   swapchain when the window resizes.
//! - `uniforms` mirrors the shader's std140 uniform block and routes
//!   by-name uniform writes into it.
//! - `backend` records each frame's calls and encodes them into render
//!   passes when the frame ends.

mod backend;
mod context;
mod uniforms;

pub use backend::WgpuBackend;
pub use uniforms::SceneUniforms;
