use bytemuck::{Pod, Zeroable};
use tracing::warn;

use crate::state::{RESOLUTION_UNIFORM, TIME_UNIFORM};

/// std140 mirror of the `SceneParams` block in `FRAGMENT_SHADER_GLSL`.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub padding0: f32,
}

unsafe impl Zeroable for SceneUniforms {}
unsafe impl Pod for SceneUniforms {}

impl SceneUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: [width as f32, height as f32],
            time: 0.0,
            padding0: 0.0,
        }
    }

    /// Applies a `vec2` uniform by shader name; returns false for unknown names.
    pub fn set_vec2(&mut self, name: &str, x: f32, y: f32) -> bool {
        match name {
            RESOLUTION_UNIFORM => {
                self.resolution = [x, y];
                true
            }
            _ => {
                warn!(uniform = name, "ignoring unknown vec2 uniform");
                false
            }
        }
    }

    /// Applies a `float` uniform by shader name; returns false for unknown names.
    pub fn set_float(&mut self, name: &str, value: f32) -> bool {
        match name {
            TIME_UNIFORM => {
                self.time = value;
                true
            }
            _ => {
                warn!(uniform = name, "ignoring unknown float uniform");
                false
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
