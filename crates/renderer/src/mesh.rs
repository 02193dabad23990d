//! The static full-screen quad every frame is drawn with.

/// Clip-space corners: top-left, bottom-left, bottom-right, top-right.
pub const QUAD_VERTICES: [[f32; 3]; 4] = [
    [-1.0, 1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
];

/// Two triangles covering the quad.
pub const QUAD_INDICES: [u16; 6] = [3, 2, 1, 3, 1, 0];

/// Immutable view over the quad's vertex and index data.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadMesh;

impl QuadMesh {
    pub fn vertices(&self) -> &'static [[f32; 3]] {
        &QUAD_VERTICES
    }

    pub fn indices(&self) -> &'static [u16] {
        &QUAD_INDICES
    }

    pub fn index_count(&self) -> u32 {
        QUAD_INDICES.len() as u32
    }

    pub fn vertex_bytes(&self) -> &'static [u8] {
        bytemuck::cast_slice(&QUAD_VERTICES)
    }

    pub fn index_bytes(&self) -> &'static [u8] {
        bytemuck::cast_slice(&QUAD_INDICES)
    }
}
