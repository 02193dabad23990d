//! CPU backend that rasterises the scene into an RGBA image.
//!
//! Shader sources still go through the naga front-end so compile, link and
//! validate fail exactly where the GPU path would. Fragments are evaluated
//! with [`crate::scene::shade`] instead of executing the GLSL.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use tracing::{debug, trace};

use crate::backend::{FrameError, GraphicsBackend, MeshHandle, ProgramHandle, ShaderHandle};
use crate::scene::{self, Vec2, Vec3};
use crate::shaders::{self, CompiledShader, ShaderStage};
use crate::state::{RESOLUTION_UNIFORM, TIME_UNIFORM};

#[derive(Debug, Clone, Copy, PartialEq)]
enum UniformValue {
    Float(f32),
    Vec2(f32, f32),
}

#[derive(Debug, Clone, Copy)]
struct Program {
    vertex: usize,
    fragment: usize,
}

#[derive(Debug, Clone)]
struct Mesh {
    vertices: Vec<[f32; 3]>,
    indices: Vec<u16>,
}

/// Headless [`GraphicsBackend`] used for still exports and tests.
#[derive(Debug)]
pub struct SoftwareBackend {
    shaders: Vec<CompiledShader>,
    programs: Vec<Program>,
    meshes: Vec<Mesh>,
    uniforms: HashMap<String, UniformValue>,
    current_program: Option<ProgramHandle>,
    target: RgbaImage,
    viewport: Option<(u32, u32)>,
    draw_calls: u64,
    frames_drawn: u64,
    fragments_shaded: u64,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self {
            shaders: Vec::new(),
            programs: Vec::new(),
            meshes: Vec::new(),
            uniforms: HashMap::new(),
            current_program: None,
            target: RgbaImage::new(0, 0),
            viewport: None,
            draw_calls: 0,
            frames_drawn: 0,
            fragments_shaded: 0,
        }
    }
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frame buffer, top row first.
    pub fn image(&self) -> &RgbaImage {
        &self.target
    }

    pub fn into_image(self) -> RgbaImage {
        self.target
    }

    /// Size used by the most recent `begin_frame`.
    pub fn viewport(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Fragments written by every draw so far, counting overdraw.
    pub fn fragments_shaded(&self) -> u64 {
        self.fragments_shaded
    }

    fn uniform_vec2(&self, name: &str) -> Result<(f32, f32), FrameError> {
        match self.uniforms.get(name) {
            Some(UniformValue::Vec2(x, y)) => Ok((*x, *y)),
            Some(other) => Err(FrameError::Fatal(format!(
                "uniform `{name}` holds {other:?}, expected vec2"
            ))),
            None => Err(FrameError::Fatal(format!("uniform `{name}` was never set"))),
        }
    }

    fn uniform_float(&self, name: &str) -> Result<f32, FrameError> {
        match self.uniforms.get(name) {
            Some(UniformValue::Float(value)) => Ok(*value),
            Some(other) => Err(FrameError::Fatal(format!(
                "uniform `{name}` holds {other:?}, expected float"
            ))),
            None => Err(FrameError::Fatal(format!("uniform `{name}` was never set"))),
        }
    }
}

/// Rasterises one triangle into `target` and returns how many fragments it shaded.
///
/// Coverage is tested at pixel centres. A centre lying exactly on an edge
/// belongs to the triangle only when that edge is a top or left edge, so
/// triangles sharing an edge never shade the same pixel twice.
fn rasterise_triangle(
    target: &mut RgbaImage,
    corners: [[f32; 3]; 3],
    resolution: (f32, f32),
    time: f32,
) -> u64 {
    let (width, height) = target.dimensions();
    if width == 0 || height == 0 {
        return 0;
    }

    // NDC to window coordinates, y growing upwards.
    let to_window = |vertex: [f32; 3]| {
        Vec2::new(
            (vertex[0] + 1.0) * 0.5 * width as f32,
            (vertex[1] + 1.0) * 0.5 * height as f32,
        )
    };
    let [a, mut b, mut c] = corners.map(to_window);

    let area = edge(a, b, c);
    if area == 0.0 {
        return 0;
    }
    // Counter-clockwise from here on, so the interior is left of every edge.
    if area < 0.0 {
        std::mem::swap(&mut b, &mut c);
    }
    let owns = [is_top_left(b, c), is_top_left(c, a), is_top_left(a, b)];

    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
    let max_x = (a.x.max(b.x).max(c.x).ceil() as u32).min(width);
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
    let max_y = (a.y.max(b.y).max(c.y).ceil() as u32).min(height);

    let mut shaded = 0;
    for iy in min_y..max_y {
        let frag_y = iy as f32 + 0.5;
        let row = height - 1 - iy;
        for ix in min_x..max_x {
            let frag = Vec2::new(ix as f32 + 0.5, frag_y);
            let weights = [edge(b, c, frag), edge(c, a, frag), edge(a, b, frag)];
            let covered = weights
                .iter()
                .zip(owns)
                .all(|(&weight, owned)| weight > 0.0 || (weight == 0.0 && owned));
            if !covered {
                continue;
            }

            let uv = Vec2::new(frag.x / resolution.0, frag.y / resolution.1);
            let color = scene::shade(uv, time, resolution.0);
            target.put_pixel(ix, row, Rgba(color.to_rgba8()));
            shaded += 1;
        }
    }
    shaded
}

/// Twice the signed area of `(a, b, p)`; positive when `p` is left of `a -> b`.
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Top-left rule for a counter-clockwise edge in y-up window space: left
/// edges run downwards, top edges are horizontal and run leftwards.
fn is_top_left(from: Vec2, to: Vec2) -> bool {
    let dy = to.y - from.y;
    let dx = to.x - from.x;
    dy < 0.0 || (dy == 0.0 && dx < 0.0)
}

impl GraphicsBackend for SoftwareBackend {
    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String> {
        let shader = shaders::compile_glsl(stage, source)?;
        self.shaders.push(shader);
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
        shaders::check_interface(vertex_shader, fragment_shader)?;

        self.programs.push(Program {
            vertex: vertex.index(),
            fragment: fragment.index(),
        });
        Ok(ProgramHandle::new(self.programs.len() - 1))
    }

    fn validate(&mut self, program: ProgramHandle) -> Result<(), String> {
        let program = self
            .programs
            .get(program.index())
            .ok_or_else(|| format!("unknown program handle {}", program.index()))?;
        shaders::validate_module(&self.shaders[program.vertex])?;
        shaders::validate_module(&self.shaders[program.fragment])
    }

    fn upload_mesh(
        &mut self,
        vertices: &[[f32; 3]],
        indices: &[u16],
    ) -> Result<MeshHandle, String> {
        if indices.len() % 3 != 0 {
            return Err(format!(
                "index count {} is not a whole number of triangles",
                indices.len()
            ));
        }
        if let Some(&bad) = indices.iter().find(|&&index| index as usize >= vertices.len()) {
            return Err(format!(
                "index {bad} out of range for {} vertices",
                vertices.len()
            ));
        }
        self.meshes.push(Mesh {
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
        });
        Ok(MeshHandle::new(self.meshes.len() - 1))
    }

    fn begin_frame(&mut self, width: u32, height: u32) -> Result<(), FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Transient(format!(
                "zero-sized surface {width}x{height}"
            )));
        }
        if self.target.dimensions() != (width, height) {
            debug!(width, height, "resizing software frame buffer");
            self.target = RgbaImage::new(width, height);
        }
        self.viewport = Some((width, height));
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) {
        let [r, g, b, _] = Vec3::new(color[0], color[1], color[2]).to_rgba8();
        let alpha = (color[3].clamp(0.0, 1.0) * 255.0).round() as u8;
        for pixel in self.target.pixels_mut() {
            *pixel = Rgba([r, g, b, alpha]);
        }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
    }

    fn set_uniform_2f(&mut self, name: &str, x: f32, y: f32) {
        self.uniforms
            .insert(name.to_owned(), UniformValue::Vec2(x, y));
    }

    fn set_uniform_1f(&mut self, name: &str, x: f32) {
        self.uniforms.insert(name.to_owned(), UniformValue::Float(x));
    }

    fn draw_indexed_triangles(
        &mut self,
        mesh: MeshHandle,
        index_count: u32,
    ) -> Result<(), FrameError> {
        let program = self
            .current_program
            .ok_or_else(|| FrameError::Fatal("draw issued without a bound program".into()))?;
        if program.index() >= self.programs.len() {
            return Err(FrameError::Fatal(format!(
                "unknown program handle {}",
                program.index()
            )));
        }
        let resolution = self.uniform_vec2(RESOLUTION_UNIFORM)?;
        let time = self.uniform_float(TIME_UNIFORM)?;

        let mesh = self
            .meshes
            .get(mesh.index())
            .ok_or_else(|| FrameError::Fatal(format!("unknown mesh handle {}", mesh.index())))?;
        let count = (index_count as usize).min(mesh.indices.len());
        for triangle in mesh.indices[..count].chunks_exact(3) {
            let corners = [
                mesh.vertices[triangle[0] as usize],
                mesh.vertices[triangle[1] as usize],
                mesh.vertices[triangle[2] as usize],
            ];
            self.fragments_shaded +=
                rasterise_triangle(&mut self.target, corners, resolution, time);
        }

        self.draw_calls += 1;
        trace!(draw_calls = self.draw_calls, time, "software draw");
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), FrameError> {
        self.frames_drawn += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::FrameContext;
    use crate::state::{SceneRenderer, CLEAR_COLOR};

    fn rendered(width: u32, height: u32, time: f32) -> RgbaImage {
        let mut renderer = SceneRenderer::new(SoftwareBackend::new());
        renderer.setup().expect("setup");
        renderer
            .render_frame(FrameContext::new(width, height, time))
            .expect("frame");
        renderer.into_backend().into_image()
    }

    #[test]
    fn quad_covers_every_pixel() {
        let image = rendered(16, 9, 2.0);
        let frame = FrameContext::new(16, 9, 2.0);
        for (x, y, pixel) in image.enumerate_pixels() {
            let frag_y = (9 - 1 - y) as f32 + 0.5;
            let expected = scene::shade_pixel(x as f32 + 0.5, frag_y, &frame).to_rgba8();
            assert_eq!(pixel.0, expected, "pixel ({x}, {y})");
            assert_eq!(pixel.0[3], 255);
        }
    }

    #[test]
    fn shared_diagonal_is_shaded_once() {
        for (width, height) in [(8, 8), (16, 9), (5, 7)] {
            let mut renderer = SceneRenderer::new(SoftwareBackend::new());
            renderer.setup().expect("setup");
            renderer
                .render_frame(FrameContext::new(width, height, 0.5))
                .expect("frame");
            assert_eq!(
                renderer.backend().fragments_shaded(),
                u64::from(width * height),
                "{width}x{height}"
            );
        }
    }

    #[test]
    fn top_left_rule_splits_edge_pixels() {
        // Both triangles meet on the diagonal of a 4x4 target, crossing four pixel centres.
        let mut target = RgbaImage::new(4, 4);
        let lower = rasterise_triangle(
            &mut target,
            [[1.0, 1.0, 0.0], [1.0, -1.0, 0.0], [-1.0, -1.0, 0.0]],
            (4.0, 4.0),
            0.0,
        );
        let upper = rasterise_triangle(
            &mut target,
            [[1.0, 1.0, 0.0], [-1.0, -1.0, 0.0], [-1.0, 1.0, 0.0]],
            (4.0, 4.0),
            0.0,
        );
        assert_eq!(lower + upper, 16);
        assert_eq!(lower, 10);
        assert_eq!(upper, 6);
    }

    #[test]
    fn clear_fills_the_buffer() {
        let mut backend = SoftwareBackend::new();
        backend.begin_frame(3, 2).unwrap();
        backend.clear(CLEAR_COLOR);
        let expected = Vec3::new(CLEAR_COLOR[0], CLEAR_COLOR[1], CLEAR_COLOR[2]).to_rgba8();
        assert!(backend.image().pixels().all(|pixel| pixel.0 == expected));
        assert_eq!(backend.viewport(), Some((3, 2)));
    }

    #[test]
    fn bottom_rows_show_the_hills() {
        let frame = FrameContext::new(20, 20, 0.0);
        let image = rendered(20, 20, 0.0);
        // Image rows run top-down, so row 19 is the fragment row at y = 0.5.
        let expected = scene::shade_pixel(10.5, 0.5, &frame).to_rgba8();
        assert_eq!(image.get_pixel(10, 19).0, expected);
    }

    #[test]
    fn draw_without_uniforms_is_fatal() {
        let mut backend = SoftwareBackend::new();
        let vertex = backend
            .compile(ShaderStage::Vertex, shaders::VERTEX_SHADER_GLSL)
            .unwrap();
        let fragment = backend
            .compile(ShaderStage::Fragment, shaders::FRAGMENT_SHADER_GLSL)
            .unwrap();
        let program = backend.link(vertex, fragment).unwrap();
        let mesh = backend
            .upload_mesh(&crate::mesh::QUAD_VERTICES, &crate::mesh::QUAD_INDICES)
            .unwrap();
        backend.begin_frame(4, 4).unwrap();
        backend.use_program(program);
        let err = backend.draw_indexed_triangles(mesh, 6).unwrap_err();
        assert!(matches!(err, FrameError::Fatal(_)));
        assert_eq!(backend.draw_calls(), 0);
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut backend = SoftwareBackend::new();
        let err = backend
            .upload_mesh(&[[0.0, 0.0, 0.0]], &[0, 1, 2])
            .unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn zero_sized_frames_are_skipped() {
        let mut backend = SoftwareBackend::new();
        assert!(matches!(
            backend.begin_frame(0, 10),
            Err(FrameError::Transient(_))
        ));
    }
}
