//! CPU evaluation of the sun/moon/horizon pixel function.
//!
//! [`shade`] mirrors `FRAGMENT_SHADER_GLSL` operation for operation so the
//! software backend, still exports, and tests agree with what the GPU draws.
//! Everything here is pure: no clocks, no globals, no allocation.

mod math;

pub use math::{mix, smoothstep, step, Vec2, Vec3};

/// RGB colour; channels are unbounded until [`Color::to_rgba8`] clamps them.
pub type Color = Vec3;

/// Time multiplier applied before computing orbital positions.
pub const TIME_SCALE: f32 = 0.6;
/// Phase offset between sun and moon, as written in the fragment shader.
#[allow(clippy::approx_constant)]
pub const MOON_PHASE: f32 = 3.14;
pub const SUN_RADIUS: f32 = 0.1;
pub const NUM_RAYS: f32 = 36.0;
pub const RAYS_RADIUS: f32 = 0.6;
pub const MOON_RADIUS: f32 = 0.1;
/// Width of the sun edge ramp, in pixels, before normalising by the surface width.
pub const SUN_EDGE_PIXELS: f32 = 100.0;

pub const SUN_COLOR: Color = Vec3::new(0.9, 0.8, 0.1);
pub const SKY_TINT: Vec3 = Vec3::new(0.0, 0.1, 0.8);
pub const MOON_TINT: Vec3 = Vec3::new(0.8, 0.8, 1.0);
pub const HILL_TINT: Vec3 = Vec3::new(0.1, 0.9, 0.4);

/// Per-frame inputs shared by every pixel of a draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Drawable width in physical pixels.
    pub width: u32,
    /// Drawable height in physical pixels.
    pub height: u32,
    /// Seconds since the animation started.
    pub elapsed_seconds: f32,
}

impl FrameContext {
    pub fn new(width: u32, height: u32, elapsed_seconds: f32) -> Self {
        Self {
            width,
            height,
            elapsed_seconds,
        }
    }

    /// Normalised coordinate of a fragment (bottom-left origin, no aspect correction).
    pub fn uv(&self, frag_x: f32, frag_y: f32) -> Vec2 {
        Vec2::new(frag_x / self.width as f32, frag_y / self.height as f32)
    }
}

/// Intermediate terms of a single evaluation, exposed for inspection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadeLayers {
    pub sun_pos: Vec2,
    pub moon_pos: Vec2,
    pub background: Color,
    pub moon_color: Color,
    pub foreground: Color,
    pub sun_distance: f32,
    pub moon_distance: f32,
    /// Sun and moon composited over the sky.
    pub sky: Color,
    /// 1.0 where the sky shows through the hills, 0.0 where the hills cover it.
    pub horizon_mask: f32,
    pub color: Color,
}

/// Positions of the sun and moon at time `t`, in uv space.
pub fn orbit_positions(t: f32) -> (Vec2, Vec2) {
    let slowed_time = t * TIME_SCALE;
    let sun_pos = Vec2::new(
        (slowed_time.sin() + 1.0) * 0.5,
        (slowed_time.cos() + 1.0) - 1.0,
    );
    let moon_pos = Vec2::new(
        ((slowed_time + MOON_PHASE).sin() + 1.0) * 0.5,
        ((slowed_time + MOON_PHASE).cos() + 1.0) - 1.0,
    );
    (sun_pos, moon_pos)
}

/// Distance to a disc of `radius` that grows into `rays_radius` long rays
/// wherever `sin(angle * num_rays)` is non-positive.
pub fn sun_rays_distance(p: Vec2, radius: f32, num_rays: f32, rays_radius: f32) -> f32 {
    p.length() - radius.max(rays_radius * step((p.y.atan2(p.x) * num_rays).sin(), 0.0))
}

/// Evaluates the scene at `uv` and returns every intermediate term.
pub fn shade_layers(uv: Vec2, t: f32, width_px: f32) -> ShadeLayers {
    let (sun_pos, moon_pos) = orbit_positions(t);

    let background = SKY_TINT * uv.y * sun_pos.y + 0.2;
    let moon_color = MOON_TINT * (1.8 - uv.y);
    let foreground = HILL_TINT * 3.0 * uv.y * sun_pos.y + 0.3;

    let p = uv - sun_pos;
    let sun_distance = sun_rays_distance(p, SUN_RADIUS, NUM_RAYS, RAYS_RADIUS);
    let mut sky = mix(
        SUN_COLOR,
        background,
        smoothstep(0.0, SUN_EDGE_PIXELS / width_px, sun_distance),
    );

    let moon_distance = (uv - moon_pos).length();
    sky = mix(sky, moon_color, step(moon_distance, MOON_RADIUS));

    let horizon_mask = step(0.6, ((t + uv.x * 10.0).sin() + 4.0) * uv.y);
    let color = mix(foreground, sky, horizon_mask);

    ShadeLayers {
        sun_pos,
        moon_pos,
        background,
        moon_color,
        foreground,
        sun_distance,
        moon_distance,
        sky,
        horizon_mask,
        color,
    }
}

/// Colour of the scene at `uv` for time `t` on a surface `width_px` wide.
pub fn shade(uv: Vec2, t: f32, width_px: f32) -> Color {
    shade_layers(uv, t, width_px).color
}

/// Colour of the fragment whose centre sits at `(frag_x, frag_y)` (bottom-left origin).
pub fn shade_pixel(frag_x: f32, frag_y: f32, frame: &FrameContext) -> Color {
    shade(
        frame.uv(frag_x, frag_y),
        frame.elapsed_seconds,
        frame.width as f32,
    )
}

impl Color {
    /// Clamps to [0, 1] and quantises to an opaque RGBA8 pixel.
    pub fn to_rgba8(self) -> [u8; 4] {
        let quantise = |channel: f32| (channel.clamp(0.0, 1.0) * 255.0).round() as u8;
        [quantise(self.x), quantise(self.y), quantise(self.z), 255]
    }
}
