//! Shader sources for the horizon scene plus the GLSL front-end checks shared
//! by every backend.
//!
//! Sources are written in Vulkan-flavoured GLSL 450 so `wgpu` can consume
//! them through naga. The fragment shader keeps the plain uniform names
//! (`u_resolution`, `u_time`) by aliasing them onto a std140 block whose
//! layout must match [`SceneUniforms`](crate::gpu::SceneUniforms).

use std::collections::BTreeSet;
use std::fmt;

use wgpu::naga;

/// Pipeline stage a shader object is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub(crate) fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// The vertex/fragment pair a renderer compiles during setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    pub fn source(&self, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
        }
    }
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self::new(VERTEX_SHADER_GLSL, FRAGMENT_SHADER_GLSL)
    }
}

/// A shader that made it through the GLSL front-end.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub stage: ShaderStage,
    pub module: naga::Module,
    pub source: String,
}

/// Parses GLSL for `stage`, returning the front-end diagnostics on failure.
pub fn compile_glsl(stage: ShaderStage, source: &str) -> Result<CompiledShader, String> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage.to_naga());
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| errors.emit_to_string(source))?;

    if !module
        .entry_points
        .iter()
        .any(|entry| entry.stage == stage.to_naga())
    {
        return Err(format!("{stage} shader declares no `main` entry point"));
    }

    Ok(CompiledShader {
        stage,
        module,
        source: source.to_owned(),
    })
}

/// Runs the naga validator over a compiled shader.
pub fn validate_module(shader: &CompiledShader) -> Result<(), String> {
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&shader.module)
        .map(|_| ())
        .map_err(|err| err.emit_to_string(&shader.source))
}

/// Link-time interface check between a vertex and a fragment shader.
///
/// Every location the fragment stage reads must be written by the vertex stage.
pub fn check_interface(vertex: &CompiledShader, fragment: &CompiledShader) -> Result<(), String> {
    if vertex.stage != ShaderStage::Vertex {
        return Err(format!("expected a vertex shader, got a {} shader", vertex.stage));
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err(format!(
            "expected a fragment shader, got a {} shader",
            fragment.stage
        ));
    }

    let written = stage_outputs(&vertex.module, naga::ShaderStage::Vertex);
    let read = stage_inputs(&fragment.module, naga::ShaderStage::Fragment);
    let missing: Vec<String> = read
        .difference(&written)
        .map(|location| location.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(format!(
            "fragment shader reads location(s) {} that the vertex shader never writes",
            missing.join(", ")
        ));
    }
    Ok(())
}

fn entry_point(module: &naga::Module, stage: naga::ShaderStage) -> Option<&naga::EntryPoint> {
    module.entry_points.iter().find(|entry| entry.stage == stage)
}

fn binding_location(binding: Option<&naga::Binding>) -> Option<u32> {
    match binding {
        Some(naga::Binding::Location { location, .. }) => Some(*location),
        _ => None,
    }
}

fn type_locations(module: &naga::Module, ty: naga::Handle<naga::Type>, into: &mut BTreeSet<u32>) {
    if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
        into.extend(
            members
                .iter()
                .filter_map(|member| binding_location(member.binding.as_ref())),
        );
    }
}

fn stage_inputs(module: &naga::Module, stage: naga::ShaderStage) -> BTreeSet<u32> {
    let mut locations = BTreeSet::new();
    if let Some(entry) = entry_point(module, stage) {
        for argument in &entry.function.arguments {
            match binding_location(argument.binding.as_ref()) {
                Some(location) => {
                    locations.insert(location);
                }
                None => type_locations(module, argument.ty, &mut locations),
            }
        }
    }
    locations
}

fn stage_outputs(module: &naga::Module, stage: naga::ShaderStage) -> BTreeSet<u32> {
    let mut locations = BTreeSet::new();
    if let Some(result) = entry_point(module, stage).and_then(|entry| entry.function.result.as_ref())
    {
        match binding_location(result.binding.as_ref()) {
            Some(location) => {
                locations.insert(location);
            }
            None => type_locations(module, result.ty, &mut locations),
        }
    }
    locations
}

/// Passes the quad's clip-space positions straight through.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec3 vertPosition;

void main() {
    gl_Position = vec4(vertPosition, 1.0);
}
";

/// GPU twin of [`crate::scene::shade`].
pub const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform SceneParams {
    vec2 _resolution;
    float _time;
    float _padding0;
} ubo;

#define u_resolution ubo._resolution
#define u_time ubo._time

float sdSunRays(vec2 p, float radius, float num_rays, float rays_radius) {
    return length(p) - max(radius, rays_radius * step(sin(atan(p.y, p.x) * num_rays), 0.0));
}

void main() {
    // Vulkan puts the fragment origin top-left; the scene expects bottom-left.
    vec2 fragCoord = vec2(gl_FragCoord.x, u_resolution.y - gl_FragCoord.y);
    vec2 uv = fragCoord / u_resolution;

    float slowed_time = u_time * 0.6;

    vec2 sun_pos = vec2(
        (sin(slowed_time) + 1.0) * 0.5,
        (cos(slowed_time) + 1.0) - 1.0
    );
    vec2 moon_pos = vec2(
        (sin(slowed_time + 3.14) + 1.0) * 0.5,
        (cos(slowed_time + 3.14) + 1.0) - 1.0
    );

    float sun_radius = 0.1;
    float num_rays = 36.0;
    float rays_radius = 0.6;

    vec3 background_color = vec3(0.0, 0.1, 0.8) * uv.y * sun_pos.y + 0.2;
    vec3 sun_color = vec3(0.9, 0.8, 0.1);
    vec3 moon_color = vec3(0.8, 0.8, 1.0) * (1.8 - uv.y);
    vec3 foreground_color = vec3(0.1, 0.9, 0.4) * 3.0 * uv.y * sun_pos.y + 0.3;

    vec2 p = uv - sun_pos;

    float d_sun = sdSunRays(p, sun_radius, num_rays, rays_radius);
    vec3 color = mix(sun_color, background_color, smoothstep(0.0, 100.0 / u_resolution.x, d_sun));

    float d_moon = length(uv - moon_pos);
    color = mix(color, moon_color, step(d_moon, 0.1));

    color = mix(foreground_color, color, step(0.6, (sin(u_time + uv.x * 10.0) + 4.0) * uv.y));

    outColor = vec4(color, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene;

    #[test]
    fn bundled_shaders_compile_and_validate() {
        let sources = ShaderSources::default();
        let vertex = compile_glsl(ShaderStage::Vertex, &sources.vertex).expect("vertex");
        let fragment = compile_glsl(ShaderStage::Fragment, &sources.fragment).expect("fragment");
        validate_module(&vertex).expect("vertex validates");
        validate_module(&fragment).expect("fragment validates");
        check_interface(&vertex, &fragment).expect("interface matches");
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = compile_glsl(ShaderStage::Fragment, "#version 450\nvoid main( {\n")
            .expect_err("broken shader must not compile");
        assert!(!err.is_empty());
    }

    fn glsl_vec3(v: scene::Vec3) -> String {
        format!("vec3({:?}, {:?}, {:?})", v.x, v.y, v.z)
    }

    #[test]
    fn fragment_shader_uses_scene_constants() {
        let expected = [
            format!("u_time * {:?}", scene::TIME_SCALE),
            format!("slowed_time + {:?}", scene::MOON_PHASE),
            format!("float sun_radius = {:?};", scene::SUN_RADIUS),
            format!("float num_rays = {:?};", scene::NUM_RAYS),
            format!("float rays_radius = {:?};", scene::RAYS_RADIUS),
            format!("step(d_moon, {:?})", scene::MOON_RADIUS),
            format!("smoothstep(0.0, {:?} / u_resolution.x", scene::SUN_EDGE_PIXELS),
            format!("vec3 sun_color = {};", glsl_vec3(scene::SUN_COLOR)),
            format!("{} * uv.y * sun_pos.y + 0.2", glsl_vec3(scene::SKY_TINT)),
            format!("{} * (1.8 - uv.y)", glsl_vec3(scene::MOON_TINT)),
            format!("{} * 3.0 * uv.y * sun_pos.y + 0.3", glsl_vec3(scene::HILL_TINT)),
        ];
        for snippet in &expected {
            assert!(
                FRAGMENT_SHADER_GLSL.contains(snippet.as_str()),
                "fragment shader is missing `{snippet}`"
            );
        }
    }

    #[test]
    fn link_rejects_swapped_stages() {
        let sources = ShaderSources::default();
        let vertex = compile_glsl(ShaderStage::Vertex, &sources.vertex).unwrap();
        let fragment = compile_glsl(ShaderStage::Fragment, &sources.fragment).unwrap();
        assert!(check_interface(&fragment, &vertex).is_err());
    }

    #[test]
    fn link_rejects_unwritten_varyings() {
        let vertex = compile_glsl(ShaderStage::Vertex, VERTEX_SHADER_GLSL).unwrap();
        let fragment = compile_glsl(
            ShaderStage::Fragment,
            "#version 450\nlayout(location = 3) in vec3 fragColor;\nlayout(location = 0) out vec4 outColor;\nvoid main() { outColor = vec4(fragColor, 1.0); }\n",
        )
        .unwrap();
        let err = check_interface(&vertex, &fragment).unwrap_err();
        assert!(err.contains('3'));
    }
}
