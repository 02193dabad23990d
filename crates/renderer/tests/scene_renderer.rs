use renderer::{
    FrameContext, FrameError, FrameStatus, GraphicsBackend, MeshHandle, ProgramHandle,
    RenderError, RendererPhase, SceneRenderer, SetupError, ShaderHandle, ShaderSources,
    ShaderStage, SoftwareBackend, CLEAR_COLOR,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Compile(ShaderStage),
    Link,
    Validate,
    UploadMesh { vertices: usize, indices: usize },
    BeginFrame(u32, u32),
    Clear([f32; 4]),
    UseProgram,
    Uniform2f(String, f32, f32),
    Uniform1f(String, f32),
    Draw(u32),
    EndFrame,
}

/// Records every call and fails on demand.
#[derive(Default)]
struct SpyBackend {
    calls: Vec<Call>,
    fail_compile: Option<ShaderStage>,
    fail_link: bool,
    fail_validate: bool,
    frame_failures: Vec<FrameError>,
}

impl SpyBackend {
    fn draws(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Draw(_)))
            .count()
    }

    fn viewports(&self) -> Vec<(u32, u32)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::BeginFrame(w, h) => Some((*w, *h)),
                _ => None,
            })
            .collect()
    }
}

impl GraphicsBackend for SpyBackend {
    fn compile(&mut self, stage: ShaderStage, _source: &str) -> Result<ShaderHandle, String> {
        self.calls.push(Call::Compile(stage));
        if self.fail_compile == Some(stage) {
            return Err(format!("0:1: syntax error in {stage} shader"));
        }
        Ok(ShaderHandle::new(self.calls.len()))
    }

    fn link(&mut self, _vertex: ShaderHandle, _fragment: ShaderHandle) -> Result<ProgramHandle, String> {
        self.calls.push(Call::Link);
        if self.fail_link {
            return Err("varying mismatch".into());
        }
        Ok(ProgramHandle::new(1))
    }

    fn validate(&mut self, _program: ProgramHandle) -> Result<(), String> {
        self.calls.push(Call::Validate);
        if self.fail_validate {
            return Err("sampler conflict".into());
        }
        Ok(())
    }

    fn upload_mesh(&mut self, vertices: &[[f32; 3]], indices: &[u16]) -> Result<MeshHandle, String> {
        self.calls.push(Call::UploadMesh {
            vertices: vertices.len(),
            indices: indices.len(),
        });
        Ok(MeshHandle::new(0))
    }

    fn begin_frame(&mut self, width: u32, height: u32) -> Result<(), FrameError> {
        self.calls.push(Call::BeginFrame(width, height));
        match self.frame_failures.pop() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.calls.push(Call::Clear(color));
    }

    fn use_program(&mut self, _program: ProgramHandle) {
        self.calls.push(Call::UseProgram);
    }

    fn set_uniform_2f(&mut self, name: &str, x: f32, y: f32) {
        self.calls.push(Call::Uniform2f(name.to_string(), x, y));
    }

    fn set_uniform_1f(&mut self, name: &str, x: f32) {
        self.calls.push(Call::Uniform1f(name.to_string(), x));
    }

    fn draw_indexed_triangles(&mut self, _mesh: MeshHandle, index_count: u32) -> Result<(), FrameError> {
        self.calls.push(Call::Draw(index_count));
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), FrameError> {
        self.calls.push(Call::EndFrame);
        Ok(())
    }
}

#[test]
fn setup_runs_once_in_order() {
    let mut renderer = SceneRenderer::new(SpyBackend::default());
    renderer.setup().unwrap();
    renderer.setup().unwrap();
    assert_eq!(
        renderer.backend().calls,
        vec![
            Call::Compile(ShaderStage::Vertex),
            Call::Compile(ShaderStage::Fragment),
            Call::Link,
            Call::Validate,
            Call::UploadMesh {
                vertices: 4,
                indices: 6
            },
        ]
    );
}

#[test]
fn frame_issues_the_documented_sequence() {
    let mut renderer = SceneRenderer::new(SpyBackend::default());
    renderer.setup().unwrap();
    renderer.backend_mut().calls.clear();

    let status = renderer
        .render_frame(FrameContext::new(800, 600, 2.5))
        .unwrap();
    assert_eq!(status, FrameStatus::Presented);
    assert_eq!(
        renderer.backend().calls,
        vec![
            Call::BeginFrame(800, 600),
            Call::Clear(CLEAR_COLOR),
            Call::UseProgram,
            Call::Uniform2f("u_resolution".into(), 800.0, 600.0),
            Call::Uniform1f("u_time".into(), 2.5),
            Call::Draw(6),
            Call::EndFrame,
        ]
    );
}

#[test]
fn invalid_shader_never_draws() {
    let sources = ShaderSources::new(
        renderer::shaders::VERTEX_SHADER_GLSL,
        "#version 450\nvoid main( { outColor = ; }\n",
    );
    let mut renderer = SceneRenderer::with_sources(SoftwareBackend::new(), sources);
    let err = renderer.setup().unwrap_err();
    assert!(matches!(
        err,
        SetupError::ShaderCompileFailed {
            stage: ShaderStage::Fragment,
            ..
        }
    ));
    assert_eq!(renderer.phase(), RendererPhase::Failed);

    let frame = renderer.render_frame(FrameContext::new(32, 32, 0.0));
    assert_eq!(frame, Err(RenderError::NotReady(RendererPhase::Failed)));
    assert_eq!(renderer.backend().draw_calls(), 0);
}

#[test]
fn compile_failure_is_reported_through_the_spy() {
    let spy = SpyBackend {
        fail_compile: Some(ShaderStage::Fragment),
        ..SpyBackend::default()
    };
    let mut renderer = SceneRenderer::new(spy);
    let err = renderer.setup().unwrap_err();
    assert_eq!(
        err,
        SetupError::ShaderCompileFailed {
            stage: ShaderStage::Fragment,
            log: "0:1: syntax error in fragment shader".into(),
        }
    );
    for time in [0.0, 0.016, 0.033] {
        assert!(renderer.render_frame(FrameContext::new(64, 64, time)).is_err());
    }
    assert_eq!(renderer.backend().draws(), 0);
    assert!(!renderer.backend().calls.contains(&Call::Link));
}

#[test]
fn link_and_validate_failures_abort_setup() {
    let mut linking = SceneRenderer::new(SpyBackend {
        fail_link: true,
        ..SpyBackend::default()
    });
    assert_eq!(
        linking.setup(),
        Err(SetupError::ProgramLinkFailed("varying mismatch".into()))
    );
    assert!(!linking.backend().calls.contains(&Call::Validate));

    let mut validating = SceneRenderer::new(SpyBackend {
        fail_validate: true,
        ..SpyBackend::default()
    });
    assert_eq!(
        validating.setup(),
        Err(SetupError::ProgramValidateFailed("sampler conflict".into()))
    );
    assert_eq!(validating.backend().draws(), 0);
    assert!(validating.resources().is_none());
}

#[test]
fn every_resize_reaches_the_next_frame() {
    let mut renderer = SceneRenderer::new(SpyBackend::default());
    renderer.setup().unwrap();

    let sizes = [(640, 480), (1024, 768), (300, 900), (300, 900), (1, 1)];
    for (index, &(width, height)) in sizes.iter().enumerate() {
        renderer
            .render_frame(FrameContext::new(width, height, index as f32))
            .unwrap();
    }
    assert_eq!(renderer.backend().viewports(), sizes.to_vec());

    let resolutions: Vec<(f32, f32)> = renderer
        .backend()
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::Uniform2f(name, x, y) if name == "u_resolution" => Some((*x, *y)),
            _ => None,
        })
        .collect();
    let expected: Vec<(f32, f32)> = sizes
        .iter()
        .map(|&(w, h)| (w as f32, h as f32))
        .collect();
    assert_eq!(resolutions, expected);
}

#[test]
fn transient_failures_skip_a_single_frame() {
    let mut renderer = SceneRenderer::new(SpyBackend::default());
    renderer.setup().unwrap();
    renderer
        .backend_mut()
        .frame_failures
        .push(FrameError::Transient("timeout".into()));

    let first = renderer.render_frame(FrameContext::new(10, 10, 0.0)).unwrap();
    let second = renderer.render_frame(FrameContext::new(10, 10, 0.1)).unwrap();
    assert_eq!(first, FrameStatus::Skipped);
    assert_eq!(second, FrameStatus::Presented);
    assert_eq!(renderer.backend().draws(), 1);
    assert_eq!(renderer.frames_drawn(), 1);
}

#[test]
fn lost_context_returns_to_uninitialized() {
    let mut renderer = SceneRenderer::new(SpyBackend::default());
    renderer.setup().unwrap();
    renderer
        .backend_mut()
        .frame_failures
        .push(FrameError::SurfaceLost);

    let err = renderer
        .render_frame(FrameContext::new(10, 10, 0.0))
        .unwrap_err();
    assert_eq!(err, RenderError::ContextLost);
    assert_eq!(renderer.phase(), RendererPhase::Uninitialized);
    assert_eq!(
        renderer.render_frame(FrameContext::new(10, 10, 0.0)),
        Err(RenderError::NotReady(RendererPhase::Uninitialized))
    );

    renderer.setup().unwrap();
    assert_eq!(renderer.phase(), RendererPhase::Ready);
    assert_eq!(
        renderer.render_frame(FrameContext::new(10, 10, 0.2)),
        Ok(FrameStatus::Presented)
    );
}

#[test]
fn fatal_frame_errors_propagate() {
    let mut renderer = SceneRenderer::new(SpyBackend::default());
    renderer.setup().unwrap();
    renderer
        .backend_mut()
        .frame_failures
        .push(FrameError::Fatal("out of memory".into()));
    assert_eq!(
        renderer.render_frame(FrameContext::new(10, 10, 0.0)),
        Err(RenderError::Frame(FrameError::Fatal("out of memory".into())))
    );
    assert_eq!(renderer.phase(), RendererPhase::Ready);
}
