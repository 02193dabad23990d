use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::gpu::WgpuBackend;
use crate::runtime::{time_source_for_policy, BoxedTimeSource};
use crate::scene::FrameContext;
use crate::state::{FrameStatus, RenderError, SceneRenderer};
use crate::types::RendererConfig;

/// Owns the window renderer and the clock feeding it.
struct WindowState {
    window: Arc<Window>,
    renderer: Option<SceneRenderer<WgpuBackend>>,
    time_source: BoxedTimeSource,
    config: RendererConfig,
}

impl WindowState {
    fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let renderer = build_renderer(window.clone(), config)?;
        Ok(Self {
            window,
            renderer: Some(renderer),
            time_source: time_source_for_policy(&config.policy),
            config: config.clone(),
        })
    }

    /// Renders one frame at `size`, using the time source's next sample.
    fn render(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        let sample = self.time_source.sample();
        let frame = FrameContext::new(size.width, size.height, sample.seconds);
        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| anyhow!("window renderer is not initialised"))?;
        match renderer.render_frame(frame) {
            Ok(FrameStatus::Presented) => Ok(()),
            Ok(FrameStatus::Skipped) => {
                debug!(frame = sample.frame_index, "frame skipped");
                Ok(())
            }
            Err(RenderError::ContextLost) => {
                warn!("rebuilding renderer after context loss");
                // Release the old surface before creating a new one on the same window.
                drop(self.renderer.take());
                self.renderer = Some(build_renderer(self.window.clone(), &self.config)?);
                Ok(())
            }
            Err(err) => Err(anyhow!(err)),
        }
    }
}

fn build_renderer(
    window: Arc<Window>,
    config: &RendererConfig,
) -> Result<SceneRenderer<WgpuBackend>> {
    let backend = WgpuBackend::new(window, config.power)?;
    let mut renderer = SceneRenderer::with_sources(backend, config.sources.clone());
    renderer
        .setup()
        .context("failed to set up the scene renderer")?;
    Ok(renderer)
}

/// Opens the window and drives the animation loop until it is closed.
///
/// Setup failures return before the event loop starts. Resize events render
/// immediately with the new size; otherwise a redraw is requested whenever the
/// loop goes idle and the Fifo swapchain paces frames to the display refresh.
pub fn run_window(config: &RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(window_size)
        .build(&event_loop)
        .context("failed to create window")?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window.clone(), config)?;
    info!(
        width = window_size.width,
        height = window_size.height,
        "horizon window ready"
    );

    let mut result = Ok(());
    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                elwt.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Err(err) = state.render(new_size) {
                    error!("failed to render after resize: {err:?}");
                    result = Err(err);
                    elwt.exit();
                }
            }
            WindowEvent::RedrawRequested => {
                let size = state.window.inner_size();
                if let Err(err) = state.render(size) {
                    error!("failed to render frame: {err:?}");
                    result = Err(err);
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            state.window.request_redraw();
            elwt.set_control_flow(ControlFlow::Wait);
        }
        _ => {}
    });

    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }

    result
}
