use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use tracing::info;

use crate::scene::FrameContext;
use crate::shaders::ShaderSources;
use crate::software::SoftwareBackend;
use crate::state::{FrameStatus, SceneRenderer};

/// A single frame to evaluate off-screen.
#[derive(Debug, Clone)]
pub struct StillRequest {
    pub size: (u32, u32),
    /// Timestamp the scene is evaluated at, in seconds.
    pub time: f32,
    pub sources: ShaderSources,
}

impl StillRequest {
    pub fn new(size: (u32, u32), time: f32) -> Self {
        Self {
            size,
            time,
            sources: ShaderSources::default(),
        }
    }
}

/// Renders one frame with the software backend.
pub fn render_still(request: &StillRequest) -> Result<RgbaImage> {
    let mut renderer =
        SceneRenderer::with_sources(SoftwareBackend::new(), request.sources.clone());
    renderer
        .setup()
        .context("failed to set up the software renderer")?;

    let (width, height) = request.size;
    let frame = FrameContext::new(width, height, request.time);
    match renderer.render_frame(frame)? {
        FrameStatus::Presented => Ok(renderer.into_backend().into_image()),
        FrameStatus::Skipped => Err(anyhow!(
            "still frame at {width}x{height} was skipped by the renderer"
        )),
    }
}

/// Renders one frame and writes it to `path` as PNG.
pub fn export_still(request: &StillRequest, path: &Path) -> Result<PathBuf> {
    let image = render_still(request)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write still frame to {}", path.display()))?;
    info!(
        path = %path.display(),
        width = request.size.0,
        height = request.size.1,
        time = request.time,
        "still frame exported"
    );
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene;

    #[test]
    fn still_matches_cpu_shading() {
        let image = render_still(&StillRequest::new((12, 8), 1.25)).unwrap();
        let frame = FrameContext::new(12, 8, 1.25);
        let expected = scene::shade_pixel(3.5, 7.5, &frame).to_rgba8();
        assert_eq!(image.get_pixel(3, 0).0, expected);
    }

    #[test]
    fn zero_sized_stills_are_errors() {
        assert!(render_still(&StillRequest::new((0, 8), 0.0)).is_err());
    }

    #[test]
    fn export_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/still.png");
        let written = export_still(&StillRequest::new((10, 6), 0.0), &path).unwrap();
        assert_eq!(written, path);
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (10, 6));
    }

    #[test]
    fn broken_shader_fails_export() {
        let mut request = StillRequest::new((4, 4), 0.0);
        request.sources.fragment = "#version 450\nvoid main() { undefined(); }\n".into();
        let err = render_still(&request).unwrap_err();
        assert!(format!("{err:#}").contains("fragment"));
    }
}
