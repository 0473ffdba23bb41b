use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::models::config::OverlaySettings;
use crate::processing::overlay::{AnimatedOverlay, Compositor, Overlay, StaticOverlay};

/// Process-wide overlay assets, decoded on first use and kept for the
/// lifetime of the library.
///
/// A load failure is remembered as "no overlay" so a missing file costs one
/// warning, not one per job.
pub struct OverlayLibrary {
    settings: OverlaySettings,
    animated: OnceCell<Option<Arc<AnimatedOverlay>>>,
    watermark: OnceCell<Option<Arc<StaticOverlay>>>,
}

impl OverlayLibrary {
    pub fn new(settings: OverlaySettings) -> Self {
        Self {
            settings,
            animated: OnceCell::new(),
            watermark: OnceCell::new(),
        }
    }

    pub fn animated(&self) -> Option<Arc<AnimatedOverlay>> {
        self.animated
            .get_or_init(|| {
                let settings = self.settings.animated.as_ref()?;
                match AnimatedOverlay::load(
                    &settings.path,
                    settings.width,
                    settings.height,
                    settings.loop_secs,
                    settings.position,
                ) {
                    Ok(overlay) => {
                        log::info!(
                            "Loaded animated overlay {} ({} frames)",
                            settings.path.display(),
                            overlay.frame_count()
                        );
                        Some(Arc::new(overlay))
                    }
                    Err(e) => {
                        log::warn!("Animated overlay disabled: {}", e);
                        None
                    }
                }
            })
            .clone()
    }

    pub fn watermark(&self) -> Option<Arc<StaticOverlay>> {
        self.watermark
            .get_or_init(|| {
                let settings = self.settings.watermark.as_ref()?;
                match StaticOverlay::load(
                    &settings.path,
                    settings.width,
                    settings.height,
                    settings.opacity,
                    settings.position,
                ) {
                    Ok(overlay) => {
                        log::info!("Loaded watermark {}", settings.path.display());
                        Some(Arc::new(overlay))
                    }
                    Err(e) => {
                        log::warn!("Watermark disabled: {}", e);
                        None
                    }
                }
            })
            .clone()
    }

    /// Compositor drawing the animation first, then the watermark.
    pub fn compositor(&self, fps: f64) -> Compositor {
        let mut overlays = Vec::new();
        if let Some(animated) = self.animated() {
            overlays.push(Overlay::Animated(animated));
        }
        if let Some(watermark) = self.watermark() {
            overlays.push(Overlay::Static(watermark));
        }
        Compositor::new(overlays, fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::{AnimatedOverlaySettings, WatermarkSettings};
    use crate::models::frame::Frame;
    use image::{Rgba, RgbaImage};
    use std::path::PathBuf;

    #[test]
    fn missing_assets_degrade_to_identity() {
        let library = OverlayLibrary::new(OverlaySettings {
            animated: Some(AnimatedOverlaySettings {
                path: PathBuf::from("/nonexistent/overlay.gif"),
                ..Default::default()
            }),
            watermark: Some(WatermarkSettings {
                path: PathBuf::from("/nonexistent/watermark.png"),
                ..Default::default()
            }),
        });

        assert!(library.animated().is_none());
        assert!(library.watermark().is_none());
        let compositor = library.compositor(30.0);
        assert!(compositor.is_empty());

        let frame = Frame::new(4, 2, (0..24).collect()).unwrap();
        assert_eq!(compositor.composite(&frame, 3), frame);
    }

    #[test]
    fn loads_once_and_shares() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mark.png");
        RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255])).save(&path).unwrap();

        let library = OverlayLibrary::new(OverlaySettings {
            animated: None,
            watermark: Some(WatermarkSettings {
                path: path.clone(),
                width: 4,
                height: 4,
                ..Default::default()
            }),
        });

        let first = library.watermark().unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = library.watermark().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(library.compositor(30.0).len(), 1);
    }
}
