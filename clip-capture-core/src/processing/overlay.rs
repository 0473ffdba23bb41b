use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use image::codecs::gif::GifDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, ImageFormat, RgbaImage};

use crate::models::config::OverlayPosition;
use crate::models::error::CaptureError;
use crate::models::frame::Frame;

/// Distance from the frame edge for the logical anchors, in pixels.
pub const ANCHOR_MARGIN: i64 = 10;

/// A looping animation, pre-decoded to same-size RGBA frames.
#[derive(Debug, Clone)]
pub struct AnimatedOverlay {
    frames: Vec<RgbaImage>,
    width: u32,
    height: u32,
    loop_secs: f64,
    position: OverlayPosition,
}

impl AnimatedOverlay {
    /// Decode every frame of `path` (GIF, or a single still image) and
    /// resize each to `width`x`height`.
    pub fn load(
        path: &Path,
        width: u32,
        height: u32,
        loop_secs: f64,
        position: OverlayPosition,
    ) -> Result<Self, CaptureError> {
        let frames = decode_frames(path)?;
        Self::from_frames(frames, width, height, loop_secs, position)
    }

    pub fn from_frames(
        frames: Vec<RgbaImage>,
        width: u32,
        height: u32,
        loop_secs: f64,
        position: OverlayPosition,
    ) -> Result<Self, CaptureError> {
        if frames.is_empty() {
            return Err(CaptureError::AssetLoadFailure("animation has no frames".into()));
        }
        if !(loop_secs > 0.0) {
            return Err(CaptureError::AssetLoadFailure(format!("invalid loop duration {}", loop_secs)));
        }
        let frames = frames.iter().map(|f| resize_rgba(f, width, height)).collect();
        Ok(Self {
            frames,
            width,
            height,
            loop_secs,
            position,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn loop_secs(&self) -> f64 {
        self.loop_secs
    }

    pub fn position(&self) -> OverlayPosition {
        self.position
    }

    /// The animation frame shown on capture frame `tick` at `fps`.
    pub fn frame_for_tick(&self, tick: u64, fps: f64) -> &RgbaImage {
        &self.frames[overlay_frame_index(tick, self.loop_secs, fps, self.frames.len())]
    }
}

/// A single RGBA image drawn at a fixed opacity.
#[derive(Debug, Clone)]
pub struct StaticOverlay {
    image: RgbaImage,
    opacity: f32,
    position: OverlayPosition,
}

impl StaticOverlay {
    pub fn load(
        path: &Path,
        width: u32,
        height: u32,
        opacity: f32,
        position: OverlayPosition,
    ) -> Result<Self, CaptureError> {
        let image = image::open(path)
            .map_err(|e| asset_error(path, e))?
            .to_rgba8();
        Ok(Self::from_image(image, width, height, opacity, position))
    }

    pub fn from_image(image: RgbaImage, width: u32, height: u32, opacity: f32, position: OverlayPosition) -> Self {
        Self {
            image: resize_rgba(&image, width, height),
            opacity: opacity.clamp(0.0, 1.0),
            position,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }
}

/// Any overlay the compositor can draw. Cheap to clone.
#[derive(Debug, Clone)]
pub enum Overlay {
    Animated(Arc<AnimatedOverlay>),
    Static(Arc<StaticOverlay>),
}

/// Index of the animation frame for capture frame `tick`.
///
/// One animation cycle spans `loop_secs * fps` capture frames, rounded to a
/// whole number of ticks, regardless of the asset's own frame timing. The
/// result is periodic in `tick` with that period.
pub fn overlay_frame_index(tick: u64, loop_secs: f64, fps: f64, frame_count: usize) -> usize {
    if frame_count == 0 {
        return 0;
    }
    let period = ((loop_secs * fps).round() as u64).max(1);
    let phase = tick % period;
    let index = (phase as u128 * frame_count as u128) / period as u128;
    (index as usize).min(frame_count - 1)
}

/// Top-left pixel for an overlay of `overlay` size on a `frame`-sized image,
/// or `None` when it would not fit entirely.
pub fn placement(frame: (u32, u32), overlay: (u32, u32), position: OverlayPosition) -> Option<(u32, u32)> {
    let (fw, fh) = (frame.0 as i64, frame.1 as i64);
    let (ow, oh) = (overlay.0 as i64, overlay.1 as i64);
    let (x, y) = match position {
        OverlayPosition::TopRight => (fw - ow - ANCHOR_MARGIN, ANCHOR_MARGIN),
        OverlayPosition::TopLeft => (ANCHOR_MARGIN, ANCHOR_MARGIN),
        OverlayPosition::Center => ((fw - ow) / 2, (fh - oh) / 2),
        OverlayPosition::At { x, y } => (x, y),
    };
    if x < 0 || y < 0 || x + ow > fw || y + oh > fh {
        return None;
    }
    Some((x as u32, y as u32))
}

/// Overlays bound to a frame rate. `composite` is pure.
#[derive(Debug, Clone)]
pub struct Compositor {
    overlays: Vec<Overlay>,
    fps: f64,
}

impl Compositor {
    pub fn new(overlays: Vec<Overlay>, fps: f64) -> Self {
        Self { overlays, fps }
    }

    /// A compositor that returns frames unchanged.
    pub fn empty(fps: f64) -> Self {
        Self::new(Vec::new(), fps)
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn composite(&self, frame: &Frame, tick: u64) -> Frame {
        composite(frame, &self.overlays, tick, self.fps)
    }
}

/// Draw `overlays` in order onto a copy of `frame`.
///
/// Each color channel blends as `dst * (1 - a) + src * a`. For the animated
/// overlay `a` is the pixel's alpha; for the static overlay it is the pixel's
/// alpha scaled by the configured opacity. Overlays that do not fit are
/// skipped.
pub fn composite(frame: &Frame, overlays: &[Overlay], tick: u64, fps: f64) -> Frame {
    let mut out = frame.clone();
    for overlay in overlays {
        let drawn = match overlay {
            Overlay::Animated(animated) => {
                blend_onto(&mut out, animated.frame_for_tick(tick, fps), animated.position, 1.0)
            }
            Overlay::Static(still) => blend_onto(&mut out, &still.image, still.position, still.opacity),
        };
        if !drawn {
            log::trace!("Overlay skipped on tick {}: outside frame bounds", tick);
        }
    }
    out
}

fn blend_onto(frame: &mut Frame, overlay: &RgbaImage, position: OverlayPosition, opacity: f32) -> bool {
    let (fw, fh) = frame.dimensions();
    let Some((x0, y0)) = placement((fw, fh), overlay.dimensions(), position) else {
        return false;
    };
    if opacity <= 0.0 {
        return true;
    }

    let stride = fw as usize * Frame::CHANNELS;
    let data = frame.as_bytes_mut();
    for (ox, oy, pixel) in overlay.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = (a as f32 / 255.0) * opacity;
        if alpha <= 0.0 {
            continue;
        }
        let offset = (y0 + oy) as usize * stride + (x0 + ox) as usize * Frame::CHANNELS;
        for (dst, src) in data[offset..offset + 3].iter_mut().zip([r, g, b]) {
            let blended = *dst as f32 * (1.0 - alpha) + src as f32 * alpha;
            *dst = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    true
}

fn decode_frames(path: &Path) -> Result<Vec<RgbaImage>, CaptureError> {
    if ImageFormat::from_path(path).ok() == Some(ImageFormat::Gif) {
        let file = File::open(path).map_err(|e| asset_error(path, e))?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| asset_error(path, e))?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| asset_error(path, e))?;
        return Ok(frames.into_iter().map(|f| f.into_buffer()).collect());
    }
    let image = image::open(path).map_err(|e| asset_error(path, e))?;
    Ok(vec![image.to_rgba8()])
}

fn resize_rgba(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Lanczos3)
}

fn asset_error(path: &Path, err: impl std::fmt::Display) -> CaptureError {
    CaptureError::AssetLoadFailure(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, Rgba};

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(rgba))
    }

    fn gray_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(width, height, vec![value; Frame::byte_len(width, height)]).unwrap()
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * frame.width() as usize + x as usize) * 3;
        let b = frame.as_bytes();
        [b[i], b[i + 1], b[i + 2]]
    }

    #[test]
    fn frame_index_formula() {
        // 20 s loop at 30 fps over 10 frames: 60 ticks per overlay frame.
        assert_eq!(overlay_frame_index(0, 20.0, 30.0, 10), 0);
        assert_eq!(overlay_frame_index(59, 20.0, 30.0, 10), 0);
        assert_eq!(overlay_frame_index(60, 20.0, 30.0, 10), 1);
        assert_eq!(overlay_frame_index(599, 20.0, 30.0, 10), 9);
        assert_eq!(overlay_frame_index(600, 20.0, 30.0, 10), 0);
        assert_eq!(overlay_frame_index(5, 1.0, 30.0, 0), 0);
    }

    #[test]
    fn frame_index_is_periodic_and_monotonic_within_cycle() {
        for &(loop_secs, fps, count) in &[(20.0f64, 30.0f64, 37usize), (2.0, 15.0, 4), (0.5, 24.0, 100), (10.0, 29.97, 12)] {
            let period = (loop_secs * fps).round() as u64;
            let mut previous = 0;
            for tick in 0..period * 3 {
                let index = overlay_frame_index(tick, loop_secs, fps, count);
                assert!(index < count);
                assert_eq!(index, overlay_frame_index(tick + period, loop_secs, fps, count));
                if tick % period != 0 {
                    assert!(index >= previous);
                }
                previous = index;
            }
        }
    }

    #[test]
    fn fractional_rate_period_rounds_to_whole_ticks() {
        // 10 s at 29.97 fps is 299.7 ticks, one cycle is 300.
        assert_eq!(overlay_frame_index(0, 10.0, 29.97, 12), 0);
        assert_eq!(overlay_frame_index(299, 10.0, 29.97, 12), 11);
        assert_eq!(overlay_frame_index(300, 10.0, 29.97, 12), 0);
        assert_eq!(overlay_frame_index(150, 10.0, 29.97, 12), 6);
    }

    #[test]
    fn anchors_resolve_with_margin() {
        assert_eq!(placement((1280, 720), (200, 200), OverlayPosition::TopRight), Some((1070, 10)));
        assert_eq!(placement((1280, 720), (200, 200), OverlayPosition::TopLeft), Some((10, 10)));
        assert_eq!(placement((1280, 720), (1280, 720), OverlayPosition::Center), Some((0, 0)));
        assert_eq!(placement((1280, 720), (200, 100), OverlayPosition::Center), Some((540, 310)));
        assert_eq!(placement((100, 100), (10, 10), OverlayPosition::At { x: 90, y: 90 }), Some((90, 90)));
    }

    #[test]
    fn out_of_bounds_is_skipped() {
        assert_eq!(placement((100, 100), (10, 10), OverlayPosition::At { x: 91, y: 0 }), None);
        assert_eq!(placement((100, 100), (10, 10), OverlayPosition::At { x: -1, y: 0 }), None);
        assert_eq!(placement((100, 100), (200, 200), OverlayPosition::Center), None);
        assert_eq!(placement((100, 100), (95, 20), OverlayPosition::TopRight), None);

        let frame = gray_frame(20, 20, 77);
        let big = Overlay::Static(Arc::new(StaticOverlay::from_image(
            solid(30, 30, [255, 0, 0, 255]),
            30,
            30,
            1.0,
            OverlayPosition::TopLeft,
        )));
        assert_eq!(composite(&frame, &[big], 0, 30.0), frame);
    }

    #[test]
    fn opaque_pixels_replace_and_transparent_pixels_keep() {
        let mut image = solid(2, 1, [255, 0, 0, 255]);
        image.put_pixel(1, 0, Rgba([0, 255, 0, 0]));
        let overlay = AnimatedOverlay::from_frames(vec![image], 2, 1, 1.0, OverlayPosition::At { x: 0, y: 0 }).unwrap();
        let compositor = Compositor::new(vec![Overlay::Animated(Arc::new(overlay))], 30.0);

        let out = compositor.composite(&gray_frame(4, 4, 100), 0);
        assert_eq!(pixel(&out, 0, 0), [255, 0, 0]);
        assert_eq!(pixel(&out, 1, 0), [100, 100, 100]);
        assert_eq!(pixel(&out, 3, 3), [100, 100, 100]);
    }

    #[test]
    fn static_opacity_blends() {
        let watermark = StaticOverlay::from_image(solid(4, 4, [200, 200, 200, 255]), 4, 4, 0.25, OverlayPosition::Center);
        let out = composite(&gray_frame(4, 4, 100), &[Overlay::Static(Arc::new(watermark))], 0, 30.0);
        // 100 * 0.75 + 200 * 0.25
        assert_eq!(pixel(&out, 2, 2), [125, 125, 125]);
    }

    #[test]
    fn empty_compositor_is_identity() {
        let frame = gray_frame(8, 6, 42);
        assert_eq!(Compositor::empty(30.0).composite(&frame, 17), frame);
    }

    #[test]
    fn resize_keeps_declared_size_and_alpha() {
        let overlay = StaticOverlay::from_image(solid(64, 32, [10, 20, 30, 0]), 16, 16, 1.0, OverlayPosition::TopLeft);
        assert_eq!(overlay.size(), (16, 16));
        assert!(overlay.image.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn loads_animated_gif() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spin.gif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = GifEncoder::new(file);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            let frames = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]]
                .into_iter()
                .map(|c| image::Frame::from_parts(solid(8, 8, c), 0, 0, Delay::from_numer_denom_ms(100, 1)));
            encoder.encode_frames(frames).unwrap();
        }

        let overlay = AnimatedOverlay::load(&path, 4, 4, 1.0, OverlayPosition::TopRight).unwrap();
        assert_eq!(overlay.frame_count(), 3);
        assert!(overlay.frames.iter().all(|f| f.dimensions() == (4, 4)));
        assert_eq!(overlay.frame_for_tick(0, 30.0).get_pixel(0, 0).0[0], 255);
        assert_eq!(overlay.frame_for_tick(20, 30.0).get_pixel(0, 0).0[2], 255);
    }

    #[test]
    fn loads_still_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mark.png");
        solid(10, 10, [1, 2, 3, 128]).save(&path).unwrap();

        let overlay = StaticOverlay::load(&path, 5, 5, 0.3, OverlayPosition::Center).unwrap();
        assert_eq!(overlay.size(), (5, 5));
        assert_eq!(overlay.image.get_pixel(2, 2).0[3], 128);

        let animated = AnimatedOverlay::load(&path, 5, 5, 2.0, OverlayPosition::Center).unwrap();
        assert_eq!(animated.frame_count(), 1);
    }

    #[test]
    fn missing_asset_is_asset_failure() {
        let err = AnimatedOverlay::load(Path::new("/nonexistent/a.gif"), 4, 4, 1.0, OverlayPosition::TopLeft).unwrap_err();
        assert!(matches!(err, CaptureError::AssetLoadFailure(_)));
        let err = StaticOverlay::load(Path::new("/nonexistent/b.png"), 4, 4, 1.0, OverlayPosition::TopLeft).unwrap_err();
        assert!(matches!(err, CaptureError::AssetLoadFailure(_)));
    }
}
