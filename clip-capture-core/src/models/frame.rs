use image::imageops::{self, FilterType};
use image::RgbImage;

use super::error::CaptureError;

/// One packed RGB24 video frame, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    /// Wrap raw RGB24 bytes. Fails if the buffer does not match the size.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(CaptureError::FrameReadTransient(format!(
                "frame buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self { width, height, data })
    }

    /// A black frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; Self::byte_len(width, height)],
        }
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::CHANNELS
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Return a frame of exactly `width`x`height`, resizing if needed.
    pub fn fitted(self, width: u32, height: u32) -> Frame {
        if self.width == width && self.height == height {
            return self;
        }
        let (src_w, src_h) = (self.width, self.height);
        match RgbImage::from_raw(src_w, src_h, self.data) {
            Some(image) => Frame::from_rgb_image(imageops::resize(&image, width, height, FilterType::Triangle)),
            None => {
                log::warn!("Dropping malformed {}x{} frame", src_w, src_h);
                Frame::blank(width, height)
            }
        }
    }
}
