//! Frame data structures for captured card images

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;

/// A captured frame from the camera or an image file
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Create a frame where every pixel has the same RGBA value
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba.repeat(width as usize * height as usize);
        Self::new(data, width, height)
    }

    /// Build a frame from a decoded image
    pub fn from_image(image: DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(rgba.into_raw(), width, height)
    }

    /// Decode an encoded image (PNG, JPEG, ...)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("Failed to decode image bytes")?;
        Ok(Self::from_image(image))
    }

    /// Load a frame from an image file
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path).with_context(|| format!("Failed to open image {:?}", path))?;
        Ok(Self::from_image(image))
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the buffer length matches the declared dimensions
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.pixel_count() * 4
    }

    /// Borrow the pixels as an `image` buffer
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Copy out a sub-rectangle, clipped to the frame bounds
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let width = width.min(self.width - x);
        let height = height.min(self.height - y);

        let mut region = Vec::with_capacity(width as usize * height as usize * 4);
        for row in y..(y + height) {
            let start = (row as usize * self.width as usize + x as usize) * 4;
            let end = start + width as usize * 4;
            if end <= self.data.len() {
                region.extend_from_slice(&self.data[start..end]);
            }
        }

        Self {
            data: region,
            width,
            height,
            timestamp: self.timestamp,
        }
    }

    /// Encode losslessly as PNG (local OCR input)
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.encode(ImageFormat::Png, false)
    }

    /// Encode as JPEG (remote vision payload); alpha is dropped
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        self.encode(ImageFormat::Jpeg, true)
    }

    fn encode(&self, format: ImageFormat, drop_alpha: bool) -> Result<Vec<u8>> {
        let rgba = self
            .to_rgba_image()
            .context("Frame buffer does not match its dimensions")?;
        let image = if drop_alpha {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
        } else {
            DynamicImage::ImageRgba8(rgba)
        };

        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, format)
            .with_context(|| format!("Failed to encode frame as {:?}", format))?;
        Ok(bytes.into_inner())
    }
}
