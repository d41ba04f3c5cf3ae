//! Reference-counted sensor images and captures
//!
//! Both are cheap handles: `clone()` takes another reference to the same
//! pixels and dropping a handle releases it.

use crate::error::{Result, TrackerError};
use crate::types::{Calibration, ImageFormat};
use image::{GrayImage, ImageBuffer, Luma};
use std::sync::Arc;
use std::time::Duration;

/// 16-bit single channel image (depth in millimetres or IR brightness)
pub type Luma16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

#[derive(Debug)]
enum Pixels {
    Luma16(Luma16Image),
    Luma8(GrayImage),
    /// Packed BGRA rows
    Bgra(Vec<u8>),
}

#[derive(Debug)]
struct ImageInner {
    format: ImageFormat,
    width: u32,
    height: u32,
    device_timestamp: Duration,
    pixels: Pixels,
}

/// Sensor image handle
#[derive(Debug, Clone)]
pub struct Image {
    inner: Arc<ImageInner>,
}

impl Image {
    fn from_parts(format: ImageFormat, width: u32, height: u32, pixels: Pixels) -> Self {
        Self {
            inner: Arc::new(ImageInner {
                format,
                width,
                height,
                device_timestamp: Duration::ZERO,
                pixels,
            }),
        }
    }

    /// Depth image in millimetres
    pub fn depth(buffer: Luma16Image) -> Self {
        let (width, height) = buffer.dimensions();
        Self::from_parts(ImageFormat::Depth16, width, height, Pixels::Luma16(buffer))
    }

    /// Infrared image
    pub fn ir(buffer: Luma16Image) -> Self {
        let (width, height) = buffer.dimensions();
        Self::from_parts(ImageFormat::Ir16, width, height, Pixels::Luma16(buffer))
    }

    /// Single channel 8-bit image
    pub fn custom8(buffer: GrayImage) -> Self {
        let (width, height) = buffer.dimensions();
        Self::from_parts(ImageFormat::Custom8, width, height, Pixels::Luma8(buffer))
    }

    /// BGRA color image from packed rows
    pub fn color_bgra(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * ImageFormat::ColorBgra32.bytes_per_pixel();
        if data.len() != expected {
            return Err(TrackerError::invalid_capture(format!(
                "BGRA buffer holds {} bytes, {}x{} needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self::from_parts(
            ImageFormat::ColorBgra32,
            width,
            height,
            Pixels::Bgra(data),
        ))
    }

    /// Depth image built from raw millimetre samples in row-major order
    pub fn depth_from_raw(width: u32, height: u32, samples: Vec<u16>) -> Result<Self> {
        let len = samples.len();
        let buffer = Luma16Image::from_raw(width, height, samples).ok_or_else(|| {
            TrackerError::invalid_capture(format!(
                "{} depth samples do not fill a {}x{} image",
                len, width, height
            ))
        })?;
        Ok(Self::depth(buffer))
    }

    /// Set the device timestamp; only possible while this is the sole reference
    pub fn with_device_timestamp(mut self, timestamp: Duration) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.device_timestamp = timestamp,
            None => log::warn!("Image is shared, device timestamp left unchanged"),
        }
        self
    }

    pub fn format(&self) -> ImageFormat {
        self.inner.format
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    pub fn device_timestamp(&self) -> Duration {
        self.inner.device_timestamp
    }

    /// Pixels of a depth or IR image
    pub fn as_luma16(&self) -> Option<&Luma16Image> {
        match &self.inner.pixels {
            Pixels::Luma16(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Pixels of a custom 8-bit image
    pub fn as_luma8(&self) -> Option<&GrayImage> {
        match &self.inner.pixels {
            Pixels::Luma8(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Packed BGRA bytes of a color image
    pub fn as_bgra(&self) -> Option<&[u8]> {
        match &self.inner.pixels {
            Pixels::Bgra(data) => Some(data),
            _ => None,
        }
    }

    /// Number of live handles to these pixels
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Debug, Clone, Default)]
struct CaptureInner {
    depth: Option<Image>,
    ir: Option<Image>,
    color: Option<Image>,
}

/// One synchronised set of sensor images
#[derive(Debug, Clone, Default)]
pub struct Capture {
    inner: Arc<CaptureInner>,
}

impl Capture {
    /// Empty capture; attach images with the `with_*` methods
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(mut self, image: Image) -> Self {
        Arc::make_mut(&mut self.inner).depth = Some(image);
        self
    }

    pub fn with_ir(mut self, image: Image) -> Self {
        Arc::make_mut(&mut self.inner).ir = Some(image);
        self
    }

    pub fn with_color(mut self, image: Image) -> Self {
        Arc::make_mut(&mut self.inner).color = Some(image);
        self
    }

    pub fn depth(&self) -> Option<&Image> {
        self.inner.depth.as_ref()
    }

    pub fn ir(&self) -> Option<&Image> {
        self.inner.ir.as_ref()
    }

    pub fn color(&self) -> Option<&Image> {
        self.inner.color.as_ref()
    }

    /// Device timestamp of the depth image, zero without one
    pub fn device_timestamp(&self) -> Duration {
        self.depth()
            .map(Image::device_timestamp)
            .unwrap_or_default()
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check the capture can be tracked with `calibration`
    ///
    /// Depth must be present, `Depth16`, and sized for the calibrated depth
    /// mode. An IR image is optional but must then be `IR16` of the same size.
    /// Sensor SDKs usually insist on the IR plane as well; estimators that
    /// need it must reject captures without one themselves.
    pub fn validate_for(&self, calibration: &Calibration) -> Result<()> {
        let expected = calibration.depth_resolution();

        let depth = self
            .depth()
            .ok_or_else(|| TrackerError::invalid_capture("capture has no depth image"))?;
        if depth.format() != ImageFormat::Depth16 {
            return Err(TrackerError::invalid_capture(format!(
                "depth image has format {:?}, expected Depth16",
                depth.format()
            )));
        }
        if depth.dimensions() != expected {
            return Err(TrackerError::invalid_capture(format!(
                "depth image is {}x{}, {:?} needs {}x{}",
                depth.width(),
                depth.height(),
                calibration.depth_mode,
                expected.0,
                expected.1
            )));
        }

        if let Some(ir) = self.ir() {
            if ir.format() != ImageFormat::Ir16 {
                return Err(TrackerError::invalid_capture(format!(
                    "IR image has format {:?}, expected IR16",
                    ir.format()
                )));
            }
            if ir.dimensions() != expected {
                return Err(TrackerError::invalid_capture(format!(
                    "IR image is {}x{}, depth is {}x{}",
                    ir.width(),
                    ir.height(),
                    expected.0,
                    expected.1
                )));
            }
        }

        Ok(())
    }
}
