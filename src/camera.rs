//! Pass-through camera feeds
//!
//! A feed owns its per-eye pixel buffers. The compositor asks for one capture
//! per frame and then borrows the image of each eye for the texture upload.

use std::path::{Path, PathBuf};

use glam::UVec2;
use log::{info, warn};
use serde::Deserialize;

use crate::config::{CameraConfig, CameraSource};
use crate::error::{Error, Result};
use crate::pose::Eye;

/// Capture resolution preset of the stereo camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraMode {
    #[default]
    Full,
    Vga,
}

impl CameraMode {
    /// Per-eye image size.
    pub fn resolution(self) -> UVec2 {
        match self {
            CameraMode::Full => UVec2::new(960, 950),
            CameraMode::Vga => UVec2::new(640, 480),
        }
    }
}

/// Channel order of a 4-channel, 8-bit image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
}

/// Read-only view of one eye's camera image.
#[derive(Debug, Clone, Copy)]
pub struct CameraImage<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl<'a> CameraImage<'a> {
    /// Returns `None` when `data` does not hold exactly `width * height` pixels.
    pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Option<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
            format,
        })
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4
    }
}

/// Source of left/right pass-through images.
pub trait CameraFeed {
    fn open(&mut self, device_index: u32, mode: CameraMode) -> Result<()>;

    /// Latches the most recent frame of both eyes. Never waits for a new one.
    fn capture(&mut self) -> Result<()>;

    /// Image latched by the last capture for `eye`.
    fn image(&self, eye: Eye) -> Option<CameraImage<'_>>;

    fn close(&mut self);
}

/// An opened feed; closes it when dropped.
pub struct OpenCamera<'a> {
    feed: &'a mut dyn CameraFeed,
}

impl<'a> OpenCamera<'a> {
    pub fn open(feed: &'a mut dyn CameraFeed, device_index: u32, mode: CameraMode) -> Result<Self> {
        feed.open(device_index, mode)?;
        Ok(Self { feed })
    }

    pub fn feed(&mut self) -> &mut dyn CameraFeed {
        &mut *self.feed
    }
}

impl Drop for OpenCamera<'_> {
    fn drop(&mut self) {
        self.feed.close();
    }
}

/// Builds the feed selected in the configuration.
pub fn from_config(config: &CameraConfig) -> Box<dyn CameraFeed> {
    match (&config.source, &config.image_path) {
        (CameraSource::TestPattern, _) => Box::new(TestPatternCamera::new()),
        (CameraSource::StereoImage, Some(path)) => Box::new(StereoImageCamera::new(path)),
        (CameraSource::StereoImage, None) => {
            warn!("camera source is stereo-image but no image_path is set");
            Box::new(NoCamera)
        }
        (CameraSource::None, _) => Box::new(NoCamera),
    }
}

/// Per-eye frame storage shared by the built-in feeds.
#[derive(Default)]
struct EyeFrames {
    frames: [Vec<u8>; 2],
    size: UVec2,
}

impl EyeFrames {
    fn allocate(&mut self, size: UVec2) {
        let len = size.x as usize * size.y as usize * 4;
        self.frames = [vec![0; len], vec![0; len]];
        self.size = size;
    }

    fn image(&self, eye: Eye, format: PixelFormat) -> Option<CameraImage<'_>> {
        CameraImage::new(&self.frames[eye.index()], self.size.x, self.size.y, format)
    }

    fn release(&mut self) {
        self.frames = [Vec::new(), Vec::new()];
        self.size = UVec2::ZERO;
    }
}

/// Synthetic stereo camera: scrolling color bars with a small horizontal
/// disparity between the eyes. Produces BGRA like the headset camera.
pub struct TestPatternCamera {
    frames: EyeFrames,
    tick: u32,
    open: bool,
}

impl TestPatternCamera {
    const BARS: [[u8; 3]; 7] = [
        [192, 192, 192],
        [192, 192, 0],
        [0, 192, 192],
        [0, 192, 0],
        [192, 0, 192],
        [192, 0, 0],
        [0, 0, 192],
    ];
    const DISPARITY: u32 = 12;

    pub fn new() -> Self {
        Self {
            frames: EyeFrames::default(),
            tick: 0,
            open: false,
        }
    }

    fn paint(&mut self) {
        let UVec2 { x: width, y: height } = self.frames.size;
        let band = (self.tick * 4) % height.max(1);
        for eye in Eye::ALL {
            let shift = if eye == Eye::Left { Self::DISPARITY } else { 0 };
            let frame = &mut self.frames.frames[eye.index()];
            for (row, line) in frame.chunks_exact_mut(width as usize * 4).enumerate() {
                let in_band = (row as u32).abs_diff(band) < 6;
                for (col, px) in line.chunks_exact_mut(4).enumerate() {
                    let bar = ((col as u32 + shift) * Self::BARS.len() as u32 / width) as usize;
                    let [r, g, b] = if in_band {
                        [255, 255, 255]
                    } else {
                        Self::BARS[bar.min(Self::BARS.len() - 1)]
                    };
                    px.copy_from_slice(&[b, g, r, 255]);
                }
            }
        }
    }
}

impl Default for TestPatternCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraFeed for TestPatternCamera {
    fn open(&mut self, device_index: u32, mode: CameraMode) -> Result<()> {
        if device_index != 0 {
            return Err(Error::DeviceUnavailable(format!(
                "test pattern camera has no device {device_index}"
            )));
        }
        self.frames.allocate(mode.resolution());
        self.tick = 0;
        self.open = true;
        self.paint();
        info!("Test pattern camera opened at {}x{}", self.frames.size.x, self.frames.size.y);
        Ok(())
    }

    fn capture(&mut self) -> Result<()> {
        if !self.open {
            return Err(Error::DeviceUnavailable("test pattern camera is closed".into()));
        }
        self.tick = self.tick.wrapping_add(1);
        self.paint();
        Ok(())
    }

    fn image(&self, eye: Eye) -> Option<CameraImage<'_>> {
        if !self.open {
            return None;
        }
        self.frames.image(eye, PixelFormat::Bgra8)
    }

    fn close(&mut self) {
        if self.open {
            info!("Test pattern camera closed");
        }
        self.frames.release();
        self.open = false;
    }
}

/// Still side-by-side stereo photo: left half feeds the left eye.
pub struct StereoImageCamera {
    path: PathBuf,
    frames: EyeFrames,
    open: bool,
}

impl StereoImageCamera {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            frames: EyeFrames::default(),
            open: false,
        }
    }

    fn split(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        if width < 2 || height == 0 {
            return Err(Error::DeviceUnavailable(format!(
                "stereo image {} is too small ({width}x{height})",
                self.path.display()
            )));
        }
        let half = width / 2;
        self.frames.allocate(UVec2::new(half, height));
        let row_bytes = width as usize * 4;
        let half_bytes = half as usize * 4;
        for (row, line) in pixels.chunks_exact(row_bytes).enumerate() {
            let dst = row * half_bytes..(row + 1) * half_bytes;
            self.frames.frames[Eye::Left.index()][dst.clone()].copy_from_slice(&line[..half_bytes]);
            self.frames.frames[Eye::Right.index()][dst]
                .copy_from_slice(&line[half_bytes..2 * half_bytes]);
        }
        Ok(())
    }
}

impl CameraFeed for StereoImageCamera {
    fn open(&mut self, _device_index: u32, mode: CameraMode) -> Result<()> {
        let decoded = image::open(&self.path).map_err(|e| {
            Error::DeviceUnavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        self.split(rgba.as_raw(), width, height)?;
        self.open = true;
        info!(
            "Stereo image camera opened from {} ({}x{} per eye, {:?} mode ignored)",
            self.path.display(),
            self.frames.size.x,
            self.frames.size.y,
            mode
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::DeviceUnavailable("stereo image camera is closed".into()))
        }
    }

    fn image(&self, eye: Eye) -> Option<CameraImage<'_>> {
        if !self.open {
            return None;
        }
        self.frames.image(eye, PixelFormat::Rgba8)
    }

    fn close(&mut self) {
        self.frames.release();
        self.open = false;
    }
}

/// Feed used when no camera is configured; opening it always fails.
pub struct NoCamera;

impl CameraFeed for NoCamera {
    fn open(&mut self, _device_index: u32, _mode: CameraMode) -> Result<()> {
        Err(Error::DeviceUnavailable("no pass-through camera configured".into()))
    }

    fn capture(&mut self) -> Result<()> {
        Err(Error::DeviceUnavailable("no pass-through camera configured".into()))
    }

    fn image(&self, _eye: Eye) -> Option<CameraImage<'_>> {
        None
    }

    fn close(&mut self) {}
}
