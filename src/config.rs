//! TOML configuration
//!
//! Every field has a default, so an empty file (or no file at all) gives the
//! reference setup: a 4 m wide screen 3 m away, the test-pattern camera and a
//! simulated headset.

use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use glam::{UVec2, Vec3};
use log::info;
use serde::Deserialize;

use crate::camera::CameraMode;
use crate::compositor::ScreenAnchor;
use crate::error::{Error, Result};
use crate::pose::{Eye, FieldOfView};
use crate::screen::{ScreenGeometry, DEFAULT_DIVISIONS};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub screen: ScreenConfig,
    pub camera: CameraConfig,
    pub view: ViewConfig,
    pub hmd: HmdConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ViewConfig { near, far, .. } = self.view;
        if !(near > 0.0 && far > near) {
            return Err(Error::Config(format!(
                "view planes must satisfy 0 < near < far, got near = {near}, far = {far}"
            )));
        }
        if self.hmd.resolution.contains(&0) {
            return Err(Error::Config("hmd resolution must be non-zero".into()));
        }
        if !(self.hmd.mirror_scale > 0.0) {
            return Err(Error::Config("mirror_scale must be positive".into()));
        }
        if !(self.hmd.lens_radius >= 0.0 && self.hmd.lens_center_offset.is_finite()) {
            return Err(Error::Config("lens_radius must be non-negative and lens_center_offset finite".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub width: f32,
    pub height: f32,
    pub divisions: u32,
    pub reversing: bool,
    pub curved: bool,
    pub anchor: ScreenAnchor,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.9,
            z: 3.0,
            width: 4.0,
            height: 1.4,
            divisions: DEFAULT_DIVISIONS,
            reversing: false,
            curved: true,
            anchor: ScreenAnchor::default(),
        }
    }
}

impl ScreenConfig {
    pub fn geometry(&self) -> ScreenGeometry {
        ScreenGeometry {
            reversing: self.reversing,
            curved: self.curved,
            ..ScreenGeometry::new(self.x, self.y, self.z, self.width, self.height)
                .with_divisions(self.divisions)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraSource {
    #[default]
    TestPattern,
    StereoImage,
    None,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub source: CameraSource,
    pub device_index: u32,
    pub mode: CameraMode,
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub near: f32,
    pub far: f32,
    /// Starting fixed yaw in radians. π turns the view toward +Z, where the
    /// screen sits.
    pub initial_yaw: f32,
    /// Yaw change per frame while a rotate input is held.
    pub yaw_step: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            near: 0.2,
            far: 1000.0,
            initial_yaw: PI,
            yaw_step: 0.02,
        }
    }
}

/// Description of the simulated headset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HmdConfig {
    pub product_name: String,
    /// Per-eye render target size.
    pub resolution: [u32; 2],
    pub ipd: f32,
    pub head_height: f32,
    /// Half angles in degrees; outer/inner are mirrored between the eyes.
    pub fov_up: f32,
    pub fov_down: f32,
    pub fov_outer: f32,
    pub fov_inner: f32,
    /// Mirror window size relative to the side-by-side eye images.
    pub mirror_scale: f32,
    /// Lens circle radius of the mirror distortion, in half-viewport units.
    pub lens_radius: f32,
    /// Horizontal lens center shift in texture coordinates, positive to the right.
    pub lens_center_offset: f32,
    /// Small breathing motion on the simulated head.
    pub sway: bool,
}

impl Default for HmdConfig {
    fn default() -> Self {
        Self {
            product_name: "Simulated HMD".into(),
            resolution: [1080, 1200],
            ipd: 0.063,
            head_height: 1.6,
            fov_up: 55.82,
            fov_down: 55.71,
            fov_outer: 54.42,
            fov_inner: 51.27,
            mirror_scale: 0.5,
            lens_radius: 1.0,
            lens_center_offset: 0.0,
            sway: true,
        }
    }
}

impl HmdConfig {
    pub fn eye_resolution(&self) -> UVec2 {
        UVec2::from(self.resolution)
    }

    pub fn fov(&self, eye: Eye) -> FieldOfView {
        let (left, right) = match eye {
            Eye::Left => (self.fov_outer, self.fov_inner),
            Eye::Right => (self.fov_inner, self.fov_outer),
        };
        FieldOfView::from_degrees(self.fov_up, self.fov_down, left, right)
    }

    /// Head-to-eye offset in head-local coordinates.
    pub fn eye_offset(&self, eye: Eye) -> Vec3 {
        let half = self.ipd / 2.0;
        match eye {
            Eye::Left => Vec3::new(-half, 0.0, 0.0),
            Eye::Right => Vec3::new(half, 0.0, 0.0),
        }
    }

    /// Mirror window size for two side-by-side eye images of `eye_resolution`.
    pub fn mirror_size(&self, eye_resolution: UVec2) -> UVec2 {
        let full = eye_resolution * UVec2::new(2, 1);
        (full.as_vec2() * self.mirror_scale).as_uvec2().max(UVec2::ONE)
    }
}
