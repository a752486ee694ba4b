//! Render target provider
//!
//! The compositor draws through [`RenderBackend`] so the frame loop does not
//! depend on a particular graphics API. [`crate::renderer::WgpuBackend`] is
//! the GPU implementation.

use glam::{Mat4, UVec2};

use crate::camera::CameraImage;
use crate::error::Result;
use crate::pose::Eye;
use crate::screen::ScreenMesh;

/// Handle of an eye render target as seen by the display session.
pub type TargetId = u32;

pub trait EyeTarget {
    fn id(&self) -> TargetId;
    fn size(&self) -> UVec2;
}

/// Matrices for one draw of the screen mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenDraw {
    pub view: Mat4,
    pub projection: Mat4,
}

impl ScreenDraw {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

pub trait RenderBackend {
    type Target: EyeTarget;

    fn create_eye_target(&mut self, eye: Eye, size: UVec2) -> Result<Self::Target>;

    /// Uploads the screen geometry. Called once per device.
    fn load_screen(&mut self, mesh: &ScreenMesh) -> Result<()>;

    fn bind_and_clear(&mut self, target: &mut Self::Target);

    /// Replaces the camera texture used for `eye`.
    fn upload_camera_image(&mut self, eye: Eye, image: &CameraImage<'_>);

    fn draw_screen(&mut self, target: &mut Self::Target, eye: Eye, draw: &ScreenDraw);

    fn unbind(&mut self, target: &mut Self::Target);

    /// Makes the rendered contents of `target` available to the display.
    fn commit(&mut self, target: &mut Self::Target);

    /// Shows both eye targets in the desktop window.
    fn present_mirror(&mut self, targets: &[Self::Target; 2]);
}

/// A bound and cleared eye target; unbinds on drop.
pub struct BoundTarget<'a, B: RenderBackend> {
    backend: &'a mut B,
    target: &'a mut B::Target,
}

impl<'a, B: RenderBackend> BoundTarget<'a, B> {
    pub fn bind(backend: &'a mut B, target: &'a mut B::Target) -> Self {
        backend.bind_and_clear(target);
        Self { backend, target }
    }

    pub fn upload_camera_image(&mut self, eye: Eye, image: &CameraImage<'_>) {
        self.backend.upload_camera_image(eye, image);
    }

    pub fn draw_screen(&mut self, eye: Eye, draw: &ScreenDraw) {
        self.backend.draw_screen(self.target, eye, draw);
    }
}

impl<B: RenderBackend> Drop for BoundTarget<'_, B> {
    fn drop(&mut self) {
        self.backend.unbind(self.target);
    }
}
