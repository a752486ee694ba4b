//! Stereo frame compositor and session loop
//!
//! One frame: query both eye poses, render the screen into each eye target
//! with that eye's camera image, then submit both targets as one frame.
//! [`main_loop`] runs frames for the lifetime of one display session and
//! [`run_with_retry`] recreates the session after the display is lost.

use std::f32::consts::TAU;
use std::thread;
use std::time::Duration;

use glam::Mat4;
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::backend::{BoundTarget, EyeTarget, RenderBackend, ScreenDraw};
use crate::camera::{CameraFeed, OpenCamera};
use crate::config::{AppConfig, ViewConfig};
use crate::error::{Error, Result, SubmitError};
use crate::platform::Platform;
use crate::pose::{self, Eye, EyeViews};
use crate::screen::ScreenMesh;
use crate::session::{DisplaySession, EyeLayer, FrameSubmission, SessionFactory, Viewport};

/// Which view matrix the screen is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenAnchor {
    /// Stays in front of the viewer; ignores head orientation.
    #[default]
    HeadLocked,
    /// Fixed in the room; follows head orientation.
    WorldLocked,
}

impl ScreenAnchor {
    pub fn select(self, views: &EyeViews) -> Mat4 {
        match self {
            ScreenAnchor::HeadLocked => views.still_view,
            ScreenAnchor::WorldLocked => views.view,
        }
    }
}

/// Progress through one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    PoseResolved,
    TargetBound(Eye),
    TextureUploaded(Eye),
    Drawn(Eye),
    TargetReleased(Eye),
    Submitted,
}

impl FramePhase {
    pub fn can_advance_to(self, next: FramePhase) -> bool {
        use FramePhase::*;
        match (self, next) {
            (Idle, PoseResolved) => true,
            (PoseResolved, TargetBound(Eye::Left)) => true,
            (TargetBound(a), TextureUploaded(b)) => a == b,
            (TextureUploaded(a), Drawn(b)) => a == b,
            (Drawn(a), TargetReleased(b)) => a == b,
            (TargetReleased(Eye::Left), TargetBound(Eye::Right)) => true,
            (TargetReleased(Eye::Right), Submitted) => true,
            (Submitted, Idle) => true,
            _ => false,
        }
    }
}

fn advance(phase: &mut FramePhase, next: FramePhase) {
    debug_assert!(phase.can_advance_to(next), "frame phase {phase:?} -> {next:?}");
    *phase = next;
}

/// How a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    /// Create a new session and run again.
    Retry,
}

impl LoopExit {
    pub fn retry_requested(self) -> bool {
        self == LoopExit::Retry
    }
}

/// Renders and submits stereo frames of the curved screen.
pub struct StereoCompositor<B: RenderBackend> {
    // Targets are released before the backend that created them.
    targets: [B::Target; 2],
    backend: B,
    anchor: ScreenAnchor,
    near: f32,
    far: f32,
    yaw: f32,
    frame_index: u64,
    phase: FramePhase,
    camera_failing: bool,
}

impl<B: RenderBackend> StereoCompositor<B> {
    pub fn new(
        mut backend: B,
        targets: [B::Target; 2],
        screen: &ScreenMesh,
        view: &ViewConfig,
        anchor: ScreenAnchor,
    ) -> Result<Self> {
        backend.load_screen(screen)?;
        Ok(Self {
            targets,
            backend,
            anchor,
            near: view.near,
            far: view.far,
            yaw: view.initial_yaw,
            frame_index: 0,
            phase: FramePhase::Idle,
            camera_failing: false,
        })
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Rotates the fixed yaw by `delta` radians.
    pub fn turn(&mut self, delta: f32) {
        if delta != 0.0 {
            self.yaw = (self.yaw + delta).rem_euclid(TAU);
        }
    }

    /// Renders both eyes and submits them as frame `frame_index`.
    ///
    /// A failed camera capture is logged once per failure streak; the eye
    /// textures then keep their previous contents.
    pub fn render_frame<S: DisplaySession>(
        &mut self,
        session: &mut S,
        camera: Option<&mut dyn CameraFeed>,
    ) -> std::result::Result<(), SubmitError> {
        let descs = Eye::ALL.map(|eye| session.eye_render_desc(eye));
        let offsets = descs.map(|desc| desc.hmd_to_eye_offset);
        let poses = session.eye_poses(self.frame_index, offsets);
        advance(&mut self.phase, FramePhase::PoseResolved);

        let mut camera = camera;
        if let Some(feed) = camera.as_deref_mut() {
            match feed.capture() {
                Ok(()) if self.camera_failing => {
                    info!("Camera capture recovered");
                    self.camera_failing = false;
                }
                Ok(()) => {}
                Err(e) if !self.camera_failing => {
                    warn!("Camera capture failed, reusing previous image: {e}");
                    self.camera_failing = true;
                }
                Err(_) => {}
            }
        }
        let camera = camera.as_deref();

        for eye in Eye::ALL {
            let i = eye.index();
            let views = pose::resolve(&poses.eyes[i], self.yaw);
            let draw = ScreenDraw {
                view: self.anchor.select(&views),
                projection: descs[i].fov.projection(self.near, self.far),
            };

            let target = &mut self.targets[i];
            {
                let mut bound = BoundTarget::bind(&mut self.backend, target);
                advance(&mut self.phase, FramePhase::TargetBound(eye));
                if let Some(image) = camera.and_then(|feed| feed.image(eye)) {
                    bound.upload_camera_image(eye, &image);
                }
                advance(&mut self.phase, FramePhase::TextureUploaded(eye));
                bound.draw_screen(eye, &draw);
                advance(&mut self.phase, FramePhase::Drawn(eye));
            }
            advance(&mut self.phase, FramePhase::TargetReleased(eye));
            self.backend.commit(target);
        }

        let layers = Eye::ALL.map(|eye| {
            let target = &self.targets[eye.index()];
            EyeLayer {
                target: target.id(),
                viewport: Viewport::from_size(target.size()),
                fov: descs[eye.index()].fov,
                render_pose: poses.eyes[eye.index()],
            }
        });
        let submission = FrameSubmission {
            eyes: layers,
            sample_time: poses.sample_time,
        };

        let result = session.submit_frame(self.frame_index, &submission);
        advance(&mut self.phase, FramePhase::Submitted);
        if result.is_ok() {
            self.frame_index += 1;
        }
        advance(&mut self.phase, FramePhase::Idle);
        result
    }

    pub fn present_mirror(&mut self) {
        self.backend.present_mirror(&self.targets);
    }
}

fn startup_failure(err: Error, retry_create: bool) -> Result<LoopExit> {
    if retry_create {
        warn!("Session startup failed, will retry: {err}");
        Ok(LoopExit::Retry)
    } else {
        Err(err)
    }
}

/// Runs one display session until it quits or is lost.
///
/// Startup failures are errors on the first attempt and retries afterwards.
/// The result asks for a retry when `retry_create` is set or the display
/// was lost.
pub fn main_loop<P, F>(
    platform: &mut P,
    sessions: &mut F,
    camera: &mut dyn CameraFeed,
    config: &AppConfig,
    retry_create: bool,
) -> Result<LoopExit>
where
    P: Platform,
    F: SessionFactory,
{
    let mut retry_create = retry_create;

    let mut session = match sessions.create_session() {
        Ok(session) => session,
        Err(e) => return startup_failure(e, retry_create),
    };
    let hmd = session.hmd_desc().clone();

    let mirror_size = config.hmd.mirror_size(hmd.resolution);
    let mut backend = match platform.init_device(mirror_size) {
        Ok(backend) => backend,
        Err(e) => return startup_failure(e, retry_create),
    };

    let left = match backend.create_eye_target(Eye::Left, session.fov_texture_size(Eye::Left)) {
        Ok(target) => target,
        Err(e) => return startup_failure(e, retry_create),
    };
    let right = match backend.create_eye_target(Eye::Right, session.fov_texture_size(Eye::Right)) {
        Ok(target) => target,
        Err(e) => return startup_failure(e, retry_create),
    };

    let screen = ScreenMesh::build(&config.screen.geometry())?;
    let mut compositor = match StereoCompositor::new(backend, [left, right], &screen, &config.view, config.screen.anchor) {
        Ok(compositor) => compositor,
        Err(e) => return startup_failure(e, retry_create),
    };

    session.recenter();

    let mut camera = match OpenCamera::open(camera, config.camera.device_index, config.camera.mode) {
        Ok(camera) => Some(camera),
        Err(e) => {
            warn!("Pass-through camera unavailable, continuing without it: {e}");
            None
        }
    };

    info!("Entering frame loop for {}", hmd.product_name);
    let mut display_lost = false;
    while platform.handle_messages() {
        let status = session.status();
        if status.should_quit {
            info!("Session asked to quit");
            retry_create = false;
            break;
        }
        if status.display_lost {
            warn!("{}", Error::SessionLost);
            display_lost = true;
            break;
        }

        let input = platform.take_input();
        if status.should_recenter || input.recenter {
            session.recenter();
        }
        compositor.turn(input.turn * config.view.yaw_step);

        if status.is_visible {
            let feed = camera.as_mut().map(|camera| camera.feed());
            if let Err(e) = compositor.render_frame(&mut session, feed) {
                error!("Frame {} submission failed: {e}", compositor.frame_index());
                display_lost = e.is_recoverable();
                break;
            }
        }

        compositor.present_mirror();
    }

    let exit = if retry_create || display_lost {
        LoopExit::Retry
    } else {
        LoopExit::Quit
    };
    debug!("Session loop ended after {} frames: {:?}", compositor.frame_index(), exit);
    Ok(exit)
}

/// Runs sessions until the user quits or the platform stops pumping.
pub fn run_with_retry<P, F>(
    platform: &mut P,
    sessions: &mut F,
    camera: &mut dyn CameraFeed,
    config: &AppConfig,
) -> Result<()>
where
    P: Platform,
    F: SessionFactory,
{
    let mut exit = main_loop(platform, sessions, camera, config, false)?;
    while exit.retry_requested() && platform.handle_messages() {
        thread::sleep(Duration::from_millis(10));
        info!("Recreating display session");
        exit = main_loop(platform, sessions, camera, config, true)?;
    }
    info!("Shutting down");
    Ok(())
}
