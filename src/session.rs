//! Display and tracking session
//!
//! [`DisplaySession`] is the seam to the headset runtime: it describes the
//! device, reports tracked eye poses and accepts one frame submission per
//! frame. Dropping a session destroys it. [`SimulatedHmd`] implements it for
//! desktop runs without a headset.

use std::time::Instant;

use glam::{EulerRot, Quat, UVec2, Vec3};
use log::{debug, info};

use crate::backend::TargetId;
use crate::config::HmdConfig;
use crate::error::{Result, SubmitError};
use crate::pose::{Eye, FieldOfView, Pose};

/// Static description of the headset.
#[derive(Debug, Clone, PartialEq)]
pub struct HmdDesc {
    pub product_name: String,
    /// Recommended per-eye render target size.
    pub resolution: UVec2,
    pub default_fov: [FieldOfView; 2],
}

/// Per-eye rendering parameters. May change between frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeRenderDesc {
    pub eye: Eye,
    pub fov: FieldOfView,
    pub hmd_to_eye_offset: Vec3,
}

/// Eye poses predicted for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoses {
    pub eyes: [Pose; 2],
    /// Seconds on the session clock when the poses were sampled.
    pub sample_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub should_quit: bool,
    pub should_recenter: bool,
    pub is_visible: bool,
    pub display_lost: bool,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            should_quit: false,
            should_recenter: false,
            is_visible: true,
            display_lost: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn from_size(size: UVec2) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.x,
            height: size.y,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One eye of a frame submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeLayer {
    pub target: TargetId,
    pub viewport: Viewport,
    pub fov: FieldOfView,
    pub render_pose: Pose,
}

/// Both eye images of one frame, handed over atomically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSubmission {
    pub eyes: [EyeLayer; 2],
    pub sample_time: f64,
}

pub trait DisplaySession {
    fn hmd_desc(&self) -> &HmdDesc;

    fn eye_render_desc(&self, eye: Eye) -> EyeRenderDesc;

    /// Render target size that covers `eye`'s default field of view.
    fn fov_texture_size(&self, eye: Eye) -> UVec2;

    /// Poses of both eyes for `frame_index`, one query per frame.
    fn eye_poses(&mut self, frame_index: u64, hmd_to_eye_offsets: [Vec3; 2]) -> TrackedPoses;

    fn status(&mut self) -> SessionStatus;

    /// Makes the current head yaw and position the tracking origin.
    fn recenter(&mut self);

    fn submit_frame(&mut self, frame_index: u64, frame: &FrameSubmission) -> std::result::Result<(), SubmitError>;
}

/// Creates display sessions; called again after a session is lost.
pub trait SessionFactory {
    type Session: DisplaySession;

    fn create_session(&mut self) -> Result<Self::Session>;
}

/// Headset stand-in driven by a small synthetic head motion.
pub struct SimulatedHmd {
    config: HmdConfig,
    desc: HmdDesc,
    started: Instant,
    /// Inverse of the yaw captured at the last recenter.
    origin: Quat,
    last_submitted: Option<u64>,
}

impl SimulatedHmd {
    pub fn new(config: HmdConfig) -> Self {
        let desc = HmdDesc {
            product_name: config.product_name.clone(),
            resolution: config.eye_resolution(),
            default_fov: [config.fov(Eye::Left), config.fov(Eye::Right)],
        };
        Self {
            config,
            desc,
            started: Instant::now(),
            origin: Quat::IDENTITY,
            last_submitted: None,
        }
    }

    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Raw head orientation before the tracking origin is applied.
    fn head_motion(&self, time: f32) -> Quat {
        if !self.config.sway {
            return Quat::IDENTITY;
        }
        let wander = (time * 0.2).sin() * 0.05;
        let breathing = (time * 0.5).sin() * 0.01;
        let sway = (time * 0.3).sin() * 0.005;
        Quat::from_euler(EulerRot::YXZ, wander, breathing, sway)
    }
}

impl DisplaySession for SimulatedHmd {
    fn hmd_desc(&self) -> &HmdDesc {
        &self.desc
    }

    fn eye_render_desc(&self, eye: Eye) -> EyeRenderDesc {
        EyeRenderDesc {
            eye,
            fov: self.desc.default_fov[eye.index()],
            hmd_to_eye_offset: self.config.eye_offset(eye),
        }
    }

    fn fov_texture_size(&self, _eye: Eye) -> UVec2 {
        self.desc.resolution
    }

    fn eye_poses(&mut self, _frame_index: u64, hmd_to_eye_offsets: [Vec3; 2]) -> TrackedPoses {
        let sample_time = self.elapsed();
        let orientation = self.origin * self.head_motion(sample_time as f32);
        let head = Pose::new(orientation, Vec3::new(0.0, self.config.head_height, 0.0));
        TrackedPoses {
            eyes: [head.eye(hmd_to_eye_offsets[0]), head.eye(hmd_to_eye_offsets[1])],
            sample_time,
        }
    }

    fn status(&mut self) -> SessionStatus {
        SessionStatus::default()
    }

    fn recenter(&mut self) {
        let (yaw, _, _) = self.head_motion(self.elapsed() as f32).to_euler(EulerRot::YXZ);
        self.origin = Quat::from_rotation_y(-yaw);
        info!("Tracking origin recentered (yaw {:.3} rad)", yaw);
    }

    fn submit_frame(&mut self, frame_index: u64, frame: &FrameSubmission) -> std::result::Result<(), SubmitError> {
        if let Some(last) = self.last_submitted {
            if frame_index <= last {
                return Err(SubmitError::Rejected(format!(
                    "frame {frame_index} submitted after frame {last}"
                )));
            }
        }
        if let Some(eye) = frame.eyes.iter().position(|layer| layer.viewport.is_empty()) {
            return Err(SubmitError::Rejected(format!("empty viewport for {} eye", Eye::ALL[eye].name())));
        }
        self.last_submitted = Some(frame_index);
        debug!("Frame {} submitted at {:.4}s", frame_index, frame.sample_time);
        Ok(())
    }
}

impl Drop for SimulatedHmd {
    fn drop(&mut self) {
        info!("Session destroyed ({})", self.desc.product_name);
    }
}

pub struct SimulatedHmdFactory {
    config: HmdConfig,
}

impl SimulatedHmdFactory {
    pub fn new(config: HmdConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for SimulatedHmdFactory {
    type Session = SimulatedHmd;

    fn create_session(&mut self) -> Result<SimulatedHmd> {
        let session = SimulatedHmd::new(self.config.clone());
        info!(
            "Session created: {} ({}x{} per eye)",
            session.desc.product_name, session.desc.resolution.x, session.desc.resolution.y
        );
        Ok(session)
    }
}
