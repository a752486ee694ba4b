//! Virtual Desktop
//!
//! Renders a large curved screen inside a head-mounted display and textures it
//! with the headset's stereo pass-through camera, so the wearer sees a virtual
//! desktop while still seeing the room.
//!
//! The screen mesh is built once; every frame the compositor resolves both eye
//! poses, draws the screen into each eye target with that eye's camera image
//! and submits the pair to the display session.

pub mod backend;
pub mod camera;
pub mod compositor;
pub mod config;
pub mod error;
pub mod input;
pub mod platform;
pub mod pose;
pub mod renderer;
pub mod screen;
pub mod session;
pub mod vertex;

use anyhow::Context;
use log::info;

pub use compositor::{main_loop, run_with_retry, LoopExit, ScreenAnchor, StereoCompositor};
pub use config::AppConfig;
pub use error::{Error, Result, SubmitError};
pub use screen::{ScreenGeometry, ScreenMesh};

/// Opens the mirror window and runs the simulated headset until the user quits.
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    let mut platform = platform::DesktopPlatform::new(&config.hmd).context("cannot start the window system")?;
    let mut sessions = session::SimulatedHmdFactory::new(config.hmd.clone());
    let mut camera = camera::from_config(&config.camera);
    info!("Camera source: {:?}", config.camera.source);

    run_with_retry(&mut platform, &mut sessions, camera.as_mut(), &config)?;
    Ok(())
}
