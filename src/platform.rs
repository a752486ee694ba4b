//! Desktop window shell
//!
//! The session loop owns the frame pacing, so the winit event loop is pumped
//! once per iteration instead of being run.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::UVec2;
use log::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::backend::RenderBackend;
use crate::config::HmdConfig;
use crate::error::{Error, Result};
use crate::input::{FrameInput, InputState};
use crate::renderer::WgpuBackend;

/// Window and message plumbing around the session loop.
pub trait Platform {
    type Backend: RenderBackend;

    /// Processes pending window messages. `false` once the app should exit.
    fn handle_messages(&mut self) -> bool;

    /// Creates the graphics device and a mirror window of `mirror_size`.
    fn init_device(&mut self, mirror_size: UVec2) -> Result<Self::Backend>;

    fn take_input(&mut self) -> FrameInput;
}

/// Window state driven by the event loop.
struct Shell {
    window: Option<Arc<Window>>,
    input: InputState,
    running: bool,
}

impl ApplicationHandler for Shell {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window_attrs = Window::default_attributes().with_title("Virtual Desktop");
        match event_loop.create_window(window_attrs) {
            Ok(window) => {
                info!("Mirror window created");
                self.window = Some(Arc::new(window));
            }
            Err(e) => {
                error!("Failed to create mirror window: {e}");
                self.running = false;
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.running = false;
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.input.handle_keyboard_input(&event);
            }
            _ => {}
        }
    }
}

pub struct DesktopPlatform {
    event_loop: EventLoop<()>,
    shell: Shell,
    lens_radius: f32,
    lens_center_offset: f32,
}

impl DesktopPlatform {
    // Attempts to get the window created on the first resume.
    const WINDOW_WAIT_ATTEMPTS: u32 = 200;

    /// Creates the event loop; the mirror lens comes from `hmd`.
    pub fn new(hmd: &HmdConfig) -> Result<Self> {
        let event_loop =
            EventLoop::new().map_err(|e| Error::DeviceUnavailable(format!("no event loop: {e}")))?;
        Ok(Self {
            event_loop,
            shell: Shell {
                window: None,
                input: InputState::new(),
                running: true,
            },
            lens_radius: hmd.lens_radius,
            lens_center_offset: hmd.lens_center_offset,
        })
    }

    fn pump(&mut self) -> bool {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.shell) {
            info!("Event loop exited with code {code}");
            self.shell.running = false;
        }
        self.shell.input.update();
        if self.shell.input.quit_requested() {
            self.shell.running = false;
        }
        self.shell.running
    }
}

impl Platform for DesktopPlatform {
    type Backend = WgpuBackend;

    fn handle_messages(&mut self) -> bool {
        self.pump()
    }

    fn init_device(&mut self, mirror_size: UVec2) -> Result<WgpuBackend> {
        for _ in 0..Self::WINDOW_WAIT_ATTEMPTS {
            if self.shell.window.is_some() || !self.pump() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        let window = self
            .shell
            .window
            .clone()
            .ok_or_else(|| Error::DeviceUnavailable("mirror window was not created".into()))?;

        // The backend picks up the final size when the resize lands.
        let _ = window.request_inner_size(PhysicalSize::new(mirror_size.x, mirror_size.y));
        let mut backend = pollster::block_on(WgpuBackend::new(window))?;
        backend.set_distortion(self.lens_radius, self.lens_center_offset);
        Ok(backend)
    }

    fn take_input(&mut self) -> FrameInput {
        self.shell.input.take_frame_input()
    }
}
