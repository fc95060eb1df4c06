mod camera;
mod demo;

use std::sync::Arc;
use std::time::Instant;
use color_eyre::Result;
use glam::Vec3;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, StartCause, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use strata::{RenderConfig, Renderer, WinitWindow};
use crate::app::camera::OrbitCamera;
use crate::app::demo::DemoScene;

const ORBIT_SPEED: f32 = 0.4;

pub struct App {
    // Field order is drop order: the scene's GPU objects go before the renderer
    scene: Option<DemoScene>,
    renderer: Option<Renderer>,
    window: Option<Arc<WinitWindow>>,
    camera: OrbitCamera,

    // State
    prev_frame_time: Instant,
    delta_time_secs: f32,
    paused: bool,
    close_requested: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            scene: None,
            renderer: None,
            window: None,
            camera: OrbitCamera::new(Vec3::ZERO, 3.0),

            prev_frame_time: Instant::now(),
            delta_time_secs: 0.0,
            paused: false,
            close_requested: false,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes().with_title("strata");
        let window = Arc::new(WinitWindow::new(Arc::new(event_loop.create_window(attributes)?)));
        let mut renderer = Renderer::new(window.clone(), RenderConfig::default())?;
        let scene = DemoScene::new(&mut renderer)?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        self.scene = Some(scene);
        Ok(())
    }

    fn draw(&mut self) -> Result<()> {
        let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_mut()) else {
            return Ok(());
        };
        if !self.paused {
            scene.update(self.delta_time_secs);
            self.camera.orbit(self.delta_time_secs * ORBIT_SPEED);
        }

        let Some(frame) = renderer.begin_frame()? else {
            return Ok(());
        };
        renderer
            .resources_mut()
            .update_globals(frame.frame_index, &self.camera.uniforms(frame.extent))?;

        renderer.begin_swapchain_pass(&frame)?;
        scene.record(renderer, &frame);
        renderer.end_swapchain_pass(&frame)?;
        renderer.end_frame(frame)
    }
}

impl ApplicationHandler for App {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {
        let curr_frame_time = Instant::now();
        self.delta_time_secs = curr_frame_time.duration_since(self.prev_frame_time).as_secs_f32();
        self.prev_frame_time = curr_frame_time;
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            log::error!("Failed to initialize renderer: {:?}", err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window_id != window.window().id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                window.notify_resized();
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.draw() {
                    log::error!("Frame failed: {:?}", err);
                    event_loop.exit();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: key,
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => match key.as_ref() {
                Key::Named(NamedKey::Space) => {
                    self.paused = !self.paused;
                    log::info!("paused: {}", self.paused);
                }
                Key::Named(NamedKey::Escape) => {
                    self.close_requested = true;
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }
        if let Some(window) = self.window.as_ref() {
            window.window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.scene = None;
        self.renderer = None;
    }
}
