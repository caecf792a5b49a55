//! streak - Main Entry Point
//!
//! Opens a window, renders the particle field every frame and, on request,
//! streams the rendered frames to a video sink on background workers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use streak_core::Config;
use streak_core::config::EncoderKind;
use streak_platform::{InputHandler, InputState, MouseButton, Window};
use streak_renderer::vulkan::{ParticleDesc, VulkanGpu, VulkanGpuDesc};
use streak_renderer::{
    CaptureSettings, FfmpegEncoder, FrameEncoder, FrameOutcome, FramePipeline,
    FramePipelineConfig, RawVideoEncoder, RenderError,
};
use streak_resources::Background;
use streak_rhi::instance::Instance;
use streak_scene::{ParticleScene, SceneAction};

const SHADER_DIR: &str = "shaders/spirv";

#[derive(Parser, Debug)]
#[command(name = "streak", version, about = "Real-time GPU particle viewer with video capture")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start with frame capture enabled
    #[arg(long)]
    record: bool,
}

/// Everything that exists while the window is open.
///
/// Fields drop in declaration order: the pipeline releases its GPU
/// resources before the window backing the surface goes away.
struct Viewer {
    pipeline: FramePipeline<VulkanGpu>,
    scene: ParticleScene,
    window: Window,
    last_fps: u32,
}

impl Viewer {
    fn new(event_loop: &ActiveEventLoop, config: &Config) -> Result<Self> {
        let window = Window::new(
            event_loop,
            config.window.width,
            config.window.height,
            &config.window.title,
        )
        .context("Failed to create window")?;

        let extensions = window
            .required_extensions()
            .context("Failed to query surface extensions")?;
        let instance = Instance::new(cfg!(debug_assertions), &extensions)
            .context("Failed to create Vulkan instance")?;
        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .context("Failed to create surface")?;

        let particles = &config.particles;
        let background =
            Background::load_or_gradient(&particles.background, particles.grid_x, particles.grid_y)
                .context("Failed to load background image")?;

        let gpu = VulkanGpu::new(
            instance,
            surface,
            &VulkanGpuDesc {
                vertex_shader: Path::new(SHADER_DIR).join("particles.vert.spv"),
                fragment_shader: Path::new(SHADER_DIR).join("particles.frag.spv"),
                particles: ParticleDesc {
                    grid_x: particles.grid_x,
                    grid_y: particles.grid_y,
                    bounds: particles.bounds,
                    background: &background,
                },
            },
        )
        .context("Failed to initialize Vulkan backend")?;

        let encoder: Box<dyn FrameEncoder> = match config.capture.encoder {
            EncoderKind::Ffmpeg => Box::new(FfmpegEncoder::new(&config.capture.ffmpeg_path)),
            EncoderKind::Raw => Box::new(RawVideoEncoder::new()),
        };

        let pipeline_config = FramePipelineConfig {
            vertex_count: gpu.particle_count(),
            ..Default::default()
        };
        let pipeline = FramePipeline::new(gpu, encoder, pipeline_config, window.extent())
            .context("Failed to create frame pipeline")?;

        let mut scene = ParticleScene::new(&config.particles, &config.camera);
        scene.on_resize(window.width(), window.height());

        Ok(Self {
            pipeline,
            scene,
            window,
            last_fps: 0,
        })
    }

    fn set_capture(&mut self, enabled: bool, settings: &CaptureSettings) {
        match self.pipeline.set_capture_enabled(enabled, settings) {
            Ok(()) if enabled => info!("Capturing to {}", settings.path.display()),
            Ok(()) => info!("Capture stopped"),
            Err(e) => error!("Failed to switch capture: {}", e),
        }
    }

    /// Runs one frame. Returns false once the viewer should close.
    fn frame(&mut self, input: &InputState, settings: &CaptureSettings) -> bool {
        for action in self.scene.take_actions() {
            match action {
                SceneAction::Quit => self.pipeline.stop(),
                SceneAction::ToggleCapture => {
                    let enable = !self.pipeline.is_capturing();
                    self.set_capture(enable, settings);
                }
            }
        }

        self.scene.update(input);
        let outcome = self.pipeline.render_one_frame(&self.scene.push_constants());

        if let Some(e) = self.pipeline.take_capture_error() {
            warn!("Capture stopped after a sink error: {}", e);
        }

        match outcome {
            Ok(FrameOutcome::Stopped) => return false,
            Ok(FrameOutcome::SurfaceRecreated) => {
                if let Some(extent) = self.pipeline.extent() {
                    self.scene.on_resize(extent.width, extent.height);
                }
            }
            Ok(FrameOutcome::Presented | FrameOutcome::Skipped) => {}
            Err(e) => {
                if !recoverable("Frame dropped", &e) {
                    return false;
                }
            }
        }

        let fps = self.scene.timer().fps();
        if fps != self.last_fps {
            self.last_fps = fps;
            self.window.set_title(&format!("streak - {} fps", fps));
        }
        true
    }
}

/// Logs a render error. Returns false if the viewer has to close.
fn recoverable(context: &str, err: &RenderError) -> bool {
    if err.is_fatal() {
        error!("{}: {}", context, err);
        false
    } else {
        warn!("{}: {}", context, err);
        true
    }
}

struct App {
    config: Config,
    record: bool,
    capture: CaptureSettings,
    viewer: Option<Viewer>,
    input: InputState,
}

impl App {
    fn new(config: Config, record: bool) -> Self {
        let capture = CaptureSettings::new(
            config.capture.output.clone(),
            config.capture.width,
            config.capture.height,
            config.capture.fps,
        );
        Self {
            config,
            record,
            capture,
            viewer: None,
            input: InputState::new(),
        }
    }

    fn handle_input(viewer: &mut Viewer, input: &mut InputState, event: &WindowEvent) {
        let scene = &mut viewer.scene;
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                if event.state.is_pressed() {
                    if input.on_key_pressed(key) {
                        scene.on_key_down(key);
                    }
                } else if input.on_key_released(key) {
                    scene.on_key_up(key);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = (position.x as f32, position.y as f32);
                let (dx, dy) = input.on_mouse_moved(x, y);
                if input.any_mouse_pressed() {
                    scene.on_mouse_drag(x, y, dx, dy);
                } else {
                    scene.on_mouse_move(x, y, dx, dy);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = MouseButton::from(*button);
                match state {
                    ElementState::Pressed => {
                        input.on_mouse_pressed(button);
                        scene.on_mouse_button_down(button);
                    }
                    ElementState::Released => {
                        input.on_mouse_released(button);
                        scene.on_mouse_button_up(button);
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32,
                };
                input.on_scroll(delta);
                scene.on_scroll(delta);
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        match Viewer::new(event_loop, &self.config) {
            Ok(mut viewer) => {
                if self.record {
                    viewer.set_capture(true, &self.capture);
                }
                info!("Initialization complete, entering main loop");
                self.viewer = Some(viewer);
            }
            Err(e) => {
                error!("Failed to initialize: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                viewer.pipeline.stop();
                self.viewer = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                viewer.window.resize(size.width, size.height);
                viewer.scene.on_resize(size.width, size.height);
                if let Err(e) = viewer.pipeline.on_resize(viewer.window.extent()) {
                    if !recoverable("Resize failed", &e) {
                        self.viewer = None;
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if !viewer.frame(&self.input, &self.capture) {
                    self.viewer = None;
                    event_loop.exit();
                }
            }
            other => Self::handle_input(viewer, &mut self.input, &other),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.input.begin_frame();
        if let Some(ref viewer) = self.viewer {
            viewer.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => streak_core::config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => streak_core::config::load(),
    };

    streak_core::init_logging(&config.logging.filter);
    info!("Starting streak");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, args.record);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_errors_keep_the_viewer_open() {
        let err = RenderError::SurfaceInvalid("out of date".into());
        assert!(recoverable("Resize failed", &err));
    }

    #[test]
    fn test_fatal_errors_close_the_viewer() {
        let err = RenderError::DeviceLost("fence timeout".into());
        assert!(!recoverable("Resize failed", &err));
    }
}
