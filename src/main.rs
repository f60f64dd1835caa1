use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use log::info;
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey as WinitNamedKey};
use winit::window::{WindowAttributes, WindowId};

use hologram_viewer::app::{ViewportProvider, Viewer, WindowViewport};
use hologram_viewer::config::ViewerConfig;
use hologram_viewer::input::{KeyCode, NamedKey, Shortcut};
use hologram_viewer::render::{CameraParams, LightParams, Renderer};

const FRAME_SECONDS: f64 = 1.0 / 60.0;
const DEFAULT_FRAMES: u32 = 60;

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let config = match &options.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    let viewer = Viewer::new(config)?;

    if options.summary_only {
        return run_headless(viewer, options.frames);
    }

    let mut app = InteractiveApp::new(viewer);
    match run_interactive(&mut app) {
        Ok(()) => {
            if let Some(viewer) = app.viewer.take() {
                println!("{}", viewer.summary());
                viewer.dispose();
            }
            Ok(())
        }
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!(
                "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
            );
            let viewer = app
                .viewer
                .take()
                .ok_or_else(|| anyhow!("viewer was lost during window setup"))?;
            run_headless(viewer, options.frames)
        }
        Err(err) => Err(err),
    }
}

/// Advances a fixed number of 60 Hz frames and prints the final state.
fn run_headless(mut viewer: Viewer, frames: u32) -> Result<()> {
    for frame in 0..=frames {
        viewer.advance_frame(f64::from(frame) * FRAME_SECONDS);
    }
    println!("{}", viewer.summary());
    viewer.dispose();
    Ok(())
}

fn run_interactive(app: &mut InteractiveApp) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| WindowInitError::new("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop
        .run_app(app)
        .context("event loop terminated abnormally")?;
    match app.last_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Running {
    renderer: Renderer,
    viewport: WindowViewport,
}

struct InteractiveApp {
    viewer: Option<Viewer>,
    running: Option<Running>,
    started: Instant,
    last_error: Option<anyhow::Error>,
}

impl InteractiveApp {
    fn new(viewer: Viewer) -> Self {
        Self {
            viewer: Some(viewer),
            running: None,
            started: Instant::now(),
            last_error: None,
        }
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let attributes = WindowAttributes::default()
            .with_title("Hologram Viewer")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::new("window", err))?,
        );
        let size = window.inner_size();
        let renderer = block_on(Renderer::new(window))?;
        info!("window ready at {}x{}", size.width, size.height);
        Ok(Running {
            renderer,
            viewport: WindowViewport::new(size.width, size.height),
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        let repeated = event.repeat && !is_step_key(&event.logical_key);
        if event.state != ElementState::Pressed || repeated {
            return;
        }
        let Some(shortcut) = map_key(&event.logical_key).and_then(Shortcut::from_key) else {
            return;
        };
        if shortcut == Shortcut::Quit {
            info!("escape pressed, exiting");
            event_loop.exit();
            return;
        }
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        viewer.handle_shortcut(shortcut);
        if let Some(notification) = viewer.panel().notification() {
            info!("{}", notification.text);
        }
        if viewer.take_redraw_request() {
            if let Err(err) = self.draw() {
                self.fail(event_loop, err);
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = self.started.elapsed().as_secs_f64();
        if let Some(viewer) = self.viewer.as_mut() {
            viewer.advance_frame(now);
        }
        if let Err(err) = self.draw() {
            self.fail(event_loop, err);
        }
    }

    fn draw(&mut self) -> Result<()> {
        let (Some(viewer), Some(running)) = (self.viewer.as_ref(), self.running.as_mut()) else {
            return Ok(());
        };
        let camera = CameraParams::from_config(viewer.camera(), running.viewport.aspect());
        running
            .renderer
            .update_globals(&camera, &LightParams::default());
        match running.renderer.render(&viewer.draws()) {
            Ok(()) => Ok(()),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = running.renderer.window().inner_size();
                running.renderer.resize(size);
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(anyhow!("GPU is out of memory")),
            Err(err) => {
                info!("surface error ({err}); retrying next frame");
                Ok(())
            }
        }
    }
}

impl ApplicationHandler for InteractiveApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.create_window(event_loop) {
            Ok(running) => {
                info!("press e to toggle the hologram effect, h for the panel, escape to quit");
                self.running = Some(running);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self
            .running
            .as_ref()
            .map_or(true, |running| running.renderer.window_id() != window_id)
        {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(running) = self.running.as_mut() {
                    running.renderer.resize(size);
                    running.viewport.update(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.as_ref() {
            running.renderer.window().request_redraw();
        }
    }
}

fn is_step_key(key: &Key) -> bool {
    matches!(
        key,
        Key::Named(
            WinitNamedKey::ArrowUp
                | WinitNamedKey::ArrowDown
                | WinitNamedKey::ArrowLeft
                | WinitNamedKey::ArrowRight
        )
    )
}

fn map_key(key: &Key) -> Option<KeyCode> {
    let named = match key {
        Key::Named(WinitNamedKey::Space) => NamedKey::Space,
        Key::Named(WinitNamedKey::Enter) => NamedKey::Enter,
        Key::Named(WinitNamedKey::Tab) => NamedKey::Tab,
        Key::Named(WinitNamedKey::ArrowLeft) => NamedKey::Left,
        Key::Named(WinitNamedKey::ArrowRight) => NamedKey::Right,
        Key::Named(WinitNamedKey::ArrowUp) => NamedKey::Up,
        Key::Named(WinitNamedKey::ArrowDown) => NamedKey::Down,
        Key::Named(WinitNamedKey::Escape) => NamedKey::Escape,
        Key::Character(text) => return KeyCode::from_name(text.as_str()),
        _ => return None,
    };
    Some(KeyCode::Named(named))
}

struct CliOptions {
    config: Option<PathBuf>,
    summary_only: bool,
    frames: u32,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut config = None;
        let mut summary_only = false;
        let mut frames = DEFAULT_FRAMES;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--frames" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--frames expects a frame count"))?;
                    frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count {value:?}"))?;
                }
                other if other.starts_with("--") => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Usage: hologram-viewer [config.xml] [--summary-only] [--frames N]"
                    ));
                }
                path if config.is_none() => config = Some(PathBuf::from(path)),
                extra => return Err(anyhow!("Unexpected argument: {extra}")),
            }
        }
        Ok(Self {
            config,
            summary_only,
            frames,
        })
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn new(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}
