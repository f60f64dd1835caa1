#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use gloo_events::EventListener;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{window, HtmlCanvasElement, KeyboardEvent};

use crate::app::{ViewportProvider, Viewer};
use crate::config::ViewerConfig;
use crate::control::NotificationKind;
use crate::input::Shortcut;
use crate::render::{CameraParams, LightParams, Renderer};

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Browser entry point. Owns the viewer and drives it from
/// `requestAnimationFrame` and document key events.
#[wasm_bindgen]
pub struct WasmViewer {
    inner: Rc<RefCell<AppState>>,
    _keydown: EventListener,
}

#[wasm_bindgen]
impl WasmViewer {
    #[wasm_bindgen(constructor)]
    pub fn new(canvas_id: String, config_xml: Option<String>) -> Result<WasmViewer, JsValue> {
        let config = match config_xml {
            Some(xml) => ViewerConfig::from_xml(&xml).map_err(js_error)?,
            None => ViewerConfig::default(),
        };

        let window = window().ok_or_else(|| JsValue::from_str("window not available"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("document not available"))?;
        let canvas = document
            .get_element_by_id(&canvas_id)
            .ok_or_else(|| JsValue::from_str("canvas element not found"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str("element is not a canvas"))?;

        let renderer = Renderer::new(canvas).map_err(js_error)?;
        let viewer = Viewer::new(config).map_err(js_error)?;
        let inner = Rc::new(RefCell::new(AppState {
            viewer,
            renderer,
        }));

        let state = Rc::clone(&inner);
        let keydown = EventListener::new(&window, "keydown", move |event| {
            let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                return;
            };
            if let Some(shortcut) = Shortcut::from_name(&event.key()) {
                event.prevent_default();
                state.borrow_mut().handle_shortcut(shortcut);
            }
        });

        Ok(Self {
            inner,
            _keydown: keydown,
        })
    }

    pub fn start(&self) -> Result<(), JsValue> {
        schedule_animation_loop(Rc::clone(&self.inner)).map_err(js_error)
    }

    pub fn toggle(&self) -> Result<bool, JsValue> {
        self.inner
            .borrow_mut()
            .act(|viewer| viewer.toggle_effect())
            .map_err(js_error)
    }

    /// Slider moved; applied after the debounce delay.
    #[wasm_bindgen(js_name = updateParameter)]
    pub fn update_parameter(&self, name: &str, value: &str) {
        self.inner.borrow_mut().viewer.control_input(name, value);
    }

    /// Slider released; applied right away.
    #[wasm_bindgen(js_name = commit)]
    pub fn commit_parameter(&self, name: &str, value: &str) -> Result<(), JsValue> {
        self.inner
            .borrow_mut()
            .act(|viewer| viewer.control_commit(name, value))
            .map(|_| ())
            .map_err(js_error)
    }

    /// Runs the shortcut bound to a `KeyboardEvent.key` value, if any.
    #[wasm_bindgen(js_name = handleKey)]
    pub fn handle_key(&self, key: &str) -> bool {
        match Shortcut::from_name(key) {
            Some(shortcut) => {
                self.inner.borrow_mut().handle_shortcut(shortcut);
                true
            }
            None => false,
        }
    }

    /// Replaces the model with a glTF/GLB file read by the page, e.g. from
    /// `File.arrayBuffer()`.
    #[wasm_bindgen(js_name = loadModel)]
    pub fn load_model(&self, name: &str, bytes: Vec<u8>) -> Result<(), JsValue> {
        self.inner
            .borrow_mut()
            .act(|viewer| viewer.import_model(name, bytes))
            .map(|_| ())
            .map_err(|err| js_error(format!("{err:#}")))
    }

    /// Returns the scale actually applied after clamping.
    #[wasm_bindgen(js_name = setModelScale)]
    pub fn set_model_scale(&self, scale: f32) -> Result<f32, JsValue> {
        self.inner
            .borrow_mut()
            .act(|viewer| viewer.set_model_scale(scale))
            .map_err(js_error)
    }

    pub fn dismiss(&self) {
        self.inner
            .borrow_mut()
            .act(|viewer| viewer.dismiss_notification());
    }

    pub fn parameters(&self) -> String {
        self.inner.borrow().viewer.parameters().describe()
    }

    pub fn reset(&self) {
        self.inner
            .borrow_mut()
            .act(|viewer| viewer.reset_parameters());
    }

    pub fn inspect(&self) {
        self.inner.borrow_mut().viewer.inspect();
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.inner.borrow_mut().renderer.resize((width, height));
    }

    pub fn summary(&self) -> String {
        self.inner.borrow().viewer.summary()
    }
}

struct AppState {
    viewer: Viewer,
    renderer: Renderer,
}

impl ViewportProvider for Renderer {
    fn viewport_size(&self) -> (u32, u32) {
        self.size()
    }
}

impl AppState {
    fn handle_shortcut(&mut self, shortcut: Shortcut) {
        // The page owns its own lifetime.
        if shortcut == Shortcut::Quit {
            return;
        }
        self.act(|viewer| viewer.handle_shortcut(shortcut));
    }

    /// Runs a viewer operation and draws immediately when it asked for an
    /// off-cycle frame, without advancing animation time.
    fn act<R>(&mut self, operation: impl FnOnce(&mut Viewer) -> R) -> R {
        let result = operation(&mut self.viewer);
        if self.viewer.take_redraw_request() {
            if let Err(err) = self.draw() {
                log::error!("off-cycle render failed: {err:?}");
            }
        }
        result
    }

    fn render_frame(&mut self, now: f64) -> Result<()> {
        self.viewer.advance_frame(now);
        self.draw()
    }

    fn draw(&mut self) -> Result<()> {
        let camera = CameraParams::from_config(self.viewer.camera(), self.renderer.aspect());
        self.renderer.update_globals(&camera, &LightParams::default());
        let draws = self.viewer.draws();
        let color = match self.viewer.panel().notification().map(|n| n.kind) {
            Some(NotificationKind::Error) => "#ff6b6b",
            _ => "#9fe8ff",
        };
        self.renderer
            .render(&draws)
            .and_then(|_| self.renderer.draw_overlay(&self.viewer.overlay_lines(), color))
            .map_err(|err| {
                let message = err
                    .as_string()
                    .unwrap_or_else(|| "unknown canvas error".to_string());
                anyhow!("render failed: {message}")
            })
    }
}

fn now_seconds() -> f64 {
    window()
        .and_then(|window| window.performance())
        .map_or(0.0, |performance| performance.now() / 1000.0)
}

fn request_frame(callback: &Closure<dyn FnMut()>) -> Result<()> {
    window()
        .ok_or_else(|| anyhow!("window not available"))?
        .request_animation_frame(callback.as_ref().unchecked_ref())
        .map_err(|err| anyhow!("requestAnimationFrame failed: {err:?}"))?;
    Ok(())
}

/// Starts the frame loop. The callback re-registers itself each frame and
/// lives for the rest of the page.
fn schedule_animation_loop(app: Rc<RefCell<AppState>>) -> Result<()> {
    let callback: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
    let next = Rc::clone(&callback);

    *callback.borrow_mut() = Some(Closure::wrap(Box::new(move || {
        if let Err(err) = app.borrow_mut().render_frame(now_seconds()) {
            log::error!("{err:?}");
        }
        if let Some(callback) = next.borrow().as_ref() {
            if let Err(err) = request_frame(callback) {
                log::error!("{err:?}");
            }
        }
    }) as Box<dyn FnMut()>));

    match callback.borrow().as_ref() {
        Some(closure) => request_frame(closure),
        None => Err(anyhow!("animation callback missing")),
    }
}
