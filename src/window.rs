use std::sync::Arc;

use glam::Mat4;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

use windtrail::geo::WGS84_SEMI_MAJOR_AXIS;
use windtrail::host::{EventHandler, EventRegistry};
use windtrail::prelude::*;
use windtrail::SubscriptionToken;

/// Flat map camera: a longitude/latitude centre and a zoom.
pub struct FlatHost {
    window: Option<Arc<Window>>,
    events: EventRegistry,
    width: u32,
    height: u32,
    center_lon: f32,
    center_lat: f32,
    /// Half the visible longitude span, in degrees.
    half_span: f32,
}

impl FlatHost {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            window: None,
            events: EventRegistry::new(),
            width: width.max(1),
            height: height.max(1),
            center_lon: 0.0,
            center_lat: 0.0,
            half_span: 180.0,
        }
    }

    fn attach(&mut self, window: Arc<Window>) {
        self.window = Some(window);
    }

    pub fn emit(&mut self, event: SceneEvent) {
        self.events.emit(&event);
    }

    /// Visible rectangle in degrees, not clamped to the globe.
    fn view_degrees(&self) -> Rectangle {
        let half_lat = self.half_span * self.height as f32 / self.width as f32;
        Rectangle::new(
            self.center_lon - self.half_span,
            self.center_lat - half_lat,
            self.center_lon + self.half_span,
            self.center_lat + half_lat,
        )
    }

    fn pan_pixels(&mut self, dx: f32, dy: f32) {
        let degrees_per_pixel = 2.0 * self.half_span / self.width as f32;
        self.center_lon = (self.center_lon - dx * degrees_per_pixel).clamp(-180.0, 180.0);
        self.center_lat = (self.center_lat + dy * degrees_per_pixel).clamp(-90.0, 90.0);
    }

    fn zoom(&mut self, steps: f32) {
        self.half_span = (self.half_span * 0.9f32.powf(steps)).clamp(1.0, 180.0);
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }
}

impl SceneHost for FlatHost {
    fn compute_view_rectangle(&self) -> Option<Rectangle> {
        let view = self.view_degrees();
        Some(Rectangle::new(
            view.west.to_radians(),
            view.south.to_radians(),
            view.east.to_radians(),
            view.north.to_radians(),
        ))
    }

    fn pixel_size(&self, reference_radius: f32, width: u32, _height: u32) -> f32 {
        (2.0 * self.half_span).to_radians() * reference_radius / width.max(1) as f32
    }

    fn projection_mode(&self) -> ProjectionMode {
        ProjectionMode::Scene2D
    }

    fn view_projection(&self) -> Mat4 {
        let view = self.view_degrees();
        let m = |deg: f32| deg.to_radians() * WGS84_SEMI_MAJOR_AXIS;
        Mat4::orthographic_rh(m(view.west), m(view.east), m(view.south), m(view.north), -1.0e7, 1.0e7)
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn subscribe(&mut self, kind: SceneEventKind, handler: EventHandler) -> SubscriptionToken {
        self.events.subscribe(kind, handler)
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.events.unsubscribe(token)
    }

    fn request_render(&mut self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn fly_to(&mut self, rectangle: Rectangle, _duration: Option<f32>) {
        self.center_lon = (rectangle.west + rectangle.east) * 0.5;
        self.center_lat = (rectangle.south + rectangle.north) * 0.5;
        self.half_span = ((rectangle.east - rectangle.west) * 0.5).clamp(1.0, 180.0);
        self.emit(SceneEvent::MoveStart);
        self.emit(SceneEvent::MoveEnd);
    }
}

pub struct App {
    data: Option<WindData>,
    options: RenderOptions,
    window: Option<Arc<Window>>,
    layer: Option<WindLayer<FlatHost, WgpuBackend>>,
    mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
}

impl App {
    pub fn new(data: WindData, options: RenderOptions) -> Self {
        Self {
            data: Some(data),
            options,
            window: None,
            layer: None,
            mouse_pressed: false,
            last_mouse_pos: None,
        }
    }

    fn host(&mut self) -> Option<&mut FlatHost> {
        self.layer.as_mut().map(WindLayer::host_mut)
    }

    fn pump(&mut self, event_loop: &ActiveEventLoop) {
        let Some(layer) = self.layer.as_mut() else {
            return;
        };
        if let Err(e) = layer.pump_events() {
            log::error!("wind layer failed: {}", e);
            if !layer.system().is_usable() {
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let Some(data) = self.data.take() else {
            return;
        };

        let window_attrs = Window::default_attributes()
            .with_title("windtrail")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        let mut host = FlatHost::new(size.width, size.height);
        host.attach(window.clone());

        let backend = match pollster::block_on(WgpuBackend::new(window.clone())) {
            Ok(backend) => backend,
            Err(e) => {
                log::error!("failed to initialise the GPU: {}", e);
                event_loop.exit();
                return;
            }
        };
        match WindLayer::new(host, backend, data, self.options.clone()) {
            Ok(mut layer) => {
                let field = layer.zoom_to(None);
                log::info!("showing wind field {:?}", field);
                self.layer = Some(layer);
            }
            Err(e) => {
                log::error!("failed to start: {}", e);
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(mut layer) = self.layer.take() {
                    layer.destroy();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(host) = self.host() {
                    host.set_size(physical_size.width, physical_size.height);
                    host.emit(SceneEvent::Resize { width: physical_size.width, height: physical_size.height });
                    host.emit(SceneEvent::MoveEnd);
                }
                self.pump(event_loop);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.mouse_pressed = state == ElementState::Pressed;
                    let event = if self.mouse_pressed { SceneEvent::MoveStart } else { SceneEvent::MoveEnd };
                    if !self.mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                    if let Some(host) = self.host() {
                        host.emit(event);
                    }
                    self.pump(event_loop);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.mouse_pressed {
                    if let Some((last_x, last_y)) = self.last_mouse_pos {
                        let dx = (position.x - last_x) as f32;
                        let dy = (position.y - last_y) as f32;
                        if let Some(host) = self.host() {
                            host.pan_pixels(dx, dy);
                        }
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.1,
                };
                if let Some(host) = self.host() {
                    host.emit(SceneEvent::MoveStart);
                    host.zoom(scroll);
                    host.emit(SceneEvent::MoveEnd);
                }
                self.pump(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Some(host) = self.host() {
                    host.emit(SceneEvent::PreRender);
                }
                self.pump(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
