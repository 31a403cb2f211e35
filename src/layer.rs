//! Host-facing layer.
//!
//! [`WindLayer`] attaches a [`WindParticleSystem`] to a [`SceneHost`]. Host
//! events are queued by the subscribed handlers and applied by
//! [`WindLayer::pump_events`], which the host calls from its own loop:
//!
//! ```ignore
//! host.emit(SceneEvent::PreRender);
//! layer.pump_events()?;
//! ```

use crate::error::WindError;
use crate::field::WindData;
use crate::geo::{Rectangle, WGS84_MAXIMUM_RADIUS};
use crate::gpu::GpuBackend;
use crate::host::{SceneEvent, SceneEventKind, SceneHost, SubscriptionToken};
use crate::options::{OptionsDiff, OptionsPatch, RenderOptions};
use crate::system::WindParticleSystem;
use crate::viewer::ViewerParameters;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

type Mailbox = Rc<RefCell<VecDeque<SceneEvent>>>;

/// Wind trails bound to a host scene.
pub struct WindLayer<H: SceneHost, B: GpuBackend> {
    host: H,
    system: WindParticleSystem<B>,
    mailbox: Mailbox,
    tokens: Vec<SubscriptionToken>,
    /// Visibility requested by the user, restored after camera moves.
    show: bool,
    destroyed: bool,
}

impl<H: SceneHost, B: GpuBackend> WindLayer<H, B> {
    /// Build the system from the host's current view and subscribe to its
    /// events.
    pub fn new(mut host: H, backend: B, data: WindData, options: RenderOptions) -> Result<Self, WindError> {
        let viewer = viewer_parameters(&host);
        let system = WindParticleSystem::new(backend, data, options, viewer)?;

        let mailbox: Mailbox = Rc::new(RefCell::new(VecDeque::new()));
        let tokens = SceneEventKind::ALL
            .iter()
            .map(|&kind| {
                let sink = Rc::clone(&mailbox);
                host.subscribe(kind, Box::new(move |event: &SceneEvent| sink.borrow_mut().push_back(*event)))
            })
            .collect();

        host.request_render();
        Ok(Self { host, system, mailbox, tokens, show: true, destroyed: false })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn system(&self) -> &WindParticleSystem<B> {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut WindParticleSystem<B> {
        &mut self.system
    }

    /// Apply every queued host event in arrival order.
    ///
    /// Stops at the first failing event; later events stay queued.
    pub fn pump_events(&mut self) -> Result<(), WindError> {
        loop {
            let Some(event) = self.mailbox.borrow_mut().pop_front() else {
                return Ok(());
            };
            self.handle_event(&event)?;
        }
    }

    /// Queued events not yet applied.
    pub fn pending_events(&self) -> usize {
        self.mailbox.borrow().len()
    }

    fn handle_event(&mut self, event: &SceneEvent) -> Result<(), WindError> {
        if self.destroyed {
            log::warn!("ignoring {:?}: wind layer destroyed", event.kind());
            return Ok(());
        }
        match *event {
            SceneEvent::MoveStart => {
                self.system.set_show(false);
                Ok(())
            }
            SceneEvent::MoveEnd => {
                let viewer = viewer_parameters(&self.host);
                log::debug!(
                    "view moved: lon {:?}, lat {:?}, {} m/px",
                    viewer.lon_range,
                    viewer.lat_range,
                    viewer.pixel_size
                );
                self.system.apply_viewer_parameters(viewer);
                self.system.set_show(self.show);
                Ok(())
            }
            SceneEvent::PreRender => self.system.render_frame(&self.host.frame_inputs()),
            SceneEvent::Resize { width, height } => {
                self.system.remove_primitives();
                let resized = self.system.resize(width, height);
                self.system.add_primitives();
                self.system.set_show(self.show);
                resized
            }
        }
    }

    pub fn show(&self) -> bool {
        self.show
    }

    /// Show or hide the trails. Simulation state is kept while hidden.
    pub fn set_show(&mut self, show: bool) {
        self.show = show;
        self.system.set_show(show);
        self.host.request_render();
    }

    /// Fly the host camera to the field bounds and return them.
    pub fn zoom_to(&mut self, duration: Option<f32>) -> Rectangle {
        let rect = self.system.field_rectangle();
        self.host.fly_to(rect, duration);
        rect
    }

    pub fn default_options() -> RenderOptions {
        RenderOptions::default()
    }

    pub fn options(&self) -> &RenderOptions {
        self.system.options()
    }

    pub fn update_wind_data(&mut self, data: WindData) -> Result<(), WindError> {
        self.system.update_wind_data(data)?;
        self.host.request_render();
        Ok(())
    }

    pub fn update_options(&mut self, patch: &OptionsPatch) -> Result<OptionsDiff, WindError> {
        let diff = self.system.change_options(patch)?;
        self.host.request_render();
        Ok(diff)
    }

    /// Unsubscribe from the host and detach the passes. GPU resources stay
    /// allocated until [`destroy`](Self::destroy).
    pub fn remove(&mut self) {
        for token in self.tokens.drain(..) {
            if !self.host.unsubscribe(token) {
                log::warn!("host did not know subscription {:?}", token);
            }
        }
        self.mailbox.borrow_mut().clear();
        self.system.remove_primitives();
    }

    /// Remove from the host and release every GPU resource. Safe to call
    /// more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.remove();
        self.system.destroy();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl<H: SceneHost, B: GpuBackend> Drop for WindLayer<H, B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn viewer_parameters<H: SceneHost + ?Sized>(host: &H) -> ViewerParameters {
    let (width, height) = host.drawing_buffer_size();
    ViewerParameters::from_host(
        host.compute_view_rectangle(),
        host.pixel_size(WGS84_MAXIMUM_RADIUS, width, height),
        host.projection_mode(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::cpu::CpuBackend;
    use crate::host::{EventHandler, EventRegistry};
    use crate::viewer::ProjectionMode;
    use glam::{Mat4, Vec2};

    #[derive(Debug, Default)]
    struct TestHost {
        events: EventRegistry,
        view: Option<Rectangle>,
        meters_per_pixel: f32,
        renders_requested: u32,
        flown_to: Option<Rectangle>,
    }

    impl TestHost {
        fn emit(&mut self, event: SceneEvent) {
            self.events.emit(&event);
        }
    }

    impl SceneHost for TestHost {
        fn compute_view_rectangle(&self) -> Option<Rectangle> {
            self.view
        }

        fn pixel_size(&self, _reference_radius: f32, _w: u32, _h: u32) -> f32 {
            self.meters_per_pixel
        }

        fn projection_mode(&self) -> ProjectionMode {
            ProjectionMode::Scene2D
        }

        fn view_projection(&self) -> Mat4 {
            Mat4::IDENTITY
        }

        fn drawing_buffer_size(&self) -> (u32, u32) {
            (16, 16)
        }

        fn subscribe(&mut self, kind: SceneEventKind, handler: EventHandler) -> SubscriptionToken {
            self.events.subscribe(kind, handler)
        }

        fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
            self.events.unsubscribe(token)
        }

        fn request_render(&mut self) {
            self.renders_requested += 1;
        }

        fn fly_to(&mut self, rectangle: Rectangle, _duration: Option<f32>) {
            self.flown_to = Some(rectangle);
        }
    }

    fn layer() -> WindLayer<TestHost, CpuBackend> {
        let data = WindData::uniform(4, 4, Rectangle::new(-20.0, -10.0, 20.0, 10.0), Vec2::new(5.0, 0.0));
        let options = RenderOptions { particles_texture_size: 2, ..RenderOptions::default() };
        WindLayer::new(TestHost::default(), CpuBackend::new(16, 16), data, options).unwrap()
    }

    // ========== Event Tests ==========

    #[test]
    fn test_new_subscribes_all_events() {
        let layer = layer();
        assert_eq!(layer.host().events.len(), 4);
        assert_eq!(layer.host().renders_requested, 1);
    }

    #[test]
    fn test_pre_render_runs_a_frame() {
        let mut layer = layer();
        layer.host_mut().emit(SceneEvent::PreRender);
        assert_eq!(layer.pending_events(), 1);
        layer.pump_events().unwrap();
        assert_eq!(layer.system().frame(), 1);
        assert_eq!(layer.pending_events(), 0);
    }

    #[test]
    fn test_camera_move_hides_until_move_end() {
        let mut layer = layer();
        layer.host_mut().emit(SceneEvent::MoveStart);
        layer.host_mut().emit(SceneEvent::PreRender);
        layer.pump_events().unwrap();
        assert!(!layer.system().is_visible());
        assert_eq!(layer.system().frame(), 0);

        layer.host_mut().view = Some(Rectangle::new(0.0, 0.0, 0.5, 0.25));
        layer.host_mut().emit(SceneEvent::MoveEnd);
        layer.pump_events().unwrap();
        assert!(layer.system().is_visible());
        let view = layer.system().viewer().view_rectangle();
        assert!((view.east - 0.5f32.to_degrees()).abs() < 1e-3);
    }

    #[test]
    fn test_move_end_refreshes_pixel_size() {
        let mut layer = layer();
        assert_eq!(layer.system().viewer().pixel_size, 0.0);
        layer.host_mut().meters_per_pixel = 250.0;
        layer.host_mut().emit(SceneEvent::MoveEnd);
        layer.pump_events().unwrap();
        assert_eq!(layer.system().viewer().pixel_size, 250.0);
    }

    #[test]
    fn test_events_apply_in_arrival_order() {
        let mut layer = layer();
        for _ in 0..50 {
            layer.host_mut().emit(SceneEvent::MoveStart);
            layer.host_mut().emit(SceneEvent::PreRender);
            layer.host_mut().emit(SceneEvent::MoveEnd);
            layer.host_mut().emit(SceneEvent::PreRender);
        }
        assert_eq!(layer.pending_events(), 200);
        layer.pump_events().unwrap();
        // Only the frames queued after each MoveEnd run
        assert_eq!(layer.system().frame(), 50);
        assert!(layer.system().is_visible());
        assert_eq!(layer.pending_events(), 0);
    }

    #[test]
    fn test_move_end_keeps_user_hidden() {
        let mut layer = layer();
        layer.set_show(false);
        layer.host_mut().emit(SceneEvent::MoveStart);
        layer.host_mut().emit(SceneEvent::MoveEnd);
        layer.pump_events().unwrap();
        assert!(!layer.system().is_visible());
    }

    #[test]
    fn test_resize_event_recreates_targets() {
        let mut layer = layer();
        layer.host_mut().emit(SceneEvent::Resize { width: 40, height: 20 });
        layer.pump_events().unwrap();
        assert_eq!(layer.system().render_targets().unwrap().size(), (40, 20));
        assert!(layer.system().is_visible());
    }

    // ========== Lifecycle Tests ==========

    #[test]
    fn test_zoom_to_flies_to_field() {
        let mut layer = layer();
        let rect = layer.zoom_to(Some(2.0));
        assert_eq!(rect, Rectangle::new(-20.0, -10.0, 20.0, 10.0));
        assert_eq!(layer.host().flown_to, Some(rect));
    }

    #[test]
    fn test_destroy_unsubscribes_and_releases() {
        let mut layer = layer();
        layer.destroy();
        layer.destroy();
        assert!(layer.is_destroyed());
        assert!(layer.host().events.is_empty());
        assert_eq!(layer.system().backend().live_texture_count(), 0);
        assert_eq!(layer.system().backend().live_framebuffer_count(), 0);
    }

    #[test]
    fn test_update_options_requests_render() {
        let mut layer = layer();
        let diff = layer.update_options(&OptionsPatch::new().with_line_width(5.0)).unwrap();
        assert!(!diff.needs_reallocation());
        assert_eq!(layer.host().renders_requested, 2);
        assert_eq!(layer.options().line_width, 5.0);
    }
}
