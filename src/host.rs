//! Host scene collaborator.
//!
//! The host owns the camera, the drawing buffer and the event loop. The
//! pipeline reads view bounds, pixel size and the projection from it, and
//! listens to four events through explicit subscriptions:
//!
//! | Event | Effect on the layer |
//! |-------|---------------------|
//! | `MoveStart` | hide the passes |
//! | `MoveEnd` | refresh viewer parameters, restore visibility |
//! | `PreRender` | render one frame |
//! | `Resize` | recreate render targets |
//!
//! Every [`SceneHost::subscribe`] returns a [`SubscriptionToken`] that must
//! be handed back to [`SceneHost::unsubscribe`].

use crate::geo::Rectangle;
use crate::viewer::{FrameInputs, ProjectionMode};
use glam::Mat4;
use std::fmt;

/// Kinds of host events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SceneEventKind {
    MoveStart,
    MoveEnd,
    PreRender,
    Resize,
}

impl SceneEventKind {
    pub const ALL: [SceneEventKind; 4] = [
        SceneEventKind::MoveStart,
        SceneEventKind::MoveEnd,
        SceneEventKind::PreRender,
        SceneEventKind::Resize,
    ];
}

/// A host event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneEvent {
    MoveStart,
    MoveEnd,
    PreRender,
    /// The drawing buffer changed size.
    Resize { width: u32, height: u32 },
}

impl SceneEvent {
    pub fn kind(&self) -> SceneEventKind {
        match self {
            SceneEvent::MoveStart => SceneEventKind::MoveStart,
            SceneEvent::MoveEnd => SceneEventKind::MoveEnd,
            SceneEvent::PreRender => SceneEventKind::PreRender,
            SceneEvent::Resize { .. } => SceneEventKind::Resize,
        }
    }
}

/// Handle returned by [`SceneHost::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(pub u64);

/// Event callback.
pub type EventHandler = Box<dyn FnMut(&SceneEvent)>;

/// Scene, camera and event source the layer is attached to.
pub trait SceneHost {
    /// Visible rectangle in radians, `None` when the globe is not in view.
    fn compute_view_rectangle(&self) -> Option<Rectangle>;

    /// Metres per pixel on a sphere of `reference_radius`.
    fn pixel_size(&self, reference_radius: f32, drawing_buffer_width: u32, drawing_buffer_height: u32) -> f32;

    fn projection_mode(&self) -> ProjectionMode;

    /// Render space to clip space for the current camera.
    fn view_projection(&self) -> Mat4;

    fn drawing_buffer_size(&self) -> (u32, u32);

    fn subscribe(&mut self, kind: SceneEventKind, handler: EventHandler) -> SubscriptionToken;

    /// Remove a subscription. Returns false for unknown tokens.
    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool;

    /// Ask for a frame to be rendered soon.
    fn request_render(&mut self) {}

    /// Move the camera to frame `rectangle` (degrees).
    fn fly_to(&mut self, _rectangle: Rectangle, _duration: Option<f32>) {}

    /// Inputs for the next frame.
    fn frame_inputs(&self) -> FrameInputs {
        FrameInputs::new(self.view_projection(), self.projection_mode())
    }
}

/// Subscription bookkeeping for [`SceneHost`] implementations.
#[derive(Default)]
pub struct EventRegistry {
    next_token: u64,
    handlers: Vec<(SubscriptionToken, SceneEventKind, EventHandler)>,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("next_token", &self.next_token)
            .field("subscriptions", &self.handlers.len())
            .finish()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: SceneEventKind, handler: EventHandler) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token);
        self.next_token += 1;
        self.handlers.push((token, kind, handler));
        token
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(t, _, _)| *t != token);
        self.handlers.len() != before
    }

    /// Call every handler subscribed to the event's kind.
    pub fn emit(&mut self, event: &SceneEvent) {
        let kind = event.kind();
        for (_, subscribed, handler) in &mut self.handlers {
            if *subscribed == kind {
                handler(event);
            }
        }
    }

    /// Live subscriptions.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn count(&self, kind: SceneEventKind) -> usize {
        self.handlers.iter().filter(|(_, k, _)| *k == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<SceneEvent>>>, EventHandler) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, Box::new(move |e: &SceneEvent| sink.borrow_mut().push(*e)))
    }

    #[test]
    fn test_emit_reaches_matching_kind_only() {
        let mut registry = EventRegistry::new();
        let (seen, handler) = recorder();
        registry.subscribe(SceneEventKind::Resize, handler);

        registry.emit(&SceneEvent::MoveStart);
        registry.emit(&SceneEvent::Resize { width: 3, height: 4 });

        assert_eq!(*seen.borrow(), vec![SceneEvent::Resize { width: 3, height: 4 }]);
    }

    #[test]
    fn test_unsubscribe_is_symmetric() {
        let mut registry = EventRegistry::new();
        let tokens: Vec<SubscriptionToken> = SceneEventKind::ALL
            .iter()
            .map(|&kind| registry.subscribe(kind, recorder().1))
            .collect();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.count(SceneEventKind::PreRender), 1);

        for token in &tokens {
            assert!(registry.unsubscribe(*token));
        }
        assert!(registry.is_empty());
        assert!(!registry.unsubscribe(tokens[0]));
    }

    #[test]
    fn test_tokens_are_unique() {
        let mut registry = EventRegistry::new();
        let a = registry.subscribe(SceneEventKind::MoveEnd, recorder().1);
        let b = registry.subscribe(SceneEventKind::MoveEnd, recorder().1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(SceneEvent::Resize { width: 1, height: 1 }.kind(), SceneEventKind::Resize);
        assert_eq!(SceneEvent::PreRender.kind(), SceneEventKind::PreRender);
    }
}
