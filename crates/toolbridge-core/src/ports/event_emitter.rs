//! Event emitter trait for cross-crate event broadcasting.
//!
//! Implementations handle transport details (channels, SSE, UI bridges);
//! this abstraction keeps channel types out of the public API surface.

use crate::events::BridgeEvent;

/// Trait for emitting bridge events.
///
/// # Implementations
///
/// - [`NoopEmitter`] - for tests and contexts that don't need events
/// - Adapter-specific implementations (SSE, UI, log sinks)
pub trait BridgeEventEmitter: Send + Sync {
    /// Emit a bridge event.
    ///
    /// Implementations should handle the event asynchronously or buffer it.
    /// This method should not block.
    fn emit(&self, event: BridgeEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn BridgeEventEmitter>;
}

/// An event emitter that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    /// Create a new no-op emitter.
    pub const fn new() -> Self {
        Self
    }
}

impl BridgeEventEmitter for NoopEmitter {
    fn emit(&self, _event: BridgeEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn BridgeEventEmitter> {
        Box::new(self.clone())
    }
}
