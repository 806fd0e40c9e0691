//! Outbound notifications to whatever front-end hosts the node

/// Receives notifications from the broker and the connect state machine.
///
/// Calls are fire-and-forget; implementations must not block.
pub trait MessageDisplay: Send + Sync {
    /// A message was refined at this node
    fn on_message_refined(&self, original: &str, refined: &str, hops: u32);

    /// Connecting failed and everything opened for it was torn down
    fn on_connect_failed(&self) {}
}

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDisplay;

impl MessageDisplay for NoopDisplay {
    fn on_message_refined(&self, _original: &str, _refined: &str, _hops: u32) {}
}
