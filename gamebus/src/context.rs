//! Ambient caller identity for inbound dispatch.

use std::cell::RefCell;

use crate::id::NodeId;

thread_local! {
    static CURRENT_SENDER: RefCell<Option<NodeId>> = const { RefCell::new(None) };
}

/// Identity of the node whose call is currently executing on this thread.
///
/// Implementor methods read it to learn who invoked them without the
/// interface carrying a sender parameter:
///
/// ```
/// use gamebus::MessageContext;
///
/// fn can_move(_unit_id: u32) -> bool {
///     // None here because nothing is dispatching; Some(caller) inside a
///     // dispatched method body.
///     assert!(MessageContext::current().is_none());
///     true
/// }
/// # can_move(7);
/// ```
pub struct MessageContext;

impl MessageContext {
    /// Node that invoked the currently executing inbound call, or `None`
    /// outside the dynamic extent of any dispatch.
    pub fn current() -> Option<NodeId> {
        CURRENT_SENDER.with(|sender| sender.borrow().clone())
    }

    /// Runs `f` with the current sender bound to `node`, restoring the
    /// previous binding afterwards, unwind included.
    pub(crate) fn scope<R>(node: NodeId, f: impl FnOnce() -> R) -> R {
        let previous = CURRENT_SENDER.with(|sender| sender.borrow_mut().replace(node));
        let _restore = Restore(previous);
        f()
    }
}

struct Restore(Option<NodeId>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT_SENDER.with(|sender| *sender.borrow_mut() = previous);
    }
}
