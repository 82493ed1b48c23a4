//! Status notifier trait.

use crate::StatusEvent;

/// Sink for status-change events.
///
/// Publishing never blocks on observers and never fails the caller; a
/// notifier that cannot deliver drops the event.
pub trait StatusNotifier: Send + Sync {
    fn publish(&self, event: StatusEvent);
}
