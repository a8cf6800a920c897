//! Observer contract for registry lifecycle events.
//!
//! The registry reports identity changes through a narrow trait with one
//! method per event kind rather than a dynamic listener list; in
//! practice a single subscriber (metrics, audit log, host glue) is all
//! that is ever attached. All methods default to no-ops so observers
//! implement only what they care about.

use crate::types::OperatorKey;

use super::OperatorRecord;

/// Receives registry lifecycle events.
pub trait RegistryObserver {
    /// The self operator finished initializing.
    fn on_self_initialized(&self, _record: &OperatorRecord) {}

    /// A peer operator was registered or updated.
    fn on_operator_registered(&self, _record: &OperatorRecord) {}

    /// An operator was removed.
    fn on_operator_removed(&self, _public_key: &OperatorKey) {}
}
