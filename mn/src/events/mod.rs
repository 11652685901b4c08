//! Event stream for Midnight activity
//!
//! Every state-changing action emits a typed event. Consumers (the sidecar
//! observer, the execution log, tests) subscribe to the broadcast bus.

mod bus;
mod types;

pub use bus::{EventBus, EventEmitter, create_event_bus};
pub use types::{ConfidenceLevel, Event};
