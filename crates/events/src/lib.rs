//! `cubemerch-events` — event contracts and distribution.
//!
//! Events are the write-side source of truth; this crate defines what an
//! event is (`Event`), how it travels (`EventEnvelope`), and how it fans out
//! to read-model builders (`EventBus`).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
