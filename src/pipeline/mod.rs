//! Ticket intake pipeline.
//!
//! Every channel adapter feeds the same stages:
//! 1. `Intake::prepare()`: dedup, filter rules, normalization (no I/O)
//! 2. `Intake::publish()`: one send to the classification queue
//!
//! Acknowledgements are the adapter's job and never block ticket creation.

pub mod intake;
pub mod nats;
pub mod publisher;
pub mod rules;

pub use intake::Intake;
pub use nats::NatsTransport;
pub use publisher::{MemoryQueue, OutboundPublisher, QueueTransport, QueuedMessage};
pub use rules::{IntakeFilter, RuleField};
