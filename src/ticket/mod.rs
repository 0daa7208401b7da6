//! Ticket data model, normalization, and dedup.

pub mod dedup;
pub mod model;
pub mod normalizer;

pub use dedup::SeenIds;
pub use model::{Channel, RawChannelEvent, SkipReason, TicketDraft, TicketOutcome};
pub use normalizer::normalize;
