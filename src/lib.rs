//! Omnichannel intake: turns inbound email and Slack messages into
//! ticket drafts on the classification queue.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod ticket;
