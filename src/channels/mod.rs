//! Channel adapters: where support requests come in and receipts go out.

pub mod ack;
pub mod email;
pub mod email_poller;
pub mod imap;
pub mod slack;

pub use ack::{Acknowledger, EmailTemplateAcknowledger, SlackAcknowledger};
pub use email::{CycleReport, EmailAdapter, FetchBatch, ScopedSession};
pub use email_poller::PollScheduler;
pub use imap::{ImapMailSource, MailSession, MailSource};
pub use slack::{ChatApi, SlackAdapter, SlackApi};
