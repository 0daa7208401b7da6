//! Intake filter rules, evaluated before normalization.
//!
//! Drops events that should never become tickets:
//! - noreply/no-reply senders
//! - bounce and mail-system senders (mailer-daemon, postmaster)
//! - the service's own mailbox (acknowledgement loops)
//!
//! A match yields `SkipReason::Filtered`; nothing is published or acknowledged.

use regex::Regex;
use tracing::debug;

use crate::ticket::{RawChannelEvent, SkipReason};

/// Which event field a rule matches against.
#[derive(Debug, Clone)]
pub enum RuleField {
    Sender,
    /// `raw_payload.subject`, if the channel has one.
    Subject,
    Body,
}

/// A single drop rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct DropRule {
    /// Human-readable pattern description.
    pub pattern: String,
    pub regex: Regex,
    pub field: RuleField,
    /// Why this rule triggers.
    pub reason: String,
}

/// Pattern-based filter shared by all channel adapters.
pub struct IntakeFilter {
    drop_rules: Vec<DropRule>,
    /// Senders that bypass every drop rule.
    allow_patterns: Vec<Regex>,
}

impl IntakeFilter {
    /// Filter with the default automated-sender rules.
    pub fn default_rules() -> Self {
        let drop_rules = vec![
            DropRule {
                pattern: "noreply@*".into(),
                regex: Regex::new(r"(?i)^no[\-_.]?reply@").unwrap(),
                field: RuleField::Sender,
                reason: "noreply sender".into(),
            },
            DropRule {
                pattern: "mailer-daemon".into(),
                regex: Regex::new(r"(?i)^(mailer[\-_]?daemon|postmaster)@").unwrap(),
                field: RuleField::Sender,
                reason: "automated mail system".into(),
            },
            DropRule {
                pattern: "delivery status notification".into(),
                regex: Regex::new(r"(?i)^(undeliverable|delivery status notification)\b").unwrap(),
                field: RuleField::Subject,
                reason: "bounce notification".into(),
            },
        ];

        Self {
            drop_rules,
            allow_patterns: Vec::new(),
        }
    }

    /// Create an empty filter (for testing).
    pub fn empty() -> Self {
        Self {
            drop_rules: Vec::new(),
            allow_patterns: Vec::new(),
        }
    }

    /// Drop anything sent from `address` (the mailbox we acknowledge from).
    pub fn with_own_address(mut self, address: &str) -> Self {
        let pattern = format!("(?i)^{}$", regex::escape(address.trim()));
        if let Ok(regex) = Regex::new(&pattern) {
            self.drop_rules.push(DropRule {
                pattern: address.to_string(),
                regex,
                field: RuleField::Sender,
                reason: "sent from the intake mailbox".into(),
            });
        }
        self
    }

    /// Add a sender pattern that bypasses drop rules.
    pub fn add_allow(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.allow_patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    /// Add a custom drop rule.
    pub fn add_drop_rule(
        &mut self,
        pattern: &str,
        field: RuleField,
        reason: &str,
    ) -> Result<(), regex::Error> {
        self.drop_rules.push(DropRule {
            pattern: pattern.into(),
            regex: Regex::new(pattern)?,
            field,
            reason: reason.into(),
        });
        Ok(())
    }

    /// Returns `Some(SkipReason::Filtered)` if a drop rule matches.
    pub fn evaluate(&self, event: &RawChannelEvent) -> Option<SkipReason> {
        if self
            .allow_patterns
            .iter()
            .any(|r| r.is_match(&event.sender_id))
        {
            return None;
        }

        for rule in &self.drop_rules {
            let value = match rule.field {
                RuleField::Sender => event.sender_id.as_str(),
                RuleField::Subject => {
                    match event.raw_payload.get("subject").and_then(|v| v.as_str()) {
                        Some(subject) => subject,
                        None => continue,
                    }
                }
                RuleField::Body => event.body.as_str(),
            };

            if rule.regex.is_match(value) {
                debug!(
                    channel = %event.channel,
                    external_id = %event.external_id,
                    rule = %rule.pattern,
                    reason = %rule.reason,
                    "Event matched drop rule"
                );
                return Some(SkipReason::Filtered {
                    reason: rule.reason.clone(),
                });
            }
        }

        None
    }
}
