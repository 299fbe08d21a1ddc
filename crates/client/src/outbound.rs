//! Optimistic send bookkeeping
//!
//! Every message the local side sends is tracked from the moment it is shown
//! until the durable write answers: `pending -> confirmed | failed`.

use chatdesk_shared::{AttachmentUpload, ChatError, ChatResult, MessageId};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundState {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for OutboundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        })
    }
}

/// What the user has typed and selected but not yet sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub attachment: Option<AttachmentUpload>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }

    /// Put a failed send back into the input without losing what was typed
    /// since. The failed text comes first; a newer attachment wins.
    pub fn restore(failed: Draft, current: Draft) -> Draft {
        if current.is_empty() {
            return Draft {
                text: failed.text,
                attachment: failed.attachment.or(current.attachment),
            };
        }
        let text = match (failed.text.trim().is_empty(), current.text.trim().is_empty()) {
            (true, _) => current.text,
            (false, true) => failed.text,
            (false, false) => format!("{}\n{}", failed.text, current.text),
        };
        Draft {
            text,
            attachment: current.attachment.or(failed.attachment),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outbound {
    pub temp_id: MessageId,
    /// Kept so a failed send can restore the input
    pub draft: Draft,
    state: OutboundState,
    durable_id: Option<MessageId>,
}

impl Outbound {
    pub fn new(temp_id: MessageId, draft: Draft) -> Self {
        Self {
            temp_id,
            draft,
            state: OutboundState::Pending,
            durable_id: None,
        }
    }

    pub fn state(&self) -> OutboundState {
        self.state
    }

    pub fn durable_id(&self) -> Option<&MessageId> {
        self.durable_id.as_ref()
    }

    pub fn confirm(&mut self, durable_id: MessageId) -> ChatResult<()> {
        self.transition(OutboundState::Confirmed)?;
        self.durable_id = Some(durable_id);
        Ok(())
    }

    pub fn fail(&mut self) -> ChatResult<()> {
        self.transition(OutboundState::Failed)
    }

    fn transition(&mut self, to: OutboundState) -> ChatResult<()> {
        if self.state != OutboundState::Pending {
            return Err(ChatError::Internal(format!(
                "outbound {} cannot move from {} to {to}",
                self.temp_id, self.state
            )));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_resolves_once() {
        let mut outbound = Outbound::new(MessageId::temporary(), Draft::text("Hello"));
        assert_eq!(outbound.state(), OutboundState::Pending);

        let durable = MessageId::durable();
        outbound.confirm(durable.clone()).unwrap();
        assert_eq!(outbound.state(), OutboundState::Confirmed);
        assert_eq!(outbound.durable_id(), Some(&durable));

        assert!(outbound.fail().is_err());
        assert!(outbound.confirm(MessageId::durable()).is_err());
        assert_eq!(outbound.durable_id(), Some(&durable));
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut outbound = Outbound::new(MessageId::temporary(), Draft::text("Hello"));
        outbound.fail().unwrap();
        assert!(outbound.confirm(MessageId::durable()).is_err());
        assert_eq!(outbound.state(), OutboundState::Failed);
    }

    #[test]
    fn test_restore_keeps_newer_input() {
        let restored = Draft::restore(Draft::text("Hello"), Draft::default());
        assert_eq!(restored, Draft::text("Hello"));

        let restored = Draft::restore(Draft::text("Hello"), Draft::text("Order 42"));
        assert_eq!(restored.text, "Hello\nOrder 42");

        let upload = AttachmentUpload {
            kind: chatdesk_shared::AttachmentKind::Image,
            filename: "receipt.png".into(),
            data: vec![1, 2, 3],
        };
        let failed = Draft {
            text: String::new(),
            attachment: Some(upload.clone()),
        };
        let restored = Draft::restore(failed, Draft::text("See this"));
        assert_eq!(restored.text, "See this");
        assert_eq!(restored.attachment, Some(upload));
    }

    #[test]
    fn test_draft_emptiness() {
        assert!(Draft::text("   ").is_empty());
        assert!(!Draft::text("hi").is_empty());
    }
}
