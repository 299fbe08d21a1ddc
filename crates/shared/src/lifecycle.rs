//! Session lifecycle state machine
//!
//! Every Session Store backend funnels mutations through these methods so the
//! assignment invariant (`assigned_admin` set iff `active`/`closed`) holds no
//! matter which backend persists the session. A method that returns an error
//! leaves the session untouched.
//!
//! ```text
//!   waiting --assign--> active --close--> closed --archive--> archived
//!      ^                                    |
//!      +-------- customer message ----------+   (reopen rule)
//! ```

use time::OffsetDateTime;

use crate::error::{ChatError, ChatResult};
use crate::store::SessionPatch;
use crate::types::{
    AdminId, AssignedAdmin, ChatSession, Customer, GuestDetails, IdentityKind, LastMessage,
    Message, SenderType, SessionStatus,
};

impl ChatSession {
    /// First assignment wins. Re-assigning to the current holder is a no-op.
    pub fn assign(&mut self, admin: AssignedAdmin) -> ChatResult<()> {
        match self.status {
            SessionStatus::Waiting => {
                self.status = SessionStatus::Active;
                self.assigned_admin = Some(admin);
                self.touch();
                Ok(())
            }
            SessionStatus::Active if self.is_assigned_to(&admin.id) => Ok(()),
            SessionStatus::Active | SessionStatus::Closed => {
                match self.assigned_admin.as_ref() {
                    Some(holder) if holder.id != admin.id => Err(ChatError::AlreadyAssigned {
                        chat_id: self.chat_id.clone(),
                        holder: holder.id.clone(),
                    }),
                    _ => Err(self.invalid(SessionStatus::Active)),
                }
            }
            SessionStatus::Archived => Err(self.invalid(SessionStatus::Active)),
        }
    }

    pub fn close(&mut self) -> ChatResult<()> {
        match self.status {
            SessionStatus::Active => {
                self.status = SessionStatus::Closed;
                self.touch();
                Ok(())
            }
            SessionStatus::Closed => Ok(()),
            _ => Err(self.invalid(SessionStatus::Closed)),
        }
    }

    /// Archiving drops the assignment, an archived session has no holder.
    pub fn archive(&mut self) -> ChatResult<()> {
        match self.status {
            SessionStatus::Closed => {
                self.status = SessionStatus::Archived;
                self.assigned_admin = None;
                self.touch();
                Ok(())
            }
            SessionStatus::Archived => Ok(()),
            _ => Err(self.invalid(SessionStatus::Archived)),
        }
    }

    /// closed -> waiting. The previous holder is released so any admin may pick it up.
    pub fn reopen(&mut self) -> ChatResult<()> {
        match self.status {
            SessionStatus::Closed => {
                self.status = SessionStatus::Waiting;
                self.assigned_admin = None;
                self.touch();
                Ok(())
            }
            _ => Err(self.invalid(SessionStatus::Waiting)),
        }
    }

    /// Convert an anonymous (or already named) customer into a named guest.
    /// History is untouched; only the denormalized profile changes.
    pub fn upgrade_identity(&mut self, guest: &GuestDetails) -> ChatResult<()> {
        if !self.status.is_open() {
            return Err(ChatError::SessionClosed(self.chat_id.clone()));
        }
        if self.customer.identity_kind == IdentityKind::Authenticated {
            return Err(ChatError::Validation(
                "Authenticated customers cannot be converted to guests".into(),
            ));
        }
        guest.validate().map_err(ChatError::Validation)?;
        self.customer = Customer::from_guest(guest);
        self.touch();
        Ok(())
    }

    /// Admins may only write into sessions they hold
    pub fn authorize_admin(&self, admin_id: &AdminId) -> ChatResult<()> {
        match self.status {
            SessionStatus::Archived => Err(ChatError::SessionClosed(self.chat_id.clone())),
            SessionStatus::Waiting => Err(ChatError::Unauthorized(format!(
                "session {} must be assigned before an admin can act on it",
                self.chat_id
            ))),
            SessionStatus::Active | SessionStatus::Closed => {
                if self.is_assigned_to(admin_id) {
                    Ok(())
                } else {
                    Err(ChatError::Unauthorized(format!(
                        "session {} is held by another admin",
                        self.chat_id
                    )))
                }
            }
        }
    }

    /// Apply the side effects of a durably written message: reopen rule,
    /// `last_message`, and the other audience's unread count. Stores pass
    /// `reopen_on_customer_message = false` when the customer already has
    /// another open session.
    pub fn record_message(&mut self, message: &Message, reopen_on_customer_message: bool) -> ChatResult<()> {
        if self.status == SessionStatus::Archived {
            return Err(ChatError::SessionClosed(self.chat_id.clone()));
        }
        if message.sender_type == SenderType::Admin {
            self.authorize_admin(&AdminId::from(message.sender_id.as_str()))?;
        }
        if self.status == SessionStatus::Closed
            && message.sender_type == SenderType::User
            && reopen_on_customer_message
        {
            self.reopen()?;
        }

        self.last_message = Some(LastMessage {
            content: message.preview(),
            timestamp: message.timestamp,
            from_admin: message.sender_type == SenderType::Admin,
        });
        self.unread_count.increment_for(message.sender_type.other());
        self.touch();
        Ok(())
    }

    pub fn mark_read(&mut self, audience: SenderType) {
        self.unread_count.reset_for(audience);
        self.touch();
    }

    /// Apply a generic patch. The optional `expected_status` guard turns the
    /// update into a compare-and-swap.
    pub fn apply_patch(&mut self, patch: &SessionPatch) -> ChatResult<()> {
        let mut next = self.clone();

        if let Some(expected) = patch.expected_status {
            if next.status != expected {
                if let (SessionStatus::Waiting, Some(SessionStatus::Active), Some(holder)) =
                    (expected, patch.status, next.assigned_admin.as_ref())
                {
                    return Err(ChatError::AlreadyAssigned {
                        chat_id: next.chat_id.clone(),
                        holder: holder.id.clone(),
                    });
                }
                return Err(next.invalid(patch.status.unwrap_or(expected)));
            }
        }

        if let Some(customer) = &patch.customer {
            let guest = GuestDetails {
                name: customer.name.clone(),
                email: customer.email.clone(),
                phone: customer.phone.clone(),
                subject: None,
            };
            next.upgrade_identity(&guest)?;
        }

        match patch.status {
            None => {}
            Some(SessionStatus::Active) => {
                let admin = patch.assigned_admin.clone().ok_or_else(|| {
                    ChatError::Validation("Activating a session requires an admin".into())
                })?;
                next.assign(admin)?;
            }
            Some(SessionStatus::Closed) => next.close()?,
            Some(SessionStatus::Archived) => next.archive()?,
            Some(SessionStatus::Waiting) => {
                if next.status != SessionStatus::Waiting {
                    next.reopen()?;
                }
            }
        }

        *self = next;
        Ok(())
    }

    fn invalid(&self, to: SessionStatus) -> ChatError {
        ChatError::InvalidTransition {
            from: self.status,
            to,
        }
    }

    fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}
