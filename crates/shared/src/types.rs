//! Common types used across chatdesk

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Externally addressable chat session identifier (`chat_<32 hex>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn generate() -> Self {
        Self(format!("chat_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChatId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Admin user identifier as issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminId(pub String);

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdminId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AdminId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Message identifier. Temporary ids are minted client-side for optimistic
/// entries and never reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

const TEMP_ID_PREFIX: &str = "temp-";

impl MessageId {
    pub fn temporary() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn durable() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Which side of the conversation authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Admin,
}

impl SenderType {
    pub fn other(self) -> Self {
        match self {
            Self::User => Self::Admin,
            Self::Admin => Self::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown sender type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Authenticated,
    NamedGuest,
    Anonymous,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::NamedGuest => "named_guest",
            Self::Anonymous => "anonymous",
        }
    }
}

impl std::str::FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authenticated" => Ok(Self::Authenticated),
            "named_guest" => Ok(Self::NamedGuest),
            "anonymous" => Ok(Self::Anonymous),
            other => Err(format!("unknown identity kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Closed,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Archived => "archived",
        }
    }

    /// Open sessions are the ones `start` may hand back to a returning customer
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Waiting | Self::Active)
    }

    /// Statuses in which an admin must hold the session
    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::Active | Self::Closed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Document,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

impl std::str::FromStr for AttachmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            other => Err(format!("unknown attachment type: {other}")),
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

/// User identity supplied by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestDetails {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

impl GuestDetails {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Guest name cannot be empty".into());
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(format!("Invalid email address: {email}"));
            }
        }
        Ok(())
    }
}

/// Who is starting a chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerIdentity {
    Authenticated(AuthenticatedUser),
    Anonymous,
    Guest(GuestDetails),
}

impl CustomerIdentity {
    pub fn kind(&self) -> IdentityKind {
        match self {
            Self::Authenticated(_) => IdentityKind::Authenticated,
            Self::Anonymous => IdentityKind::Anonymous,
            Self::Guest(_) => IdentityKind::NamedGuest,
        }
    }

    /// Lookup key used to find an existing open session before creating one.
    ///
    /// Authenticated users are keyed by user id; guests and anonymous
    /// visitors by the browsing context that started the chat.
    pub fn identity_key(&self, visitor_id: &str) -> String {
        match self {
            Self::Authenticated(user) => format!("user:{}", user.id),
            Self::Anonymous | Self::Guest(_) => format!("visitor:{visitor_id}"),
        }
    }

    pub fn to_customer(&self) -> Customer {
        match self {
            Self::Authenticated(user) => Customer {
                name: user.name.clone(),
                email: user.email.clone(),
                phone: user.phone.clone(),
                identity_kind: IdentityKind::Authenticated,
            },
            Self::Anonymous => Customer::anonymous(),
            Self::Guest(guest) => Customer::from_guest(guest),
        }
    }
}

/// Customer profile denormalized onto the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub identity_kind: IdentityKind,
}

impl Customer {
    pub fn anonymous() -> Self {
        Self {
            name: "Guest".to_string(),
            email: None,
            phone: None,
            identity_kind: IdentityKind::Anonymous,
        }
    }

    pub fn from_guest(guest: &GuestDetails) -> Self {
        Self {
            name: guest.name.trim().to_string(),
            email: guest.email.clone(),
            phone: guest.phone.clone(),
            identity_kind: IdentityKind::NamedGuest,
        }
    }
}

/// Identity a realtime connection is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Customer,
    Admin,
}

impl ParticipantRole {
    pub fn sender_type(&self) -> SenderType {
        match self {
            Self::Customer => SenderType::User,
            Self::Admin => SenderType::Admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub role: ParticipantRole,
}

impl Participant {
    pub fn customer(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: ParticipantRole::Customer,
        }
    }

    pub fn admin(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: ParticipantRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ParticipantRole::Admin
    }

    pub fn sender_type(&self) -> SenderType {
        self.role.sender_type()
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedAdmin {
    pub id: AdminId,
    pub name: String,
}

impl AssignedAdmin {
    pub fn new(id: impl Into<AdminId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub admin: u32,
    pub customer: u32,
}

impl UnreadCount {
    /// Unread count for the given audience
    pub fn for_audience(&self, audience: SenderType) -> u32 {
        match audience {
            SenderType::Admin => self.admin,
            SenderType::User => self.customer,
        }
    }

    pub fn increment_for(&mut self, audience: SenderType) {
        match audience {
            SenderType::Admin => self.admin = self.admin.saturating_add(1),
            SenderType::User => self.customer = self.customer.saturating_add(1),
        }
    }

    pub fn reset_for(&mut self, audience: SenderType) {
        match audience {
            SenderType::Admin => self.admin = 0,
            SenderType::User => self.customer = 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub from_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub chat_id: ChatId,
    pub customer: Customer,
    pub status: SessionStatus,
    #[serde(default)]
    pub assigned_admin: Option<AssignedAdmin>,
    #[serde(default)]
    pub unread_count: UnreadCount,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ChatSession {
    /// A freshly created, unassigned session
    pub fn new(customer: Customer) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            chat_id: ChatId::generate(),
            customer,
            status: SessionStatus::Waiting,
            assigned_admin: None,
            unread_count: UnreadCount::default(),
            last_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `assigned_admin` is set iff the status is `active` or `closed`
    pub fn holds_invariant(&self) -> bool {
        self.assigned_admin.is_some() == self.status.requires_admin()
    }

    pub fn is_assigned_to(&self, admin_id: &AdminId) -> bool {
        self.assigned_admin
            .as_ref()
            .map(|a| &a.id == admin_id)
            .unwrap_or(false)
    }
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_type: SenderType,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    /// Short preview used for the denormalized `last_message`
    pub fn preview(&self) -> String {
        if !self.message.is_empty() {
            return self.message.clone();
        }
        match self.attachments.first() {
            Some(a) => format!("[{}] {}", a.kind.as_str(), a.filename),
            None => String::new(),
        }
    }
}

/// Ephemeral "is typing" announcement. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub chat_id: ChatId,
    pub sender_type: SenderType,
    pub sender_name: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_format() {
        let id = ChatId::generate();
        assert!(id.as_str().starts_with("chat_"));
        assert_eq!(id.as_str().len(), "chat_".len() + 32);
    }

    #[test]
    fn test_temporary_message_ids() {
        assert!(MessageId::temporary().is_temporary());
        assert!(!MessageId::durable().is_temporary());
    }

    #[test]
    fn test_identity_keys() {
        let user = CustomerIdentity::Authenticated(AuthenticatedUser {
            id: "u-42".into(),
            name: "Ada".into(),
            phone: None,
            email: Some("ada@example.com".into()),
        });
        assert_eq!(user.identity_key("visitor-1"), "user:u-42");
        assert_eq!(
            CustomerIdentity::Anonymous.identity_key("visitor-1"),
            "visitor:visitor-1"
        );
    }

    #[test]
    fn test_guest_validation() {
        let mut guest = GuestDetails {
            name: "  ".into(),
            email: None,
            phone: None,
            subject: None,
        };
        assert!(guest.validate().is_err());
        guest.name = "Bo".into();
        guest.email = Some("not-an-email".into());
        assert!(guest.validate().is_err());
        guest.email = Some("bo@example.com".into());
        assert!(guest.validate().is_ok());
    }

    #[test]
    fn test_session_serialization_shape() {
        let session = ChatSession::new(Customer::anonymous());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["customer"]["identity_kind"], "anonymous");
        assert_eq!(json["unread_count"]["admin"], 0);
        assert!(json["assigned_admin"].is_null());
    }

    #[test]
    fn test_attachment_preview() {
        let msg = Message {
            id: MessageId::durable(),
            chat_id: ChatId::from("chat_1"),
            sender_id: "u".into(),
            sender_name: "U".into(),
            sender_type: SenderType::User,
            message: String::new(),
            attachments: vec![Attachment {
                kind: AttachmentKind::Image,
                url: "https://cdn/x.png".into(),
                filename: "x.png".into(),
                size: Some(10),
            }],
            timestamp: OffsetDateTime::now_utc(),
            is_read: false,
        };
        assert_eq!(msg.preview(), "[image] x.png");
        let json = serde_json::to_value(&msg.attachments[0]).unwrap();
        assert_eq!(json["type"], "image");
    }
}
