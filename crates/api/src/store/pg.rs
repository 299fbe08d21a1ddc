//! PostgreSQL Session Store
//!
//! Session mutations lock the row (`SELECT ... FOR UPDATE`), run the shared
//! lifecycle rules in memory and write the row back inside one transaction.
//! Assignment additionally goes through a conditional
//! `UPDATE ... WHERE status = 'waiting'` so concurrent admins race on the
//! database, not in this process.

use async_trait::async_trait;
use chatdesk_shared::{
    AssignedAdmin, Attachment, AttachmentKind, ChatError, ChatId, ChatResult, ChatSession,
    Customer, CustomerIdentity, LastMessage, Message, MessageId, NewMessage, SenderType,
    SessionFilter, SessionPatch, SessionStore, SessionStatus, StartSession, StartedSession,
    UnreadCount,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

const SESSION_COLUMNS: &str = r#"
    chat_id, customer_name, customer_email, customer_phone, identity_kind, status,
    assigned_admin_id, assigned_admin_name, unread_admin, unread_customer,
    last_message_content, last_message_at, last_message_from_admin, created_at, updated_at
"#;

/// Path attachments are served from
pub const ATTACHMENT_ROUTE_PREFIX: &str = "/api/v1/chat/attachments";

#[derive(sqlx::FromRow)]
struct SessionRow {
    chat_id: String,
    customer_name: String,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    identity_kind: String,
    status: String,
    assigned_admin_id: Option<String>,
    assigned_admin_name: Option<String>,
    unread_admin: i32,
    unread_customer: i32,
    last_message_content: Option<String>,
    last_message_at: Option<OffsetDateTime>,
    last_message_from_admin: Option<bool>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<SessionRow> for ChatSession {
    type Error = ChatError;

    fn try_from(row: SessionRow) -> ChatResult<Self> {
        let assigned_admin = match (row.assigned_admin_id, row.assigned_admin_name) {
            (Some(id), name) => Some(AssignedAdmin::new(id, name.unwrap_or_default())),
            (None, _) => None,
        };
        let last_message = match (row.last_message_content, row.last_message_at) {
            (Some(content), Some(timestamp)) => Some(LastMessage {
                content,
                timestamp,
                from_admin: row.last_message_from_admin.unwrap_or(false),
            }),
            _ => None,
        };

        Ok(ChatSession {
            chat_id: ChatId::from(row.chat_id),
            customer: Customer {
                name: row.customer_name,
                email: row.customer_email,
                phone: row.customer_phone,
                identity_kind: row.identity_kind.parse().map_err(ChatError::Internal)?,
            },
            status: row.status.parse().map_err(ChatError::Internal)?,
            assigned_admin,
            unread_count: UnreadCount {
                admin: u32::try_from(row.unread_admin).unwrap_or(0),
                customer: u32::try_from(row.unread_customer).unwrap_or(0),
            },
            last_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    chat_id: String,
    sender_id: String,
    sender_name: String,
    sender_type: String,
    content: String,
    is_read: bool,
    created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: Uuid,
    message_id: Uuid,
    kind: String,
    filename: String,
    size_bytes: Option<i64>,
}

impl AttachmentRow {
    fn into_attachment(self) -> ChatResult<Attachment> {
        Ok(Attachment {
            kind: self.kind.parse().map_err(ChatError::Internal)?,
            url: attachment_url(&self.id),
            filename: self.filename,
            size: self.size_bytes.and_then(|s| u64::try_from(s).ok()),
        })
    }
}

/// Stored attachment body
#[derive(Debug, Clone)]
pub struct AttachmentBlob {
    pub kind: AttachmentKind,
    pub filename: String,
    pub data: Vec<u8>,
}

fn attachment_url(id: &Uuid) -> String {
    format!("{ATTACHMENT_ROUTE_PREFIX}/{id}")
}

fn db_error(err: sqlx::Error) -> ChatError {
    tracing::error!(error = ?err, "Session store database error");
    ChatError::Internal(format!("database error: {err}"))
}

pub struct PgSessionStore {
    pool: PgPool,
    reopen_on_customer_message: bool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool, reopen_on_customer_message: bool) -> Self {
        Self {
            pool,
            reopen_on_customer_message,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Load an attachment body for download
    pub async fn fetch_attachment(&self, id: Uuid) -> ChatResult<Option<AttachmentBlob>> {
        #[derive(sqlx::FromRow)]
        struct BlobRow {
            kind: String,
            filename: String,
            data: Vec<u8>,
        }

        let row = sqlx::query_as::<_, BlobRow>(
            "SELECT kind, filename, data FROM chat_attachments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|r| {
            Ok(AttachmentBlob {
                kind: r.kind.parse().map_err(ChatError::Internal)?,
                filename: r.filename,
                data: r.data,
            })
        })
        .transpose()
    }

    async fn find_open_session(&self, identity_key: &str) -> ChatResult<Option<ChatSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions \
             WHERE identity_key = $1 AND status IN ('waiting', 'active')"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(identity_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(ChatSession::try_from)
            .transpose()
    }

    async fn lock_session(
        tx: &mut Transaction<'_, Postgres>,
        chat_id: &ChatId,
    ) -> ChatResult<ChatSession> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE chat_id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, SessionRow>(&query)
            .bind(chat_id.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error)?
            .ok_or_else(|| ChatError::NotFound(chat_id.clone()))?;
        ChatSession::try_from(row)
    }

    /// Whether the identity behind `chat_id` already has another open session
    async fn other_open_session(
        tx: &mut Transaction<'_, Postgres>,
        chat_id: &ChatId,
    ) -> ChatResult<bool> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM chat_sessions other
                JOIN chat_sessions this ON this.identity_key = other.identity_key
                WHERE this.chat_id = $1
                  AND other.chat_id <> $1
                  AND other.status IN ('waiting', 'active')
            )
            "#,
        )
        .bind(chat_id.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error)
    }

    async fn write_session(
        tx: &mut Transaction<'_, Postgres>,
        session: &ChatSession,
    ) -> ChatResult<()> {
        let admin = session.assigned_admin.as_ref();
        let last = session.last_message.as_ref();
        sqlx::query(
            r#"
            UPDATE chat_sessions SET
                customer_name = $2,
                customer_email = $3,
                customer_phone = $4,
                identity_kind = $5,
                status = $6,
                assigned_admin_id = $7,
                assigned_admin_name = $8,
                unread_admin = $9,
                unread_customer = $10,
                last_message_content = $11,
                last_message_at = $12,
                last_message_from_admin = $13,
                updated_at = $14
            WHERE chat_id = $1
            "#,
        )
        .bind(session.chat_id.as_str())
        .bind(&session.customer.name)
        .bind(&session.customer.email)
        .bind(&session.customer.phone)
        .bind(session.customer.identity_kind.as_str())
        .bind(session.status.as_str())
        .bind(admin.map(|a| a.id.0.clone()))
        .bind(admin.map(|a| a.name.clone()))
        .bind(i32::try_from(session.unread_count.admin).unwrap_or(i32::MAX))
        .bind(i32::try_from(session.unread_count.customer).unwrap_or(i32::MAX))
        .bind(last.map(|l| l.content.clone()))
        .bind(last.map(|l| l.timestamp))
        .bind(last.map(|l| l.from_admin))
        .bind(session.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn attachments_for(&self, message_ids: &[Uuid]) -> ChatResult<HashMap<Uuid, Vec<Attachment>>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id, message_id, kind, filename, size_bytes
            FROM chat_attachments
            WHERE message_id = ANY($1)
            ORDER BY message_id, position
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut grouped: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
        for row in rows {
            let message_id = row.message_id;
            grouped
                .entry(message_id)
                .or_default()
                .push(row.into_attachment()?);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_or_get_session(&self, request: &StartSession) -> ChatResult<StartedSession> {
        if let CustomerIdentity::Guest(guest) = &request.identity {
            guest.validate().map_err(ChatError::Validation)?;
        }

        let key = request.identity_key();
        if let Some(session) = self.find_open_session(&key).await? {
            return Ok(StartedSession {
                session,
                created: false,
            });
        }

        let session = ChatSession::new(request.identity.to_customer());
        let query = format!(
            r#"
            INSERT INTO chat_sessions (
                chat_id, identity_key, customer_name, customer_email, customer_phone,
                identity_kind, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'waiting', $7, $7)
            ON CONFLICT (identity_key) WHERE status IN ('waiting', 'active') DO NOTHING
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, SessionRow>(&query)
            .bind(session.chat_id.as_str())
            .bind(&key)
            .bind(&session.customer.name)
            .bind(&session.customer.email)
            .bind(&session.customer.phone)
            .bind(session.customer.identity_kind.as_str())
            .bind(session.created_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match inserted {
            Some(row) => {
                let session = ChatSession::try_from(row)?;
                tracing::info!(
                    chat_id = %session.chat_id,
                    identity_kind = session.customer.identity_kind.as_str(),
                    "Chat session created"
                );
                Ok(StartedSession {
                    session,
                    created: true,
                })
            }
            // Lost a race with a concurrent start for the same identity
            None => {
                let session = self.find_open_session(&key).await?.ok_or_else(|| {
                    ChatError::Internal("open session vanished after insert conflict".into())
                })?;
                Ok(StartedSession {
                    session,
                    created: false,
                })
            }
        }
    }

    async fn get_session(&self, chat_id: &ChatId) -> ChatResult<ChatSession> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE chat_id = $1");
        let row = sqlx::query_as::<_, SessionRow>(&query)
            .bind(chat_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| ChatError::NotFound(chat_id.clone()))?;
        ChatSession::try_from(row)
    }

    async fn update_session(&self, chat_id: &ChatId, patch: &SessionPatch) -> ChatResult<ChatSession> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut session = Self::lock_session(&mut tx, chat_id).await?;
        session.apply_patch(patch)?;
        Self::write_session(&mut tx, &session).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(session)
    }

    async fn assign_session(&self, chat_id: &ChatId, admin: &AssignedAdmin) -> ChatResult<ChatSession> {
        let query = format!(
            r#"
            UPDATE chat_sessions
            SET status = 'active', assigned_admin_id = $2, assigned_admin_name = $3, updated_at = NOW()
            WHERE chat_id = $1 AND status = 'waiting'
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, SessionRow>(&query)
            .bind(chat_id.as_str())
            .bind(&admin.id.0)
            .bind(&admin.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        if let Some(row) = updated {
            return ChatSession::try_from(row);
        }

        // The swap did not apply: report why using the current row
        let mut current = self.get_session(chat_id).await?;
        if current.status == SessionStatus::Waiting {
            return Err(ChatError::TransientDeliveryFailure(format!(
                "session {chat_id} changed during assignment"
            )));
        }
        current.assign(admin.clone())?;
        Ok(current)
    }

    async fn list_messages(&self, chat_id: &ChatId) -> ChatResult<Vec<Message>> {
        // NotFound for unknown sessions rather than an empty list
        self.get_session(chat_id).await?;

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, chat_id, sender_id, sender_name, sender_type, content, is_read, created_at
            FROM chat_messages
            WHERE chat_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(chat_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut attachments = self.attachments_for(&ids).await?;

        rows.into_iter()
            .map(|row| {
                Ok(Message {
                    id: MessageId(row.id.to_string()),
                    chat_id: ChatId::from(row.chat_id),
                    sender_id: row.sender_id,
                    sender_name: row.sender_name,
                    sender_type: row.sender_type.parse().map_err(ChatError::Internal)?,
                    message: row.content,
                    attachments: attachments.remove(&row.id).unwrap_or_default(),
                    timestamp: row.created_at,
                    is_read: row.is_read,
                })
            })
            .collect()
    }

    async fn send_message(&self, chat_id: &ChatId, message: &NewMessage) -> ChatResult<Message> {
        message.validate()?;

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut session = Self::lock_session(&mut tx, chat_id).await?;

        let last_timestamp: Option<OffsetDateTime> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM chat_messages WHERE chat_id = $1")
                .bind(chat_id.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error)?;

        let mut timestamp = OffsetDateTime::now_utc();
        if let Some(last) = last_timestamp {
            if timestamp < last {
                timestamp = last + Duration::microseconds(1);
            }
        }

        let message_id = Uuid::new_v4();
        let attachment_id = Uuid::new_v4();
        let attachments: Vec<Attachment> = message
            .attachment
            .iter()
            .map(|upload| Attachment {
                kind: upload.kind,
                url: attachment_url(&attachment_id),
                filename: upload.filename.clone(),
                size: Some(upload.size()),
            })
            .collect();

        let stored = Message {
            id: MessageId(message_id.to_string()),
            chat_id: chat_id.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            sender_type: message.sender_type,
            message: message.text.clone().unwrap_or_default(),
            attachments,
            timestamp,
            is_read: false,
        };

        let reopen = self.reopen_on_customer_message
            && session.status == SessionStatus::Closed
            && stored.sender_type == SenderType::User
            && !Self::other_open_session(&mut tx, chat_id).await?;

        // Lifecycle rules first: a rejected message leaves no trace
        session.record_message(&stored, reopen)?;

        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, chat_id, sender_id, sender_name, sender_type, content, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            "#,
        )
        .bind(message_id)
        .bind(chat_id.as_str())
        .bind(&stored.sender_id)
        .bind(&stored.sender_name)
        .bind(stored.sender_type.as_str())
        .bind(&stored.message)
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if let Some(upload) = &message.attachment {
            sqlx::query(
                r#"
                INSERT INTO chat_attachments (id, message_id, position, kind, filename, size_bytes, data)
                VALUES ($1, $2, 0, $3, $4, $5, $6)
                "#,
            )
            .bind(attachment_id)
            .bind(message_id)
            .bind(upload.kind.as_str())
            .bind(&upload.filename)
            .bind(i64::try_from(upload.size()).unwrap_or(i64::MAX))
            .bind(&upload.data)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        Self::write_session(&mut tx, &session).await?;
        tx.commit().await.map_err(db_error)?;

        tracing::debug!(
            chat_id = %chat_id,
            message_id = %stored.id,
            sender_type = %stored.sender_type,
            status = %session.status,
            "Message stored"
        );
        Ok(stored)
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> ChatResult<Vec<ChatSession>> {
        let statuses: Option<Vec<String>> = if filter.statuses.is_empty() {
            None
        } else {
            Some(filter.statuses.iter().map(|s| s.as_str().to_string()).collect())
        };

        let query = format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM chat_sessions
            WHERE ($1::text[] IS NULL OR status = ANY($1))
              AND ($2::text IS NULL OR assigned_admin_id = $2)
            ORDER BY updated_at DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, SessionRow>(&query)
            .bind(statuses)
            .bind(filter.assigned_to.as_ref().map(|a| a.0.clone()))
            .bind(filter.limit.map(i64::from))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(ChatSession::try_from).collect()
    }

    async fn mark_read(&self, chat_id: &ChatId, audience: SenderType) -> ChatResult<ChatSession> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut session = Self::lock_session(&mut tx, chat_id).await?;
        session.mark_read(audience);
        Self::write_session(&mut tx, &session).await?;

        sqlx::query(
            "UPDATE chat_messages SET is_read = TRUE WHERE chat_id = $1 AND sender_type = $2 AND NOT is_read",
        )
        .bind(chat_id.as_str())
        .bind(audience.other().as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(session)
    }

    async fn health_check(&self) -> ChatResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::TransientDeliveryFailure(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatdesk_shared::{db, AuthenticatedUser, AttachmentUpload};
    use serial_test::serial;
    use std::sync::Arc;

    async fn store() -> PgSessionStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = db::connect(&url, &db::PoolSettings::with_max_connections(4))
            .await
            .expect("pool");
        db::migrate(&pool).await.expect("migrations");
        PgSessionStore::new(pool, true)
    }

    fn authenticated(id: &str) -> StartSession {
        StartSession {
            identity: CustomerIdentity::Authenticated(AuthenticatedUser {
                id: id.to_string(),
                name: "Ada".into(),
                phone: None,
                email: Some("ada@shop.test".into()),
            }),
            visitor_id: "tab".into(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    #[serial]
    async fn test_start_twice_returns_same_session() {
        let store = store().await;
        let user = format!("u-{}", Uuid::new_v4());
        let first = store.create_or_get_session(&authenticated(&user)).await.unwrap();
        let second = store.create_or_get_session(&authenticated(&user)).await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.session.chat_id, second.session.chat_id);
    }

    #[tokio::test]
    #[ignore] // Requires database
    #[serial]
    async fn test_late_message_to_superseded_session_is_stored() {
        let store = store().await;
        let user = format!("u-{}", Uuid::new_v4());
        let old = store
            .create_or_get_session(&authenticated(&user))
            .await
            .unwrap()
            .session
            .chat_id;
        store
            .assign_session(&old, &AssignedAdmin::new("A1", "Alice"))
            .await
            .unwrap();
        store.update_session(&old, &SessionPatch::close()).await.unwrap();
        let newer = store.create_or_get_session(&authenticated(&user)).await.unwrap();
        assert!(newer.created);

        store
            .send_message(
                &old,
                &NewMessage {
                    sender_id: user.clone(),
                    sender_name: "Ada".into(),
                    sender_type: SenderType::User,
                    text: Some("One more thing".into()),
                    attachment: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(store.list_messages(&old).await.unwrap().len(), 1);
        assert_eq!(store.get_session(&old).await.unwrap().status, SessionStatus::Closed);
        let open = store.find_open_session(&authenticated(&user).identity_key()).await.unwrap();
        assert_eq!(open.map(|s| s.chat_id), Some(newer.session.chat_id));
    }

    #[tokio::test]
    #[ignore] // Requires database
    #[serial]
    async fn test_concurrent_assignment_has_one_winner() {
        let store = Arc::new(store().await);
        let user = format!("u-{}", Uuid::new_v4());
        let chat_id = store
            .create_or_get_session(&authenticated(&user))
            .await
            .unwrap()
            .session
            .chat_id;

        let a = {
            let store = Arc::clone(&store);
            let chat_id = chat_id.clone();
            tokio::spawn(async move { store.assign_session(&chat_id, &AssignedAdmin::new("AX", "X")).await })
        };
        let b = {
            let store = Arc::clone(&store);
            let chat_id = chat_id.clone();
            tokio::spawn(async move { store.assign_session(&chat_id, &AssignedAdmin::new("AY", "Y")).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(ChatError::AlreadyAssigned { .. })))
            .count();
        assert_eq!((wins, conflicts), (1, 1));
    }

    #[tokio::test]
    #[ignore] // Requires database
    #[serial]
    async fn test_message_round_trip_with_attachment() {
        let store = store().await;
        let user = format!("u-{}", Uuid::new_v4());
        let chat_id = store
            .create_or_get_session(&authenticated(&user))
            .await
            .unwrap()
            .session
            .chat_id;

        let sent = store
            .send_message(
                &chat_id,
                &NewMessage {
                    sender_id: user.clone(),
                    sender_name: "Ada".into(),
                    sender_type: SenderType::User,
                    text: Some("See attached".into()),
                    attachment: Some(AttachmentUpload {
                        kind: AttachmentKind::Document,
                        filename: "order.pdf".into(),
                        data: vec![7; 16],
                    }),
                },
            )
            .await
            .unwrap();

        let listed = store.list_messages(&chat_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, sent.id);
        assert_eq!(listed[0].message, "See attached");
        assert_eq!(listed[0].attachments, sent.attachments);

        let session = store.get_session(&chat_id).await.unwrap();
        assert_eq!(session.unread_count.admin, 1);

        let attachment_id: Uuid = sent.attachments[0]
            .url
            .rsplit('/')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let blob = store.fetch_attachment(attachment_id).await.unwrap().unwrap();
        assert_eq!(blob.data.len(), 16);
    }
}
