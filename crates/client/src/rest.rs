//! Session Store over the chatdesk REST API
//!
//! Idempotent reads are retried with exponential backoff and jitter when the
//! failure is transient. Writes are sent exactly once; the caller decides
//! whether to offer a retry.

use async_trait::async_trait;
use chatdesk_shared::{
    AdminId, AssignedAdmin, ChatError, ChatId, ChatResult, ChatSession, Message, NewMessage,
    SenderType, SessionFilter, SessionPatch, SessionStatus, SessionStore, StartSession,
    StartedSession,
};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::ClientConfig;

/// Upper bound for a single backoff step
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    details: Option<ErrorDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetails {
    holder: Option<String>,
    from: Option<SessionStatus>,
    to: Option<SessionStatus>,
}

#[derive(Serialize)]
struct MarkReadRequest {
    audience: SenderType,
}

pub struct RestSessionStore {
    http: Client,
    base_url: String,
    token: Option<String>,
    max_retries: usize,
    retry_base_delay: Duration,
}

impl RestSessionStore {
    pub fn new(config: &ClientConfig) -> ChatResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ChatError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: None,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    /// Send every request with this bearer token (admins and signed-in customers)
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/api/v1{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        chat_id: Option<&ChatId>,
    ) -> ChatResult<T> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status.is_success() {
            return response.json::<T>().await.map_err(transport_error);
        }

        let body = response.text().await.unwrap_or_default();
        Err(decode_error(status, &body, chat_id))
    }

    /// GET with retry on transient failures
    async fn read<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        chat_id: Option<&ChatId>,
    ) -> ChatResult<T> {
        let retry_strategy = ExponentialBackoff::from_millis(self.retry_base_delay.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .map(jitter)
            .take(self.max_retries);

        Retry::spawn(retry_strategy, || async {
            let result = self
                .execute::<T>(self.request(Method::GET, path).query(query), chat_id)
                .await;

            match result {
                Ok(value) => Ok(Ok(value)),
                Err(e) if e.is_transient() => {
                    tracing::debug!(path, error = %e, "Transient read failure - will retry");
                    Err(e)
                }
                Err(e) => Ok(Err(e)),
            }
        })
        .await
        .and_then(|result| result)
    }

    async fn write<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        chat_id: Option<&ChatId>,
    ) -> ChatResult<T> {
        self.execute(self.request(method, path).json(body), chat_id)
            .await
    }
}

fn transport_error(err: reqwest::Error) -> ChatError {
    if err.is_decode() {
        ChatError::Internal(format!("unexpected response body: {err}"))
    } else {
        ChatError::TransientDeliveryFailure(err.to_string())
    }
}

/// Rebuild the `ChatError` the server mapped into an HTTP error
fn decode_error(status: StatusCode, body: &str, chat_id: Option<&ChatId>) -> ChatError {
    let chat_id = chat_id.cloned().unwrap_or_else(|| ChatId::from(""));

    let Ok(ErrorEnvelope { error }) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return match status {
            StatusCode::NOT_FOUND => ChatError::NotFound(chat_id),
            s if s.is_server_error() => ChatError::TransientDeliveryFailure(format!("HTTP {s}")),
            s => ChatError::Internal(format!("unexpected HTTP {s}")),
        };
    };
    let details = error.details.unwrap_or_default();

    match error.code.as_str() {
        "NOT_FOUND" => ChatError::NotFound(chat_id),
        "ALREADY_ASSIGNED" => ChatError::AlreadyAssigned {
            chat_id,
            holder: AdminId::from(details.holder.unwrap_or_default().as_str()),
        },
        "UNAUTHORIZED" | "FORBIDDEN" => ChatError::Unauthorized(error.message),
        "INVALID_TRANSITION" => match (details.from, details.to) {
            (Some(from), Some(to)) => ChatError::InvalidTransition { from, to },
            _ => ChatError::Internal(error.message),
        },
        "SESSION_CLOSED" => ChatError::SessionClosed(chat_id),
        "VALIDATION_ERROR" | "BAD_REQUEST" => ChatError::Validation(error.message),
        "SERVICE_UNAVAILABLE" | "DATABASE_ERROR" => {
            ChatError::TransientDeliveryFailure(error.message)
        }
        _ if status.is_server_error() => ChatError::TransientDeliveryFailure(error.message),
        _ => ChatError::Internal(error.message),
    }
}

#[async_trait]
impl SessionStore for RestSessionStore {
    async fn create_or_get_session(&self, request: &StartSession) -> ChatResult<StartedSession> {
        self.write(Method::POST, "/chat/sessions", request, None)
            .await
    }

    async fn get_session(&self, chat_id: &ChatId) -> ChatResult<ChatSession> {
        self.read(&format!("/chat/sessions/{chat_id}"), &[], Some(chat_id))
            .await
    }

    async fn update_session(&self, chat_id: &ChatId, patch: &SessionPatch) -> ChatResult<ChatSession> {
        self.write(
            Method::PATCH,
            &format!("/chat/sessions/{chat_id}"),
            patch,
            Some(chat_id),
        )
        .await
    }

    async fn assign_session(&self, chat_id: &ChatId, admin: &AssignedAdmin) -> ChatResult<ChatSession> {
        self.write(
            Method::POST,
            &format!("/chat/sessions/{chat_id}/assign"),
            admin,
            Some(chat_id),
        )
        .await
    }

    async fn list_messages(&self, chat_id: &ChatId) -> ChatResult<Vec<Message>> {
        self.read(&format!("/chat/sessions/{chat_id}/messages"), &[], Some(chat_id))
            .await
    }

    async fn send_message(&self, chat_id: &ChatId, message: &NewMessage) -> ChatResult<Message> {
        self.write(
            Method::POST,
            &format!("/chat/sessions/{chat_id}/messages"),
            message,
            Some(chat_id),
        )
        .await
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> ChatResult<Vec<ChatSession>> {
        let mut query = Vec::new();
        if !filter.statuses.is_empty() {
            let statuses: Vec<&str> = filter.statuses.iter().map(|s| s.as_str()).collect();
            query.push(("status", statuses.join(",")));
        }
        if let Some(admin) = &filter.assigned_to {
            query.push(("assigned_to", admin.to_string()));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        self.read("/chat/sessions", &query, None).await
    }

    async fn mark_read(&self, chat_id: &ChatId, audience: SenderType) -> ChatResult<ChatSession> {
        self.write(
            Method::POST,
            &format!("/chat/sessions/{chat_id}/read"),
            &MarkReadRequest { audience },
            Some(chat_id),
        )
        .await
    }

    async fn health_check(&self) -> ChatResult<()> {
        let response = self
            .http
            .get(format!("{}/health/ready", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ChatError::TransientDeliveryFailure(format!(
                "health check returned HTTP {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatdesk_shared::Customer;
    use serde_json::json;

    fn store_for(server: &mockito::ServerGuard) -> RestSessionStore {
        let config = ClientConfig {
            api_url: server.url(),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1),
            ..ClientConfig::default()
        };
        RestSessionStore::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_session_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let session = ChatSession::new(Customer::anonymous());
        let path = format!("/api/v1/chat/sessions/{}", session.chat_id);

        let mock = server
            .mock("GET", path.as_str())
            .match_header("authorization", "Bearer admin-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&session).unwrap())
            .create_async()
            .await;

        let store = store_for(&server).with_token("admin-token");
        let fetched = store.get_session(&session.chat_id).await.unwrap();
        assert_eq!(fetched, session);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_conflict_maps_back_to_already_assigned() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "error": {
                "code": "ALREADY_ASSIGNED",
                "message": "Chat session is already assigned to A1",
                "details": { "holder": "A1" }
            }
        });
        server
            .mock("POST", "/api/v1/chat/sessions/chat_1/assign")
            .with_status(409)
            .with_body(body.to_string())
            .create_async()
            .await;

        let err = store_for(&server)
            .assign_session(&ChatId::from("chat_1"), &AssignedAdmin::new("B2", "Bob"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ChatError::AlreadyAssigned {
                chat_id: ChatId::from("chat_1"),
                holder: AdminId::from("A1"),
            }
        );
    }

    #[tokio::test]
    async fn test_transient_reads_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/chat/sessions/chat_1/messages")
            .with_status(503)
            .with_body(r#"{"error":{"code":"SERVICE_UNAVAILABLE","message":"Service unavailable"}}"#)
            .expect(3)
            .create_async()
            .await;

        let err = store_for(&server)
            .list_messages(&ChatId::from("chat_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::TransientDeliveryFailure(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_permanent_read_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/chat/sessions/chat_gone")
            .with_status(404)
            .with_body(r#"{"error":{"code":"NOT_FOUND","message":"Resource not found"}}"#)
            .expect(1)
            .create_async()
            .await;

        let err = store_for(&server)
            .get_session(&ChatId::from("chat_gone"))
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::NotFound(ChatId::from("chat_gone")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_writes_are_sent_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/chat/sessions/chat_1/messages")
            .with_status(503)
            .with_body(r#"{"error":{"code":"SERVICE_UNAVAILABLE","message":"Service unavailable"}}"#)
            .expect(1)
            .create_async()
            .await;

        let message = NewMessage {
            sender_id: "visitor:tab".into(),
            sender_name: "Guest".into(),
            sender_type: SenderType::User,
            text: Some("Hello".into()),
            attachment: None,
        };
        let err = store_for(&server)
            .send_message(&ChatId::from("chat_1"), &message)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_sessions_encodes_filter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/chat/sessions")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("status".into(), "waiting,active".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "50".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let filter = SessionFilter {
            statuses: vec![SessionStatus::Waiting, SessionStatus::Active],
            assigned_to: None,
            limit: Some(50),
        };
        let sessions = store_for(&server).list_sessions(&filter).await.unwrap();
        assert!(sessions.is_empty());
        mock.assert_async().await;
    }

    #[test]
    fn test_unparsable_server_error_is_transient() {
        let err = decode_error(StatusCode::BAD_GATEWAY, "<html>", None);
        assert!(err.is_transient());
        let err = decode_error(
            StatusCode::CONFLICT,
            r#"{"error":{"code":"INVALID_TRANSITION","message":"x","details":{"from":"waiting","to":"archived"}}}"#,
            None,
        );
        assert_eq!(
            err,
            ChatError::InvalidTransition {
                from: SessionStatus::Waiting,
                to: SessionStatus::Archived,
            }
        );
    }
}
