//! Admin Dashboard Feed
//!
//! Keeps a session list current from two sources: row pushes on the
//! dashboard room and a periodic poll of the store. Either source alone
//! converges; the poll is authoritative and repairs anything a lost push
//! left behind.

use chatdesk_shared::{
    ChatId, ChatResult, ChatSession, RoomId, SenderType, ServerEvent, SessionFilter, SessionStatus,
    SessionStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::channel::{ChannelHandle, ChannelUpdate};

/// Session list as the console shows it
#[derive(Debug, Clone, Default)]
pub struct DashboardModel {
    filter: SessionFilter,
    rows: HashMap<ChatId, ChatSession>,
    /// Conversation the local admin has open; its unread badge is hidden
    viewing: Option<ChatId>,
}

impl DashboardModel {
    pub fn new(filter: SessionFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// Apply a pushed row. Returns whether anything visible changed.
    pub fn apply_event(&mut self, event: &ServerEvent) -> bool {
        let session = match event {
            ServerEvent::SessionCreated { session } | ServerEvent::SessionUpdated { session } => {
                session
            }
            _ => return false,
        };

        if !self.filter.matches(session) {
            return self.rows.remove(&session.chat_id).is_some();
        }
        match self.rows.get(&session.chat_id) {
            Some(current) if current.updated_at > session.updated_at => false,
            _ => {
                self.rows.insert(session.chat_id.clone(), session.clone());
                true
            }
        }
    }

    /// Replace everything with a poll result
    pub fn apply_snapshot(&mut self, sessions: Vec<ChatSession>) {
        self.rows = sessions
            .into_iter()
            .filter(|s| self.filter.matches(s))
            .map(|s| (s.chat_id.clone(), s))
            .collect();
    }

    pub fn set_viewing(&mut self, chat_id: Option<ChatId>) {
        self.viewing = chat_id;
    }

    /// Rows by most recent activity first
    pub fn rows(&self) -> Vec<ChatSession> {
        let mut rows: Vec<ChatSession> = self
            .rows
            .values()
            .cloned()
            .map(|mut row| {
                if self.viewing.as_ref() == Some(&row.chat_id) {
                    row.unread_count.reset_for(SenderType::Admin);
                }
                row
            })
            .collect();
        rows.sort_by(|a, b| {
            activity(b)
                .cmp(&activity(a))
                .then_with(|| a.chat_id.as_str().cmp(b.chat_id.as_str()))
        });
        rows
    }

    pub fn get(&self, chat_id: &ChatId) -> Option<&ChatSession> {
        self.rows.get(chat_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Admin-side unread messages across all rows
    pub fn unread_total(&self) -> u32 {
        self.rows()
            .iter()
            .map(|row| row.unread_count.for_audience(SenderType::Admin))
            .sum()
    }

    pub fn waiting_count(&self) -> usize {
        self.rows
            .values()
            .filter(|row| row.status == SessionStatus::Waiting)
            .count()
    }
}

fn activity(session: &ChatSession) -> time::OffsetDateTime {
    session
        .last_message
        .as_ref()
        .map(|m| m.timestamp.max(session.updated_at))
        .unwrap_or(session.updated_at)
}

#[derive(Clone)]
struct FeedCore {
    store: Arc<dyn SessionStore>,
    model: Arc<Mutex<DashboardModel>>,
    filter: SessionFilter,
    changed: Arc<watch::Sender<u64>>,
}

impl FeedCore {
    fn bump(&self) {
        self.changed.send_modify(|version| *version = version.wrapping_add(1));
    }

    async fn refresh(&self) -> ChatResult<()> {
        let sessions = self.store.list_sessions(&self.filter).await?;
        self.model.lock().await.apply_snapshot(sessions);
        self.bump();
        Ok(())
    }

    async fn refresh_logged(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "Dashboard refresh failed");
        }
    }
}

async fn run_push(core: FeedCore, mut updates: broadcast::Receiver<ChannelUpdate>) {
    loop {
        match updates.recv().await {
            Ok(ChannelUpdate::Event(event)) => {
                let changed = core.model.lock().await.apply_event(&event);
                if changed {
                    core.bump();
                }
            }
            Ok(ChannelUpdate::Reconnected) => core.refresh_logged().await,
            Ok(ChannelUpdate::Reconnecting | ChannelUpdate::Closed) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Dashboard updates lagged, refreshing");
                core.refresh_logged().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_poll(core: FeedCore, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires at once and the initial load already happened
    interval.tick().await;
    loop {
        interval.tick().await;
        core.refresh_logged().await;
    }
}

pub struct Dashboard {
    core: FeedCore,
    changes: watch::Receiver<u64>,
    push: JoinHandle<()>,
    poll: JoinHandle<()>,
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.push.abort();
        self.poll.abort();
    }
}

impl Dashboard {
    pub async fn start(
        store: Arc<dyn SessionStore>,
        channel: &ChannelHandle,
        filter: SessionFilter,
        poll_interval: Duration,
    ) -> ChatResult<Self> {
        let updates = channel.subscribe();
        channel.join(RoomId::Dashboard).await?;

        let (changed, changes) = watch::channel(0u64);
        let core = FeedCore {
            store,
            model: Arc::new(Mutex::new(DashboardModel::new(filter.clone()))),
            filter,
            changed: Arc::new(changed),
        };
        core.refresh().await?;

        let push = tokio::spawn(run_push(core.clone(), updates));
        let poll = tokio::spawn(run_poll(core.clone(), poll_interval));

        Ok(Self {
            core,
            changes,
            push,
            poll,
        })
    }

    /// Poll now instead of waiting for the next tick
    pub async fn refresh(&self) -> ChatResult<()> {
        self.core.refresh().await
    }

    pub async fn rows(&self) -> Vec<ChatSession> {
        self.core.model.lock().await.rows()
    }

    pub async fn unread_total(&self) -> u32 {
        self.core.model.lock().await.unread_total()
    }

    pub async fn waiting_count(&self) -> usize {
        self.core.model.lock().await.waiting_count()
    }

    /// Mark which conversation the local admin is looking at
    pub async fn view(&self, chat_id: Option<ChatId>) {
        self.core.model.lock().await.set_viewing(chat_id);
        self.core.bump();
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatdesk_shared::{Customer, LastMessage};
    use time::OffsetDateTime;

    fn row(id: &str, status: SessionStatus, offset_s: i64) -> ChatSession {
        let mut session = ChatSession::new(Customer::anonymous());
        session.chat_id = ChatId::from(id);
        session.status = status;
        session.updated_at = OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(offset_s);
        session
    }

    fn open_filter() -> SessionFilter {
        SessionFilter {
            statuses: vec![SessionStatus::Waiting, SessionStatus::Active],
            ..Default::default()
        }
    }

    #[test]
    fn test_rows_sorted_by_activity() {
        let mut model = DashboardModel::new(SessionFilter::default());
        model.apply_snapshot(vec![
            row("chat_a", SessionStatus::Waiting, 10),
            row("chat_b", SessionStatus::Waiting, 30),
        ]);

        let mut c = row("chat_c", SessionStatus::Waiting, 5);
        c.last_message = Some(LastMessage {
            content: "hi".into(),
            timestamp: OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(40),
            from_admin: false,
        });
        model.apply_event(&ServerEvent::SessionCreated { session: c });

        let ids: Vec<String> = model.rows().iter().map(|r| r.chat_id.0.clone()).collect();
        assert_eq!(ids, vec!["chat_c", "chat_b", "chat_a"]);
    }

    #[test]
    fn test_stale_push_ignored() {
        let mut model = DashboardModel::new(SessionFilter::default());
        model.apply_event(&ServerEvent::SessionUpdated {
            session: row("chat_a", SessionStatus::Active, 20),
        });
        let changed = model.apply_event(&ServerEvent::SessionUpdated {
            session: row("chat_a", SessionStatus::Waiting, 10),
        });
        assert!(!changed);
        assert_eq!(model.rows()[0].status, SessionStatus::Active);
    }

    #[test]
    fn test_row_leaving_filter_is_removed() {
        let mut model = DashboardModel::new(open_filter());
        model.apply_event(&ServerEvent::SessionCreated {
            session: row("chat_a", SessionStatus::Waiting, 1),
        });
        assert_eq!(model.waiting_count(), 1);

        assert!(model.apply_event(&ServerEvent::SessionUpdated {
            session: row("chat_a", SessionStatus::Closed, 2),
        }));
        assert!(model.is_empty());
    }

    #[test]
    fn test_viewed_row_hides_unread() {
        let mut model = DashboardModel::new(SessionFilter::default());
        let mut a = row("chat_a", SessionStatus::Active, 1);
        a.unread_count.admin = 3;
        let mut b = row("chat_b", SessionStatus::Active, 2);
        b.unread_count.admin = 2;
        model.apply_snapshot(vec![a, b]);
        assert_eq!(model.unread_total(), 5);

        model.set_viewing(Some(ChatId::from("chat_a")));
        assert_eq!(model.unread_total(), 2);
        // The stored row is untouched
        assert_eq!(
            model.get(&ChatId::from("chat_a")).map(|r| r.unread_count.admin),
            Some(3)
        );
    }

    #[test]
    fn test_snapshot_is_authoritative() {
        let mut model = DashboardModel::new(SessionFilter::default());
        model.apply_event(&ServerEvent::SessionCreated {
            session: row("chat_gone", SessionStatus::Waiting, 1),
        });
        model.apply_snapshot(vec![row("chat_a", SessionStatus::Waiting, 2)]);
        assert_eq!(model.len(), 1);
        assert!(model.get(&ChatId::from("chat_gone")).is_none());
    }

    #[test]
    fn test_unrelated_events_ignored() {
        let mut model = DashboardModel::new(SessionFilter::default());
        assert!(!model.apply_event(&ServerEvent::Pong));
        assert!(model.is_empty());
    }
}
