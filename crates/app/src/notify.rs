use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use hris_core::types::{Actor, DomainEvent, Role};

use crate::problem::ApiError;
use crate::router::AppState;

/// Envelope delivered to WebSocket clients; `id` lets clients drop duplicates.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: DomainEvent,
}

/// Fan-out of committed domain events to connected WebSocket clients.
///
/// Publishing never blocks. Clients that fall behind the buffer skip the
/// events they missed and nothing is replayed.
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
    clients: Arc<AtomicUsize>,
}

impl NotificationHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn publish(&self, event: DomainEvent) {
        counter!("notifications_published_total", "kind" => event.kind.as_str()).increment(1);
        let notification = Notification {
            id: Uuid::new_v4(),
            event,
        };
        if let Err(err) = self.sender.send(notification) {
            debug!(stage = "notify", error = %err, "no websocket subscribers for event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    fn connect(&self) -> ClientGuard {
        let value = self.clients.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("ws_clients").set(value as f64);
        ClientGuard {
            clients: self.clients.clone(),
        }
    }
}

struct ClientGuard {
    clients: Arc<AtomicUsize>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let previous = self.clients.fetch_sub(1, Ordering::SeqCst);
        gauge!("ws_clients").set(previous.saturating_sub(1) as f64);
    }
}

/// Which events a connected client may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    Staff,
    Candidate(hris_core::types::CandidateId),
}

impl Audience {
    fn for_actor(actor: &Actor) -> Option<Self> {
        match actor.role {
            role if role.is_staff() => Some(Self::Staff),
            Role::Candidate => actor.candidate_id.map(Self::Candidate),
            _ => None,
        }
    }

    fn admits(self, event: &DomainEvent) -> bool {
        match self {
            Self::Staff => true,
            Self::Candidate(id) => event.candidate_id == id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    token: Option<String>,
}

/// `GET /ws`: upgrades to a WebSocket that streams domain events as JSON.
///
/// Browsers cannot set headers on upgrade requests, so the token may also be
/// passed as `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let now = state.now();
    let actor = match query.token.as_deref() {
        Some(token) => state.token_validator().validate(token, now),
        None => state.token_validator().actor_from_headers(&headers, now),
    };
    let actor = match actor {
        Ok(actor) => actor,
        Err(err) => return ApiError::from(err).into_response(),
    };
    let Some(audience) = Audience::for_actor(&actor) else {
        return ApiError::Forbidden(format!("role {} cannot subscribe to notifications", actor.role))
            .into_response();
    };

    let hub = state.notifier().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, audience))
}

async fn handle_socket(socket: WebSocket, hub: NotificationHub, audience: Audience) {
    let _guard = hub.connect();
    let (mut sender, mut receiver) = socket.split();
    let mut events = hub.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            let notification = match events.recv().await {
                Ok(notification) => notification,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(stage = "notify", skipped, "websocket client lagged behind");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if !audience.admits(&notification.event) {
                continue;
            }
            let text = match serde_json::to_string(&notification) {
                Ok(text) => text,
                Err(err) => {
                    debug!(stage = "notify", error = %err, "failed to encode event");
                    continue;
                }
            };
            if let Err(err) = sender.send(Message::Text(text)).await {
                debug!(stage = "notify", error = %err, "websocket send failed");
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hris_core::types::{ApplicationId, ApplicationStatus, CandidateId, EventKind, JobId};

    fn event(candidate: i64) -> DomainEvent {
        DomainEvent {
            kind: EventKind::StatusChanged,
            application_id: ApplicationId(1),
            candidate_id: CandidateId(candidate),
            job_id: JobId(1),
            status: ApplicationStatus::CvScreened,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = NotificationHub::new(8);
        let mut receiver = hub.subscribe();

        hub.publish(event(3));

        let received = receiver.recv().await.expect("event");
        assert_eq!(received.event.candidate_id, CandidateId(3));

        let json = serde_json::to_value(&received).expect("json");
        assert_eq!(json["kind"], "status_changed");
        assert_eq!(json["id"], received.id.to_string());
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let hub = NotificationHub::new(8);
        hub.publish(event(1));
    }

    #[tokio::test]
    async fn lagging_receiver_skips_missed_events() {
        let hub = NotificationHub::new(2);
        let mut receiver = hub.subscribe();
        for candidate in 1..=4 {
            hub.publish(event(candidate));
        }

        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(
            receiver.recv().await.expect("event").event.candidate_id,
            CandidateId(3)
        );
    }

    #[test]
    fn candidates_only_see_their_own_events() {
        let staff = Audience::for_actor(&Actor::staff(Role::Manager)).expect("staff");
        let candidate = Audience::for_actor(&Actor::candidate(CandidateId(5))).expect("candidate");
        assert!(staff.admits(&event(1)));
        assert!(candidate.admits(&event(5)));
        assert!(!candidate.admits(&event(6)));
        assert!(Audience::for_actor(&Actor::staff(Role::Employee)).is_none());
    }

    #[test]
    fn client_guard_tracks_connections() {
        let hub = NotificationHub::new(4);
        let first = hub.connect();
        let second = hub.connect();
        assert_eq!(hub.clients.load(Ordering::SeqCst), 2);
        drop(first);
        drop(second);
        assert_eq!(hub.clients.load(Ordering::SeqCst), 0);
    }
}
