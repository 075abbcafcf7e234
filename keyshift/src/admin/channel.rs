//! Request/reply control channel carried over Redis lists.
//!
//! A client pushes a [`ControlEnvelope`] onto the control queue and polls
//! `<queue>:reply:<id>`. The host pops envelopes, dispatches them to its
//! [`AdminService`] and pushes the JSON reply to that key with a short expiry.
//! Envelopes carry the time the client stops waiting. The host drops them
//! unanswered after that, and a client that times out withdraws its envelope.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::watch,
    time::{Instant, sleep},
};
use uuid::Uuid;

use super::{AdminError, AdminService, AuthRequest, BooleanReply, ResetPasswordRequest, ShutdownDelay};

const REPLY_TTL_SECONDS: i64 = 60;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long a host keeps answering after its stop signal, so pollers see the final state.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    Authenticate(AuthRequest),
    ResetPassword(ResetPasswordRequest),
    BeginShutdown { delay: ShutdownDelay },
    TotalUserCount,
    IsShutdownComplete,
}

impl ControlRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "Authenticate",
            Self::ResetPassword(_) => "ResetPassword",
            Self::BeginShutdown { .. } => "BeginShutdown",
            Self::TotalUserCount => "TotalUserCount",
            Self::IsShutdownComplete => "IsShutdownComplete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEnvelope {
    pub id: String,
    /// Who sent the request, for the host's logs
    pub peer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub request: ControlRequest,
}

impl ControlEnvelope {
    /// True once the sender has stopped waiting for a reply.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlReply {
    Boolean(BooleanReply),
    UserCount { number: i64 },
    Error { message: String },
}

pub fn reply_key(queue: &str, id: &str) -> String {
    format!("{queue}:reply:{id}")
}

/// Run one request against `service`. Service errors become an error reply.
pub async fn dispatch<A>(service: &A, request: ControlRequest) -> ControlReply
where
    A: AdminService + ?Sized,
{
    let operation = request.operation();
    let result = match request {
        ControlRequest::Authenticate(request) => service.authenticate(request).await.map(ControlReply::Boolean),
        ControlRequest::ResetPassword(request) => service.reset_password(request).await.map(ControlReply::Boolean),
        ControlRequest::BeginShutdown { delay } => service.begin_shutdown(delay).await.map(ControlReply::Boolean),
        ControlRequest::TotalUserCount => service
            .total_user_count()
            .await
            .map(|number| ControlReply::UserCount { number }),
        ControlRequest::IsShutdownComplete => service.is_shutdown_complete().await.map(ControlReply::Boolean),
    };

    result.unwrap_or_else(|err| {
        error!("control: {operation} failed: {err}");
        ControlReply::Error {
            message: err.to_string(),
        }
    })
}

/// Keeps a serve loop alive for `grace` after its stop signal first reads true.
#[derive(Debug, Clone, Copy)]
struct StopWindow {
    grace: Duration,
    stopped_at: Option<Instant>,
}

impl StopWindow {
    fn new(grace: Duration) -> Self {
        Self { grace, stopped_at: None }
    }

    fn keep_serving(&mut self, stopped: bool, now: Instant) -> bool {
        if !stopped {
            return true;
        }
        let stopped_at = *self.stopped_at.get_or_insert(now);
        now.saturating_duration_since(stopped_at) < self.grace
    }
}

/// Serve control requests from `queue` until `grace` has passed since
/// `shutdown` turned true.
///
/// A host passes [`HostControl::completion_signal`](super::HostControl::completion_signal)
/// together with [`STOP_GRACE`] so that `IsShutdownComplete` is still answered
/// once teardown finishes. Returns the number of requests handled.
pub async fn serve_control_channel<A>(
    service: &A,
    mut conn: ConnectionManager,
    queue: &str,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> Result<u64, AdminError>
where
    A: AdminService + ?Sized,
{
    info!("control: serving requests on {queue}");
    let mut handled = 0u64;
    let mut window = StopWindow::new(grace);

    while window.keep_serving(*shutdown.borrow_and_update(), Instant::now()) {
        let popped: Option<String> = conn.lpop(queue, None).await?;
        let Some(raw) = popped else {
            tokio::select! {
                _ = sleep(POLL_INTERVAL) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        };

        let envelope: ControlEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("control: dropping undecodable request: {err}");
                continue;
            }
        };

        if envelope.is_expired(Utc::now()) {
            warn!(
                "control: dropping expired {} request {} from {}",
                envelope.request.operation(),
                envelope.id,
                envelope.peer
            );
            continue;
        }

        info!(
            "control: {} request {} from {}",
            envelope.request.operation(),
            envelope.id,
            envelope.peer
        );
        let reply = dispatch(service, envelope.request).await;
        let payload = serde_json::to_string(&reply)?;
        let key = reply_key(queue, &envelope.id);

        let _: () = redis::pipe()
            .rpush(&key, payload)
            .ignore()
            .expire(&key, REPLY_TTL_SECONDS)
            .ignore()
            .query_async(&mut conn)
            .await?;
        handled += 1;
    }

    info!("control: stopped after {handled} request(s)");
    Ok(handled)
}

/// Admin client that talks to a host through its control queue.
#[derive(Clone)]
pub struct ControlChannelClient {
    conn: ConnectionManager,
    queue: String,
    peer: String,
    timeout: Duration,
}

impl ControlChannelClient {
    pub fn new(conn: ConnectionManager, queue: impl Into<String>) -> Self {
        Self {
            conn,
            queue: queue.into(),
            peer: "keyshift".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn call(&self, request: ControlRequest) -> Result<ControlReply, AdminError> {
        let operation = request.operation();
        let envelope = ControlEnvelope {
            id: Uuid::new_v4().to_string(),
            peer: self.peer.clone(),
            expires_at: chrono::Duration::from_std(self.timeout)
                .ok()
                .and_then(|timeout| Utc::now().checked_add_signed(timeout)),
            request,
        };
        let payload = serde_json::to_string(&envelope)?;
        let key = reply_key(&self.queue, &envelope.id);

        let mut conn = self.conn.clone();
        let _: () = conn.rpush(&self.queue, &payload).await?;
        debug!("control: sent {operation} as {}", envelope.id);

        let deadline = Instant::now() + self.timeout;
        let raw = loop {
            let popped: Option<String> = conn.lpop(&key, None).await?;
            if let Some(raw) = popped {
                break raw;
            }
            if Instant::now() >= deadline {
                self.withdraw(&mut conn, &payload, &envelope.id).await;
                return Err(AdminError::Timeout { operation });
            }
            sleep(POLL_INTERVAL).await;
        };

        match serde_json::from_str(&raw)? {
            ControlReply::Error { message } => Err(AdminError::Remote { message }),
            reply => Ok(reply),
        }
    }

    /// Remove an unanswered envelope so a late host never runs it.
    async fn withdraw(&self, conn: &mut ConnectionManager, payload: &str, id: &str) {
        let removed: Result<i64, _> = conn.lrem(&self.queue, 1, payload).await;
        match removed {
            Ok(0) => debug!("control: request {id} was already taken by the host"),
            Ok(_) => debug!("control: withdrew request {id}"),
            Err(err) => warn!("control: could not withdraw request {id}: {err}"),
        }
    }

    async fn call_boolean(&self, request: ControlRequest) -> Result<BooleanReply, AdminError> {
        let operation = request.operation();
        match self.call(request).await? {
            ControlReply::Boolean(reply) => Ok(reply),
            other => Err(unexpected(operation, &other)),
        }
    }
}

fn unexpected(operation: &str, reply: &ControlReply) -> AdminError {
    AdminError::Remote {
        message: format!("unexpected reply to {operation}: {reply:?}"),
    }
}

#[async_trait]
impl AdminService for ControlChannelClient {
    async fn authenticate(&self, request: AuthRequest) -> Result<BooleanReply, AdminError> {
        self.call_boolean(ControlRequest::Authenticate(request)).await
    }

    async fn reset_password(&self, request: ResetPasswordRequest) -> Result<BooleanReply, AdminError> {
        self.call_boolean(ControlRequest::ResetPassword(request)).await
    }

    async fn begin_shutdown(&self, delay: ShutdownDelay) -> Result<BooleanReply, AdminError> {
        self.call_boolean(ControlRequest::BeginShutdown { delay }).await
    }

    async fn total_user_count(&self) -> Result<i64, AdminError> {
        match self.call(ControlRequest::TotalUserCount).await? {
            ControlReply::UserCount { number } => Ok(number),
            other => Err(unexpected("TotalUserCount", &other)),
        }
    }

    async fn is_shutdown_complete(&self) -> Result<BooleanReply, AdminError> {
        self.call_boolean(ControlRequest::IsShutdownComplete).await
    }
}
