//! Administrative remote-control surface of a running host.

mod channel;
mod credentials;
mod host;

pub use channel::{
    ControlChannelClient, ControlEnvelope, ControlReply, ControlRequest, STOP_GRACE, dispatch, reply_key,
    serve_control_channel,
};
pub use credentials::{
    CA_FILE, CERT_FILE, CredentialPaths, CredentialSet, KEY_FILE, connect_tls, control_url,
};
pub use host::{HostControl, ShutdownProgress, UserDirectory};

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reply shape shared by most admin operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanReply {
    pub success: bool,
    pub message: String,
}

impl BooleanReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub username: String,
    pub new_password: String,
}

/// Grace period before a host shuts down, in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShutdownDelay(u32);

impl ShutdownDelay {
    pub const IMMEDIATE: Self = Self(0);

    /// Rejects negative delays before any request is built.
    pub fn from_minutes(minutes: i64) -> Result<Self, AdminError> {
        if minutes < 0 {
            return Err(AdminError::NegativeDelay { minutes });
        }
        u32::try_from(minutes)
            .map(Self)
            .map_err(|_| AdminError::DelayOutOfRange { minutes })
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }
}

/// Operations a host exposes for remote control.
#[async_trait]
pub trait AdminService: Send + Sync {
    async fn authenticate(&self, request: AuthRequest) -> Result<BooleanReply, AdminError>;

    async fn reset_password(&self, request: ResetPasswordRequest) -> Result<BooleanReply, AdminError>;

    /// Schedule a graceful shutdown after `delay`.
    async fn begin_shutdown(&self, delay: ShutdownDelay) -> Result<BooleanReply, AdminError>;

    /// Number of active users.
    async fn total_user_count(&self) -> Result<i64, AdminError>;

    async fn is_shutdown_complete(&self) -> Result<BooleanReply, AdminError>;
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("shutdown delay must not be negative, got {minutes} minute(s)")]
    NegativeDelay { minutes: i64 },

    #[error("shutdown delay of {minutes} minute(s) is too large")]
    DelayOutOfRange { minutes: i64 },

    #[error("missing credential file(s): {}", display_paths(.paths))]
    MissingCredentials { paths: Vec<PathBuf> },

    #[error("failed to read credential file {}: {source}", .path.display())]
    CredentialRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("control channel error: {0}")]
    Channel(#[from] redis::RedisError),

    #[error("control message could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("no reply to {operation} before the timeout")]
    Timeout { operation: &'static str },

    #[error("user directory error: {message}")]
    Directory { message: String },

    #[error("host reported an error: {message}")]
    Remote { message: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
