use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::{info, warn};
use tokio::{
    sync::watch,
    time::{Instant, sleep_until},
};

use super::{AdminError, AdminService, AuthRequest, BooleanReply, ResetPasswordRequest, ShutdownDelay};

const MIN_PASSWORD_LEN: usize = 4;
const MAX_PASSWORD_LEN: usize = 8;

/// The host's user store, as seen by the admin surface.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `None` when no such user exists.
    async fn verify_password(&self, username: &str, password: &str) -> Result<Option<bool>, AdminError>;

    async fn is_connected(&self, username: &str) -> Result<bool, AdminError>;

    /// Hash and store a new password. Returns false when no such user exists.
    async fn set_password(&self, username: &str, new_password: &str) -> Result<bool, AdminError>;

    async fn active_user_count(&self) -> Result<usize, AdminError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownProgress {
    Active,
    Scheduled { deadline: Instant },
    /// Deadline passed, host is tearing down.
    Draining,
    Complete,
}

/// In-process admin service for a host.
///
/// Once a scheduled shutdown's deadline passes, the signal from
/// [`HostControl::shutdown_signal`] flips to `true`. The host finishes its own
/// teardown and then calls [`HostControl::complete_shutdown`], which flips
/// [`HostControl::completion_signal`]. The control channel should stop on the
/// latter so `IsShutdownComplete` is answerable while the host drains.
pub struct HostControl<D> {
    directory: D,
    progress: Arc<Mutex<ShutdownProgress>>,
    signal: Arc<watch::Sender<bool>>,
    completed: watch::Sender<bool>,
}

impl<D> HostControl<D>
where
    D: UserDirectory,
{
    pub fn new(directory: D) -> Self {
        let (signal, _) = watch::channel(false);
        let (completed, _) = watch::channel(false);
        Self {
            directory,
            progress: Arc::new(Mutex::new(ShutdownProgress::Active)),
            signal: Arc::new(signal),
            completed,
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn progress(&self) -> ShutdownProgress {
        *lock(&self.progress)
    }

    /// Flips to `true` when a scheduled shutdown is due.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    /// Flips to `true` once [`HostControl::complete_shutdown`] has run.
    pub fn completion_signal(&self) -> watch::Receiver<bool> {
        self.completed.subscribe()
    }

    pub fn complete_shutdown(&self) {
        *lock(&self.progress) = ShutdownProgress::Complete;
        self.signal.send_replace(true);
        self.completed.send_replace(true);
        info!("shutdown complete");
    }
}

#[async_trait]
impl<D> AdminService for HostControl<D>
where
    D: UserDirectory,
{
    async fn authenticate(&self, request: AuthRequest) -> Result<BooleanReply, AdminError> {
        match self
            .directory
            .verify_password(&request.username, &request.password)
            .await?
        {
            Some(true) => Ok(BooleanReply::ok("Authenticated")),
            Some(false) | None => {
                warn!("authentication failed for '{}'", request.username);
                Ok(BooleanReply::refused("Authentication failed"))
            }
        }
    }

    async fn reset_password(&self, request: ResetPasswordRequest) -> Result<BooleanReply, AdminError> {
        let length = request.new_password.chars().count();
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&length) {
            return Ok(BooleanReply::refused(format!(
                "Passwords must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
            )));
        }

        if self.directory.is_connected(&request.username).await? {
            return Ok(BooleanReply::refused("User is currently logged in"));
        }

        if self
            .directory
            .set_password(&request.username, &request.new_password)
            .await?
        {
            info!("password reset for '{}'", request.username);
            Ok(BooleanReply::ok("Password reset"))
        } else {
            Ok(BooleanReply::refused("Unknown user"))
        }
    }

    async fn begin_shutdown(&self, delay: ShutdownDelay) -> Result<BooleanReply, AdminError> {
        let deadline = Instant::now() + delay.as_duration();
        {
            let mut progress = lock(&self.progress);
            if *progress != ShutdownProgress::Active {
                return Ok(BooleanReply::refused("Shutdown already in progress"));
            }
            *progress = ShutdownProgress::Scheduled { deadline };
        }
        info!("shutdown scheduled in {} minute(s)", delay.minutes());

        let progress = Arc::clone(&self.progress);
        let signal = Arc::clone(&self.signal);
        tokio::spawn(async move {
            sleep_until(deadline).await;
            {
                let mut progress = lock(&progress);
                if matches!(*progress, ShutdownProgress::Scheduled { .. }) {
                    *progress = ShutdownProgress::Draining;
                }
            }
            signal.send_replace(true);
            info!("shutdown deadline reached");
        });

        Ok(BooleanReply::ok("Shutdown request successfully submitted"))
    }

    async fn total_user_count(&self) -> Result<i64, AdminError> {
        let count = self.directory.active_user_count().await?;
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn is_shutdown_complete(&self) -> Result<BooleanReply, AdminError> {
        let reply = match self.progress() {
            ShutdownProgress::Complete => BooleanReply::ok("Shutdown complete"),
            ShutdownProgress::Scheduled { deadline } => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let seconds = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                if seconds > 0 {
                    BooleanReply::refused(format!("Shutdown will complete in {seconds} seconds"))
                } else {
                    BooleanReply::refused("Shutdown is in progress")
                }
            }
            ShutdownProgress::Draining => BooleanReply::refused("Shutdown is in progress"),
            ShutdownProgress::Active => BooleanReply::refused("Hybrasyl active, no shutdown in progress"),
        };
        Ok(reply)
    }
}

fn lock(progress: &Mutex<ShutdownProgress>) -> MutexGuard<'_, ShutdownProgress> {
    progress.lock().unwrap_or_else(PoisonError::into_inner)
}
