use std::{collections::HashMap, io, sync::Arc};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tracing::warn;

use crate::wire;

/// Write side of one connected client.
///
/// A session may receive a broadcast concurrently with a reply to its
/// own request, so every outbound write goes through the internal
/// mutex.
pub struct Session<W> {
    writer: Mutex<W>,
}

impl<W> Session<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Writes the payload and flushes so peers see it promptly.
    pub async fn send(&self, payload: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(payload.as_bytes()).await?;
        writer.flush().await
    }

    /// Shuts down the write half. Errors are ignored; the peer may
    /// already be gone.
    pub async fn close(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }
}

/// Why a registration attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    EmptyName,
    AlreadyTaken,
}

/// Authoritative mapping of online usernames to their sessions.
///
/// An explicit instance is created at startup and shared via `Arc`;
/// all map reads and mutations are serialized by one lock, and the
/// lock is never held across a network write.
pub struct Registry<W> {
    sessions: Mutex<HashMap<String, Arc<Session<W>>>>,
}

impl<W> Default for Registry<W>
where
    W: AsyncWrite + Unpin,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Registry<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Atomic check-and-insert: of any concurrent attempts to claim
    /// one username, at most one succeeds.
    pub async fn register(
        &self,
        username: &str,
        session: Arc<Session<W>>,
    ) -> Result<(), AdmissionError> {
        if username.is_empty() {
            return Err(AdmissionError::EmptyName);
        }

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(username) {
            return Err(AdmissionError::AlreadyTaken);
        }
        sessions.insert(username.to_string(), session);
        Ok(())
    }

    /// Removes the entry if present and reports whether it was there.
    /// Idempotent: a session's own cleanup may race its removal by a
    /// failed broadcast.
    pub async fn unregister(&self, username: &str) -> bool {
        self.sessions.lock().await.remove(username).is_some()
    }

    /// Point-in-time view of online usernames, sorted for stable
    /// output.
    pub async fn snapshot(&self) -> Vec<String> {
        let sessions = self.sessions.lock().await;
        let mut usernames: Vec<String> = sessions.keys().cloned().collect();
        usernames.sort();
        usernames
    }

    /// Delivers `payload` to every registered session except
    /// `exclude`.
    ///
    /// A failing recipient never aborts delivery to the rest: it is
    /// unregistered and the refreshed user list goes out to the
    /// survivors, repeating until a delivery round completes cleanly.
    pub async fn broadcast(&self, payload: &str, exclude: Option<&str>) {
        let mut failed = self.deliver(payload, exclude).await;
        while !failed.is_empty() {
            let mut removed = false;
            for username in &failed {
                removed |= self.unregister(username).await;
            }
            if !removed {
                break;
            }
            let list = wire::user_list_line(&self.snapshot().await);
            failed = self.deliver(&list, None).await;
        }
    }

    /// Broadcasts the current user list to every session.
    pub async fn publish_user_list(&self) {
        let list = wire::user_list_line(&self.snapshot().await);
        self.broadcast(&list, None).await;
    }

    /// One delivery round, returning the usernames whose write
    /// failed. The recipient set is copied under the lock and the
    /// lock released before any write.
    async fn deliver(&self, payload: &str, exclude: Option<&str>) -> Vec<String> {
        let recipients: Vec<(String, Arc<Session<W>>)> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .filter(|(username, _)| exclude != Some(username.as_str()))
                .map(|(username, session)| (username.clone(), Arc::clone(session)))
                .collect()
        };

        let mut failed = Vec::new();
        for (username, session) in recipients {
            if let Err(error) = session.send(payload).await {
                warn!(%username, ?error, "dropping session after failed delivery");
                failed.push(username);
            }
        }
        failed
    }
}
