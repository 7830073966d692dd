use std::{collections::HashMap, io, sync::Arc};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{Mutex, MutexGuard},
};

use crate::protocol::write_line;

/// The write side of one participant's connection, shared between the
/// owning session and the registry. The read side never leaves the
/// session's own task.
pub struct SessionHandle {
    username: String,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl SessionHandle {
    pub fn new<W>(username: String, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            username,
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Username assigned at the join handshake; immutable afterwards.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Writes one protocol line to this participant's connection.
    pub async fn send_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        write_line(&mut *writer, line).await
    }

    pub(crate) async fn shutdown(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }
}

pub(crate) type Table = HashMap<String, Arc<SessionHandle>>;

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterError {
    DuplicateUsername,
}

/// Who is online: username to session handle, usernames unique and
/// case-sensitive. One mutex guards the whole map, so registration,
/// removal, and delivery iteration are mutually exclusive; a participant
/// either receives a routed message or was already fully removed, never a
/// half-removed in-between.
#[derive(Default)]
pub struct Registry {
    table: Mutex<Table>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: Arc<SessionHandle>) -> Result<(), RegisterError> {
        let mut table = self.table.lock().await;
        if table.contains_key(handle.username()) {
            return Err(RegisterError::DuplicateUsername);
        }
        table.insert(handle.username().to_string(), handle);
        Ok(())
    }

    /// Removes a participant. Idempotent; the handle is returned on the
    /// first removal only, so callers can announce the departure exactly
    /// once even if cleanup runs twice.
    pub async fn unregister(&self, username: &str) -> Option<Arc<SessionHandle>> {
        self.table.lock().await.remove(username)
    }

    pub async fn lookup(&self, username: &str) -> Option<Arc<SessionHandle>> {
        self.table.lock().await.get(username).cloned()
    }

    /// Every currently active participant, in no particular order.
    pub async fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.table.lock().await.values().cloned().collect()
    }

    /// Hands the router the whole critical section, so a delivery and a
    /// concurrent unregister cannot interleave.
    pub(crate) async fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().await
    }
}
