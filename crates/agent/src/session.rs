//! Checkpoints for threads suspended on a human review.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::conversation::ConversationState;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid thread id `{0}`: use letters, digits, `-` or `_`")]
    InvalidThreadId(String),
    #[error("session storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize session snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), SessionError>;
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, SessionError>;
    async fn clear(&self, thread_id: &str) -> Result<(), SessionError>;
    /// Thread ids with a stored snapshot, sorted.
    async fn list(&self) -> Result<Vec<String>, SessionError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, ConversationState>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(thread_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(thread_id).cloned())
    }

    async fn clear(&self, thread_id: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(thread_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// One `<thread_id>.json` file per suspended thread.
pub struct FileSessionStore {
    directory: PathBuf,
}

impl FileSessionStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, SessionError> {
        validate_thread_id(thread_id)?;
        Ok(self.directory.join(format!("{thread_id}.json")))
    }
}

pub fn validate_thread_id(thread_id: &str) -> Result<(), SessionError> {
    let valid = !thread_id.is_empty()
        && thread_id.len() <= 128
        && thread_id.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidThreadId(thread_id.to_string()))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), SessionError> {
        let path = self.path_for(thread_id)?;
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| SessionError::Io { path: self.directory.clone(), source })?;

        let body = serde_json::to_vec_pretty(state)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|source| SessionError::Io { path: staging.clone(), source })?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|source| SessionError::Io { path: path.clone(), source })
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, SessionError> {
        let path = self.path_for(thread_id)?;
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SessionError::Io { path, source }),
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| SessionError::Corrupt { path, source })
    }

    async fn clear(&self, thread_id: &str) -> Result<(), SessionError> {
        let path = self.path_for(thread_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io { path, source }),
        }
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(SessionError::Io { path: self.directory.clone(), source }),
        };

        let mut ids = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|source| SessionError::Io { path: self.directory.clone(), source })?;
            let Some(entry) = entry else {
                break;
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if validate_thread_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
