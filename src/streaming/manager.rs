//! Registry of active streaming sessions

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics;

/// What the registry knows about one connection
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub client_id: String,
    pub query: String,
    pub connected_at: DateTime<Utc>,
}

/// Tracks connected clients
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionInfo>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return its client id
    pub async fn register(&self, query: &str) -> String {
        let client_id = Uuid::new_v4().to_string();
        let info = SessionInfo {
            client_id: client_id.clone(),
            query: query.to_string(),
            connected_at: Utc::now(),
        };

        let count = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(client_id.clone(), info);
            sessions.len()
        };

        metrics::set_active_sessions(count);
        tracing::info!(client_id = %client_id, query = %query, active = count, "Client connected");
        client_id
    }

    pub async fn unregister(&self, client_id: &str) -> Option<SessionInfo> {
        let (removed, count) = {
            let mut sessions = self.sessions.write().await;
            let removed = sessions.remove(client_id);
            (removed, sessions.len())
        };

        if removed.is_some() {
            metrics::set_active_sessions(count);
            tracing::info!(client_id = %client_id, active = count, "Client disconnected");
        }
        removed
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }
}
