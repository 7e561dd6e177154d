//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use resgrep::crawler::Frontier;
use resgrep::models::{RealtimeEvent, ResourceDocument, ResourceType};
use resgrep::publish::{ChannelNames, MemoryEventBus, MemoryIndex, PublishPipeline};
use resgrep::storage::{MemoryStore, QueueKeys};

/// Create a test document with default values
pub fn create_test_document(url: &str, title: &str) -> ResourceDocument {
    ResourceDocument {
        url: url.to_string(),
        title: title.to_string(),
        description: format!("{title} explained step by step"),
        content: None,
        code_snippets: vec![],
        tags: vec![],
        domain: url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_default(),
        resource_type: ResourceType::Article,
        languages: vec!["python".to_string()],
        quality_score: 0.5,
        timestamp: Utc::now(),
    }
}

/// Document with an explicit resource type
pub fn create_typed_document(url: &str, title: &str, resource_type: ResourceType) -> ResourceDocument {
    ResourceDocument {
        resource_type,
        ..create_test_document(url, title)
    }
}

/// Real-time event for a document
pub fn create_event(url: &str, title: &str) -> RealtimeEvent {
    create_test_document(url, title).to_event(None)
}

/// In-memory collaborators wired the way the binaries wire Redis and OpenSearch
pub struct TestBackends {
    pub store: Arc<MemoryStore>,
    pub index: Arc<MemoryIndex>,
    pub bus: Arc<MemoryEventBus>,
    pub frontier: Frontier,
    pub channels: ChannelNames,
}

impl TestBackends {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            frontier: Frontier::new(store.clone(), QueueKeys::default(), 100),
            store,
            index: Arc::new(MemoryIndex::new()),
            bus: Arc::new(MemoryEventBus::new()),
            channels: ChannelNames::default(),
        }
    }

    pub fn pipeline(&self) -> PublishPipeline {
        PublishPipeline::new(self.index.clone(), self.bus.clone(), self.channels.clone())
    }
}
