//! In-memory preview store
//!
//! Process-lifetime mapping from preview identifier to finished document.
//! No eviction; identifiers are unique by construction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{CloneError, ClonedDocument, Result};

/// Cheap to clone; all clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct PreviewStore {
    documents: Arc<RwLock<HashMap<String, ClonedDocument>>>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a finished document under a fresh identifier.
    pub async fn put(&self, html: String) -> ClonedDocument {
        let document = ClonedDocument {
            preview_id: Uuid::new_v4().to_string(),
            html,
            created_at: Utc::now(),
        };
        let mut documents = self.documents.write().await;
        documents.insert(document.preview_id.clone(), document.clone());
        debug!(
            preview_id = %document.preview_id,
            stored = documents.len(),
            "preview stored"
        );
        document
    }

    pub async fn get(&self, preview_id: &str) -> Result<ClonedDocument> {
        self.documents
            .read()
            .await
            .get(preview_id)
            .cloned()
            .ok_or_else(|| CloneError::NotFound(preview_id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = PreviewStore::new();
        let document = store.put("<html>cloned</html>".to_string()).await;

        // Lookups are repeatable and return the same document
        for _ in 0..3 {
            let found = store.get(&document.preview_id).await.unwrap();
            assert_eq!(found.html, "<html>cloned</html>");
            assert_eq!(found.preview_id, document.preview_id);
            assert_eq!(found.created_at, document.created_at);
        }
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = PreviewStore::new();
        let result = store.get("no-such-preview").await;
        assert!(matches!(result, Err(CloneError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_puts_never_collide() {
        let store = PreviewStore::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.put(format!("<p>{}</p>", i)).await },
            ));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            let document = handle.await.unwrap();
            assert!(ids.insert(document.preview_id));
        }
        assert_eq!(ids.len(), 32);
        assert_eq!(store.len().await, 32);
    }

    #[tokio::test]
    async fn test_clones_share_the_map() {
        let store = PreviewStore::new();
        let other = store.clone();
        let document = store.put("<html></html>".to_string()).await;
        assert!(other.get(&document.preview_id).await.is_ok());
        assert!(!other.is_empty().await);
    }
}
