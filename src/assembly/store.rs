use super::session::{DocumentId, DocumentSession, RenderedDocument, SessionStatus};
use crate::error::PipelineError;
use crate::language::TargetLanguage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

pub type SessionHandle = Arc<Mutex<DocumentSession>>;

/// Process-wide map of open and recently finalized sessions.
///
/// The map lock is only held to look up, insert or remove a handle; all
/// work on a session happens under that session's own mutex, so unrelated
/// documents never wait on each other.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<DocumentId, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh session, failing if the id is already present
    pub async fn create(
        &self,
        id: DocumentId,
        language: TargetLanguage,
    ) -> Result<SessionHandle, PipelineError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(PipelineError::SessionState(format!(
                "document '{}' already has a session",
                id
            )));
        }
        tracing::info!("Created session for document '{}'", id);
        let handle = Arc::new(Mutex::new(DocumentSession::new(id.clone(), language)));
        sessions.insert(id, handle.clone());
        Ok(handle)
    }

    pub async fn get(&self, id: &DocumentId) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Existing handle for `id`, or a fresh session. The flag is true when
    /// this call inserted it.
    pub async fn get_or_create(
        &self,
        id: &DocumentId,
        language: TargetLanguage,
    ) -> (SessionHandle, bool) {
        if let Some(handle) = self.get(id).await {
            return (handle, false);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(id) {
            return (handle.clone(), false);
        }
        tracing::info!("Created session for document '{}'", id);
        let handle = Arc::new(Mutex::new(DocumentSession::new(id.clone(), language)));
        sessions.insert(id.clone(), handle.clone());
        (handle, true)
    }

    /// Remove `handle` again if it never accepted a bundle. `session` must be
    /// the caller's guard on that same handle.
    pub async fn discard_if_unused(
        &self,
        id: &DocumentId,
        handle: &SessionHandle,
        session: &mut DocumentSession,
    ) -> bool {
        if session.is_finalized() || session.highest_bundle() > 0 {
            return false;
        }

        let mut sessions = self.sessions.write().await;
        if !sessions.get(id).is_some_and(|current| Arc::ptr_eq(current, handle)) {
            return false;
        }
        sessions.remove(id);
        session.mark_evicted();
        tracing::debug!("Discarded unused session for document '{}'", id);
        true
    }

    /// Finalize a session without adding a bundle
    pub async fn finalize(&self, id: &DocumentId) -> Result<RenderedDocument, PipelineError> {
        let not_found = || PipelineError::DocumentNotFound(id.to_string());
        let handle = self.get(id).await.ok_or_else(not_found)?;

        let mut session = handle.lock().await;
        if session.is_evicted() {
            return Err(not_found());
        }
        let rendered = session.finalize()?;
        tracing::info!(
            "Finalized document '{}' with {} bundles",
            id,
            rendered.bundles.len()
        );
        Ok(rendered)
    }

    pub async fn status(&self, id: &DocumentId) -> Result<SessionStatus, PipelineError> {
        let not_found = || PipelineError::DocumentNotFound(id.to_string());
        let handle = self.get(id).await.ok_or_else(not_found)?;

        let session = handle.lock().await;
        if session.is_evicted() {
            return Err(not_found());
        }
        Ok(session.status())
    }

    /// Drop a session entirely; a later bundle with the same id starts over
    pub async fn evict(&self, id: &DocumentId) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(handle) => {
                handle.lock().await.mark_evicted();
                tracing::info!("Evicted session for document '{}'", id);
                true
            }
            None => false,
        }
    }

    /// Evict sessions untouched for at least `ttl`. Sessions that are busy
    /// right now are left for the next sweep.
    pub async fn evict_expired(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|id, handle| match handle.try_lock() {
            Ok(mut session) if session.idle_for() >= ttl => {
                session.mark_evicted();
                tracing::info!("Session for document '{}' expired", id);
                false
            }
            _ => true,
        });

        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> DocumentId {
        DocumentId::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let store = SessionStore::new();
        tokio_test::assert_ok!(store.create(id("DOC_1"), TargetLanguage::Spanish).await);
        tokio_test::assert_err!(store.create(id("DOC_1"), TargetLanguage::Spanish).await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_handle() {
        let store = SessionStore::new();
        let (a, created_a) = store.get_or_create(&id("DOC_1"), TargetLanguage::Spanish).await;
        let (b, created_b) = store.get_or_create(&id("DOC_1"), TargetLanguage::Spanish).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(created_a && !created_b);
        assert!(store.get(&id("DOC_2")).await.is_none());
    }

    #[tokio::test]
    async fn test_finalize_unknown_document_fails() {
        let store = SessionStore::new();
        let err = store.finalize(&id("nope")).await.unwrap_err();
        assert!(matches!(err, PipelineError::DocumentNotFound(_)));
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_finalize_through_store() {
        let store = SessionStore::new();
        let (handle, _) = store.get_or_create(&id("DOC_1"), TargetLanguage::Spanish).await;
        handle.lock().await.append(1, "<p>x</p>".into()).unwrap();

        let doc = tokio_test::assert_ok!(store.finalize(&id("DOC_1")).await);
        assert_eq!(doc.bundles, vec![1]);
        tokio_test::assert_err!(store.finalize(&id("DOC_1")).await);
    }

    #[tokio::test]
    async fn test_status_of_open_and_unknown_documents() {
        let store = SessionStore::new();
        let handle = tokio_test::assert_ok!(store.create(id("FR_acte"), TargetLanguage::French).await);
        handle.lock().await.append(2, "<p>x</p>".into()).unwrap();

        let status = tokio_test::assert_ok!(store.status(&id("FR_acte")).await);
        assert_eq!(status.highest_bundle, 2);
        assert_eq!(status.language, TargetLanguage::French);

        let err = store.status(&id("nope")).await.unwrap_err();
        assert!(matches!(err, PipelineError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_evict_marks_handle_and_frees_id() {
        let store = SessionStore::new();
        let (handle, _) = store.get_or_create(&id("DOC_1"), TargetLanguage::Spanish).await;

        assert!(store.evict(&id("DOC_1")).await);
        assert!(handle.lock().await.is_evicted());
        assert!(store.is_empty().await);
        assert!(!store.evict(&id("DOC_1")).await);
    }

    #[tokio::test]
    async fn test_evict_expired_skips_fresh_and_busy_sessions() {
        let store = SessionStore::new();
        store.get_or_create(&id("idle"), TargetLanguage::Spanish).await;
        let (busy, _) = store.get_or_create(&id("busy"), TargetLanguage::Spanish).await;

        assert_eq!(store.evict_expired(Duration::from_secs(3600)).await, 0);

        let _guard = busy.lock().await;
        assert_eq!(store.evict_expired(Duration::ZERO).await, 1);
        assert!(store.get(&id("busy")).await.is_some());
        assert!(store.get(&id("idle")).await.is_none());
    }

    #[tokio::test]
    async fn test_discard_only_removes_untouched_session() {
        let store = SessionStore::new();
        let (empty, _) = store.get_or_create(&id("DOC_1"), TargetLanguage::Spanish).await;
        let (used, _) = store.get_or_create(&id("DOC_2"), TargetLanguage::Spanish).await;

        let mut session = used.lock().await;
        session.append(1, "<p>x</p>".into()).unwrap();
        assert!(!store.discard_if_unused(&id("DOC_2"), &used, &mut session).await);
        drop(session);

        let mut session = empty.lock().await;
        assert!(store.discard_if_unused(&id("DOC_1"), &empty, &mut session).await);
        assert!(session.is_evicted());
        drop(session);

        assert!(store.get(&id("DOC_1")).await.is_none());
        assert!(store.get(&id("DOC_2")).await.is_some());
    }
}
