//! Incremental assembly of translated bundles into one document
//!
//! Each page of a document is translated by a separate request. The
//! [`Assembler`] appends every translated bundle to the document's session
//! and, when the caller marks a bundle as the last one, renders all sections
//! into a single HTML document and closes the session for good.

pub mod render;
pub mod session;
pub mod store;

pub use session::{DocumentId, RenderedDocument, SessionStatus};
pub use store::SessionStore;

use crate::error::PipelineError;
use crate::postprocess::{render_fragment, Fragment};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Addressing of one incoming bundle
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub document_name: String,
    /// 1-based, non-decreasing per document
    pub bundle_index: u32,
    pub is_last: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BundleOutcome {
    Accepted {
        document_id: String,
        bundle_index: u32,
    },
    Finalized(RenderedDocument),
}

pub struct Assembler {
    store: Arc<SessionStore>,
}

impl Assembler {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Append an already translated fragment
    pub async fn submit(
        &self,
        request: BundleRequest,
        fragment: Fragment,
    ) -> Result<BundleOutcome, PipelineError> {
        let ready = futures::future::ready(Ok::<_, PipelineError>(fragment));
        self.submit_with(request, || ready).await
    }

    /// Append the fragment produced by `produce`.
    ///
    /// The session is checked before `produce` runs and stays locked until
    /// the bundle is committed, so concurrent bundles for the same document
    /// are serialized. If the bundle is rejected or `produce` fails the
    /// session is left exactly as it was, and a session this call had to
    /// create is removed again.
    pub async fn submit_with<F, Fut>(
        &self,
        request: BundleRequest,
        produce: F,
    ) -> Result<BundleOutcome, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Fragment, PipelineError>>,
    {
        let id = DocumentId::parse(&request.document_name)?;
        let language = id.language();

        let (handle, created, mut session) = loop {
            let (handle, created) = self.store.get_or_create(&id, language).await;
            let session = handle.clone().lock_owned().await;
            if !session.is_evicted() {
                break (handle, created, session);
            }
        };

        let fragment = match session.check_accepts(request.bundle_index) {
            Ok(()) => produce().await.map_err(|e| {
                tracing::warn!(
                    "Fragment for bundle {} of document '{}' failed, session unchanged: {}",
                    request.bundle_index,
                    id,
                    e
                );
                e
            }),
            Err(e) => {
                tracing::warn!(
                    "Rejected bundle {} for document '{}': {}",
                    request.bundle_index,
                    id,
                    e
                );
                Err(e)
            }
        };

        let fragment = match fragment {
            Ok(fragment) => fragment,
            Err(e) => {
                // A session opened by this call must not outlive its failure
                if created {
                    self.store
                        .discard_if_unused(&id, &handle, &mut session)
                        .await;
                }
                return Err(e);
            }
        };

        if fragment.is_blank() {
            tracing::warn!(
                "Bundle {} of document '{}' is empty",
                request.bundle_index,
                id
            );
        }

        let html = render_fragment(&fragment, session.language());
        session.append(request.bundle_index, html)?;
        tracing::info!(
            "Accepted bundle {} for document '{}'",
            request.bundle_index,
            id
        );

        if !request.is_last {
            return Ok(BundleOutcome::Accepted {
                document_id: id.to_string(),
                bundle_index: request.bundle_index,
            });
        }

        let rendered = session.finalize()?;
        tracing::info!(
            "Finalized document '{}' with {} bundles",
            id,
            rendered.bundles.len()
        );
        Ok(BundleOutcome::Finalized(rendered))
    }
}
