use super::render::render_document;
use crate::error::PipelineError;
use crate::language::TargetLanguage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

const MAX_ID_LEN: usize = 200;

/// Key of a logical document, derived from the caller-supplied name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn parse(name: &str) -> Result<Self, PipelineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "document name must not be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_ID_LEN {
            return Err(PipelineError::InvalidRequest(format!(
                "document name longer than {} characters",
                MAX_ID_LEN
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(PipelineError::InvalidRequest(
                "document name contains control characters".to_string(),
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn language(&self) -> TargetLanguage {
        TargetLanguage::from_document_name(&self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Accumulating,
    Finalized,
}

/// The finished output of one document
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub document_id: String,
    pub language: TargetLanguage,
    pub bundles: Vec<u32>,
    pub html: String,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub document_id: String,
    pub language: TargetLanguage,
    pub phase: SessionPhase,
    pub highest_bundle: u32,
    /// Sections still held; empty once finalized
    pub bundles: Vec<u32>,
}

/// Fragments of one document collected across requests.
///
/// Sections are keyed by bundle index; a repeated index appends another
/// fragment to the same section. Once finalized the session accepts nothing.
#[derive(Debug)]
pub struct DocumentSession {
    id: DocumentId,
    language: TargetLanguage,
    sections: BTreeMap<u32, Vec<String>>,
    highest_bundle: u32,
    phase: SessionPhase,
    last_touched: Instant,
    evicted: bool,
}

impl DocumentSession {
    pub fn new(id: DocumentId, language: TargetLanguage) -> Self {
        Self {
            id,
            language,
            sections: BTreeMap::new(),
            highest_bundle: 0,
            phase: SessionPhase::Accumulating,
            last_touched: Instant::now(),
            evicted: false,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn language(&self) -> TargetLanguage {
        self.language
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn highest_bundle(&self) -> u32 {
        self.highest_bundle
    }

    pub fn bundle_indices(&self) -> Vec<u32> {
        self.sections.keys().copied().collect()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            document_id: self.id().to_string(),
            language: self.language,
            phase: self.phase(),
            highest_bundle: self.highest_bundle(),
            bundles: self.bundle_indices(),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.phase == SessionPhase::Finalized
    }

    /// Fails unless `bundle_index` could be appended right now
    pub fn check_accepts(&self, bundle_index: u32) -> Result<(), PipelineError> {
        if self.is_finalized() {
            return Err(PipelineError::SessionState(format!(
                "document '{}' is already finalized",
                self.id
            )));
        }
        if bundle_index == 0 {
            return Err(PipelineError::InvalidRequest(
                "bundle indices start at 1".to_string(),
            ));
        }
        if bundle_index < self.highest_bundle {
            return Err(PipelineError::OutOfOrderBundle {
                document_id: self.id.to_string(),
                bundle_index,
                highest_seen: self.highest_bundle,
            });
        }
        Ok(())
    }

    pub fn append(&mut self, bundle_index: u32, html: String) -> Result<(), PipelineError> {
        self.check_accepts(bundle_index)?;

        if bundle_index > self.highest_bundle + 1 && self.highest_bundle > 0 {
            tracing::warn!(
                "Document '{}' skipped from bundle {} to {}",
                self.id,
                self.highest_bundle,
                bundle_index
            );
        }

        self.sections.entry(bundle_index).or_default().push(html);
        self.highest_bundle = bundle_index;
        self.touch();
        Ok(())
    }

    /// Render every section in bundle order and close the session
    pub fn finalize(&mut self) -> Result<RenderedDocument, PipelineError> {
        if self.is_finalized() {
            return Err(PipelineError::SessionState(format!(
                "document '{}' is already finalized",
                self.id
            )));
        }
        if self.sections.is_empty() {
            return Err(PipelineError::SessionState(format!(
                "document '{}' has no bundles to finalize",
                self.id
            )));
        }

        let html = render_document(&self.id, self.language, &self.sections);
        let bundles = self.bundle_indices();

        // Keep only the tombstone
        self.sections.clear();
        self.phase = SessionPhase::Finalized;
        self.touch();

        Ok(RenderedDocument {
            document_id: self.id.to_string(),
            language: self.language,
            bundles,
            html,
        })
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touched.elapsed()
    }

    fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    pub(crate) fn is_evicted(&self) -> bool {
        self.evicted
    }

    pub(crate) fn mark_evicted(&mut self) {
        self.evicted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str) -> DocumentSession {
        let id = DocumentId::parse(name).unwrap();
        let language = id.language();
        DocumentSession::new(id, language)
    }

    #[test]
    fn test_document_id_is_trimmed_and_validated() {
        assert_eq!(DocumentId::parse("  DOC_1 ").unwrap().as_str(), "DOC_1");
        assert!(DocumentId::parse("   ").is_err());
        assert!(DocumentId::parse("bad\nname").is_err());
        assert!(DocumentId::parse(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_sections_render_in_bundle_order() {
        let mut s = session("DOC_1");
        s.append(1, "<p>one</p>".into()).unwrap();
        s.append(2, "<p>two</p>".into()).unwrap();
        s.append(3, "<p>three</p>".into()).unwrap();

        let doc = s.finalize().unwrap();
        assert_eq!(doc.bundles, vec![1, 2, 3]);
        let one = doc.html.find("one").unwrap();
        let two = doc.html.find("two").unwrap();
        let three = doc.html.find("three").unwrap();
        assert!(one < two && two < three);
        assert!(s.is_finalized());
    }

    #[test]
    fn test_repeated_index_appends_to_same_section() {
        let mut s = session("DOC_1");
        s.append(1, "<p>a</p>".into()).unwrap();
        s.append(1, "<p>b</p>".into()).unwrap();
        assert_eq!(s.bundle_indices(), vec![1]);

        let doc = s.finalize().unwrap();
        assert_eq!(doc.html.matches("<section").count(), 1);
        assert!(doc.html.find("<p>a</p>").unwrap() < doc.html.find("<p>b</p>").unwrap());
    }

    #[test]
    fn test_lower_index_is_out_of_order() {
        let mut s = session("DOC_1");
        s.append(2, "x".into()).unwrap();
        let err = s.append(1, "y".into()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::OutOfOrderBundle {
                bundle_index: 1,
                highest_seen: 2,
                ..
            }
        ));
        assert_eq!(s.bundle_indices(), vec![2]);
    }

    #[test]
    fn test_gaps_are_accepted() {
        let mut s = session("DOC_1");
        s.append(1, "x".into()).unwrap();
        s.append(4, "y".into()).unwrap();
        assert_eq!(s.highest_bundle(), 4);
        assert_eq!(s.bundle_indices(), vec![1, 4]);
    }

    #[test]
    fn test_zero_index_is_invalid() {
        let s = session("DOC_1");
        assert!(matches!(
            s.check_accepts(0),
            Err(PipelineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_finalized_session_rejects_everything() {
        let mut s = session("DOC_1");
        s.append(1, "x".into()).unwrap();
        s.finalize().unwrap();

        assert!(matches!(
            s.append(2, "y".into()),
            Err(PipelineError::SessionState(_))
        ));
        assert!(matches!(s.finalize(), Err(PipelineError::SessionState(_))));
        assert_eq!(s.phase(), SessionPhase::Finalized);
    }

    #[test]
    fn test_empty_session_cannot_finalize() {
        let mut s = session("DOC_1");
        assert!(matches!(s.finalize(), Err(PipelineError::SessionState(_))));
        assert!(!s.is_finalized());
    }

    #[test]
    fn test_status_tracks_phase() {
        let mut s = session("AR_acte");
        s.append(1, "x".into()).unwrap();
        s.append(3, "y".into()).unwrap();

        let status = s.status();
        assert_eq!(status.document_id, "AR_acte");
        assert_eq!(status.language, TargetLanguage::Arabic);
        assert_eq!(status.phase, SessionPhase::Accumulating);
        assert_eq!(status.bundles, vec![1, 3]);

        s.finalize().unwrap();
        let status = s.status();
        assert_eq!(status.phase, SessionPhase::Finalized);
        assert_eq!(status.highest_bundle, 3);
        assert!(status.bundles.is_empty());
    }
}
