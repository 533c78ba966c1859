use crate::segmentation::ReadingDirection;
use serde::Serialize;

/// Output language of a document, chosen from its name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    French,
    Arabic,
    Spanish,
}

impl TargetLanguage {
    /// `FR_` selects French, `AR_` Arabic; everything else is Spanish.
    pub fn from_document_name(name: &str) -> Self {
        let name = name.trim_start();
        if name.starts_with("FR_") {
            Self::French
        } else if name.starts_with("AR_") {
            Self::Arabic
        } else {
            Self::Spanish
        }
    }

    /// BCP-47 tag for the rendered document
    pub fn code(&self) -> &'static str {
        match self {
            Self::French => "fr",
            Self::Arabic => "ar",
            Self::Spanish => "es",
        }
    }

    pub fn direction(&self) -> ReadingDirection {
        match self {
            Self::Arabic => ReadingDirection::Rtl,
            Self::French | Self::Spanish => ReadingDirection::Ltr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_selects_language() {
        assert_eq!(
            TargetLanguage::from_document_name("FR_permis.jpg"),
            TargetLanguage::French
        );
        assert_eq!(
            TargetLanguage::from_document_name("AR_acte"),
            TargetLanguage::Arabic
        );
        assert_eq!(
            TargetLanguage::from_document_name("DOC_1"),
            TargetLanguage::Spanish
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        assert_eq!(
            TargetLanguage::from_document_name("fr_lowercase"),
            TargetLanguage::Spanish
        );
    }

    #[test]
    fn test_only_arabic_reads_right_to_left() {
        assert_eq!(TargetLanguage::Arabic.direction(), ReadingDirection::Rtl);
        assert_eq!(TargetLanguage::French.direction(), ReadingDirection::Ltr);
        assert_eq!(TargetLanguage::Spanish.code(), "es");
    }
}
