//! Result types returned by the classification pipeline.
//!
//! [`ClassificationOutcome`] is the single value produced per document. It is
//! built once by the orchestrator and never mutated afterwards; failures
//! travel inside it as a [`FailureKind`] plus a human-readable diagnostic.

use crate::pipeline::quality::QualityVerdict;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical document types.
///
/// The first six are labels the model may return. [`DocumentLabel::PoorImageQuality`]
/// is assigned locally when every page fails the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentLabel {
    RentalContract,
    MortgageContract,
    ContractPayment,
    TeleworkingAgreement,
    RepaymentTable,
    Unclassified,
    PoorImageQuality,
}

impl DocumentLabel {
    /// Labels the model is allowed to answer with, in prompt order.
    pub const MODEL_LABELS: [DocumentLabel; 6] = [
        DocumentLabel::RentalContract,
        DocumentLabel::MortgageContract,
        DocumentLabel::ContractPayment,
        DocumentLabel::TeleworkingAgreement,
        DocumentLabel::RepaymentTable,
        DocumentLabel::Unclassified,
    ];

    /// Wire/file-name spelling, e.g. `Rental_Contract`.
    pub fn canonical_name(self) -> &'static str {
        match self {
            DocumentLabel::RentalContract => "Rental_Contract",
            DocumentLabel::MortgageContract => "Mortgage_Contract",
            DocumentLabel::ContractPayment => "Contract_Payment",
            DocumentLabel::TeleworkingAgreement => "Teleworking_Agreement",
            DocumentLabel::RepaymentTable => "Repayment_Table",
            DocumentLabel::Unclassified => "Unclassified",
            DocumentLabel::PoorImageQuality => "Poor_Image_Quality",
        }
    }

    /// Base name used when renaming a file with this label.
    ///
    /// Illegible documents are filed as `Unclassified` so a human reviews them.
    pub fn file_stem(self) -> &'static str {
        match self {
            DocumentLabel::PoorImageQuality => DocumentLabel::Unclassified.canonical_name(),
            other => other.canonical_name(),
        }
    }

    /// Match a label returned by the model, ignoring case and surrounding
    /// whitespace. Only the six model labels are accepted.
    pub fn from_model_label(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        Self::MODEL_LABELS
            .into_iter()
            .find(|label| label.canonical_name().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for DocumentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Why a classification produced no usable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Unsupported format, unreadable file, or nothing survived encoding.
    NoUsablePages,
    /// The service answered but the reply could not be parsed.
    ParseError,
    /// The reply parsed but named a label we do not know.
    UnrecognizedLabel,
    /// Every attempt hit a rate limit or transient server error.
    RetriesExhausted,
    /// Non-retryable remote error (auth, malformed request, …).
    Fatal,
    /// The call was cancelled between attempts.
    Cancelled,
}

/// Quality verdict of one rendered page, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// 0-based page index within the document.
    pub page_index: usize,
    pub verdict: QualityVerdict,
}

/// Result of classifying one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    /// Canonical label, or `None` when classification failed.
    pub label: Option<DocumentLabel>,
    /// The JSON object the model replied with, re-serialised.
    pub raw_response_json: Option<String>,
    /// Human-readable explanation for failures and the quality short-circuit.
    pub diagnostic: Option<String>,
    /// Set when `label` is `None`.
    pub failure: Option<FailureKind>,
    /// Remote attempts made (0 when no call was needed).
    pub attempts: u32,
    /// Per-page quality verdicts, in page order.
    pub pages: Vec<PageReport>,
}

impl ClassificationOutcome {
    /// A successfully labelled document.
    pub fn labelled(
        label: DocumentLabel,
        raw_response_json: String,
        attempts: u32,
        pages: Vec<PageReport>,
    ) -> Self {
        Self {
            label: Some(label),
            raw_response_json: Some(raw_response_json),
            diagnostic: None,
            failure: None,
            attempts,
            pages,
        }
    }

    /// Every page failed the quality gate; no remote call was made.
    pub fn poor_image_quality(diagnostic: String, pages: Vec<PageReport>) -> Self {
        Self {
            label: Some(DocumentLabel::PoorImageQuality),
            raw_response_json: None,
            diagnostic: Some(diagnostic),
            failure: None,
            attempts: 0,
            pages,
        }
    }

    /// A failed classification.
    pub fn failed(kind: FailureKind, diagnostic: impl Into<String>) -> Self {
        Self {
            label: None,
            raw_response_json: None,
            diagnostic: Some(diagnostic.into()),
            failure: Some(kind),
            attempts: 0,
            pages: Vec::new(),
        }
    }

    /// `true` when a label was assigned (including `PoorImageQuality`).
    pub fn is_success(&self) -> bool {
        self.label.is_some()
    }

    /// `true` for the neutral "nothing to classify" outcome.
    pub fn is_unclassifiable(&self) -> bool {
        self.failure == Some(FailureKind::NoUsablePages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_matching_ignores_case() {
        assert_eq!(
            DocumentLabel::from_model_label("Contract_Payment"),
            Some(DocumentLabel::ContractPayment)
        );
        assert_eq!(
            DocumentLabel::from_model_label("contract_payment"),
            Some(DocumentLabel::ContractPayment)
        );
        assert_eq!(
            DocumentLabel::from_model_label("  RENTAL_CONTRACT\n"),
            Some(DocumentLabel::RentalContract)
        );
    }

    #[test]
    fn poor_quality_is_never_a_model_label() {
        assert_eq!(DocumentLabel::from_model_label("Poor_Image_Quality"), None);
        assert_eq!(DocumentLabel::from_model_label("Invoice"), None);
        assert_eq!(DocumentLabel::from_model_label(""), None);
    }

    #[test]
    fn poor_quality_files_as_unclassified() {
        assert_eq!(DocumentLabel::PoorImageQuality.file_stem(), "Unclassified");
        assert_eq!(DocumentLabel::RepaymentTable.file_stem(), "Repayment_Table");
    }

    #[test]
    fn failed_outcome_has_no_label() {
        let o = ClassificationOutcome::failed(FailureKind::NoUsablePages, "unsupported or unreadable input");
        assert!(!o.is_success());
        assert!(o.is_unclassifiable());
        assert_eq!(o.attempts, 0);
    }

    #[test]
    fn outcome_serialises_to_json() {
        let o = ClassificationOutcome::labelled(
            DocumentLabel::RentalContract,
            r#"{"ContentType":"Rental_Contract"}"#.into(),
            1,
            Vec::new(),
        );
        let json = serde_json::to_string(&o).unwrap();
        assert!(json.contains("\"RentalContract\""));
        assert!(json.contains("\"attempts\":1"));
    }
}
