//! Error types for the docclass library.
//!
//! Classification failures are **not** errors here. A document that cannot be
//! rendered, whose pages are all illegible, or whose model reply cannot be
//! parsed still produces a [`crate::output::ClassificationOutcome`] with a
//! [`crate::output::FailureKind`] and a diagnostic string. The types below
//! cover the remaining cases:
//!
//! * [`ClassifierError`] — setup is impossible (bad configuration, missing
//!   API key, provider not available). Returned from constructors.
//! * [`RenderError`], [`RecognizerError`], [`TransportError`] — stage-local
//!   failures. The orchestrator folds them into outcomes; they never escape
//!   [`crate::classify::Classifier::classify_document`].
//! * [`RenameError`], [`LockError`], [`LedgerError`] — failures of the file
//!   collaborators used by the batch driver. These propagate per their own
//!   contract.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal setup errors.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No API key was configured for a transport that needs one.
    #[error("No API key configured for provider '{provider}'.\nSet ANTHROPIC_API_KEY or pass --api-key.")]
    MissingApiKey { provider: String },

    /// The configured provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Rendering failed for a document. Logged by the renderer, never returned
/// from [`crate::pipeline::render::PageRenderer::render`].
#[derive(Debug, Error)]
pub enum RenderError {
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set --pdfium-lib-dir (DOCCLASS_PDFIUM_LIB_DIR) to the directory holding libpdfium."
    )]
    PdfiumBindingFailed(String),

    /// PDF header/trailer/xref is corrupt, or the file is encrypted.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The file claims to be a PDF but does not start with `%PDF`.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A raster image could not be decoded.
    #[error("Failed to decode image '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The file could not be read at all.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking render task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The text recogniser could not score a page.
#[derive(Debug, Error)]
pub enum RecognizerError {
    /// The `tesseract` executable could not be spawned.
    #[error("Failed to run '{program}': {source}\nInstall tesseract or disable the text check (--no-ocr-check).")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `tesseract` ran but exited unsuccessfully.
    #[error("tesseract exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// libtesseract failed to initialise or to recognise the page.
    #[error("tesseract engine error: {0}")]
    Engine(String),

    /// The page could not be written to a temporary file for recognition.
    #[error("Failed to stage page for recognition: {0}")]
    Staging(String),
}

/// Failure classes of one call to the classification service.
///
/// The three variants drive the retry state machine in
/// [`crate::pipeline::llm`]: the first two are retried, the last is not.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// HTTP 429 or an equivalent provider signal.
    #[error("rate limit exceeded: {detail}")]
    RateLimited {
        detail: String,
        retry_after_secs: Option<u64>,
    },

    /// 5xx, overload, timeout or connection failure.
    #[error("transient server error{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transient { status: Option<u16>, detail: String },

    /// Authentication failure, malformed request, or anything else.
    #[error("{detail}")]
    Fatal { detail: String },
}

impl TransportError {
    /// Whether the retry state machine may try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited { .. } | TransportError::Transient { .. }
        )
    }
}

/// Renaming a classified file failed.
#[derive(Debug, Error)]
pub enum RenameError {
    /// The proposed name is empty or only whitespace.
    #[error("Filename cannot be empty")]
    Empty,

    /// The proposed name exceeds 255 characters.
    #[error("Filename is too long ({len} > 255 characters)")]
    TooLong { len: usize },

    /// The proposed name contains a reserved character.
    #[error("Filename contains invalid character '{ch}' (reserved: <>:\"/\\|?*)")]
    InvalidCharacter { ch: char },

    /// The final name has no extension.
    #[error("Filename must have an extension: '{name}'")]
    MissingExtension { name: String },

    /// The source path has no parent directory or file name.
    #[error("Cannot rename '{path}': not a file path")]
    NotAFile { path: PathBuf },

    /// The filesystem refused the rename.
    #[error("Error renaming file '{from}' to '{to}': {source}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The process lock could not be taken or released.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another instance holds the lock.
    #[error(
        "Another docclass instance is running (lock file '{path}'{}).\n\
Remove the lock file if that process no longer exists.",
        .holder.map(|p| format!(", pid {p}")).unwrap_or_default()
    )]
    AlreadyHeld { path: PathBuf, holder: Option<u32> },

    /// The lock file could not be created or written.
    #[error("Failed to create lock file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The outcome ledger could not be written.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to write ledger '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialise ledger entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_display_includes_status() {
        let e = TransportError::Transient {
            status: Some(529),
            detail: "overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 529"), "got: {msg}");
        assert!(msg.contains("overloaded"));
    }

    #[test]
    fn transient_display_without_status() {
        let e = TransportError::Transient {
            status: None,
            detail: "connection reset".into(),
        };
        assert_eq!(e.to_string(), "transient server error: connection reset");
    }

    #[test]
    fn retryable_classes() {
        assert!(TransportError::RateLimited {
            detail: "slow down".into(),
            retry_after_secs: Some(5)
        }
        .is_retryable());
        assert!(TransportError::Transient {
            status: Some(503),
            detail: String::new()
        }
        .is_retryable());
        assert!(!TransportError::Fatal {
            detail: "invalid x-api-key".into()
        }
        .is_retryable());
    }

    #[test]
    fn lock_held_display_names_pid() {
        let e = LockError::AlreadyHeld {
            path: PathBuf::from("/tmp/docclass.lock"),
            holder: Some(4242),
        };
        assert!(e.to_string().contains("pid 4242"));
    }

    #[test]
    fn missing_api_key_display() {
        let e = ClassifierError::MissingApiKey {
            provider: "anthropic".into(),
        };
        assert!(e.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
