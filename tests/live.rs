//! Live tests against the real classification service.
//!
//! These render real files from `./test_cases/` with pdfium, run tesseract,
//! and spend API credit. They are gated behind `LIVE_ENABLED` and an
//! `ANTHROPIC_API_KEY` so they never run in CI by accident.
//!
//! Run with:
//!   LIVE_ENABLED=1 ANTHROPIC_API_KEY=... cargo test --test live -- --nocapture

use docclass::{classify, ClassifierConfig, DocumentLabel, FailureKind};
use std::path::PathBuf;

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless live tests are enabled, a key is present and `path` exists.
macro_rules! live_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("LIVE_ENABLED").is_err() {
            println!("SKIP — set LIVE_ENABLED=1 to run live tests");
            return;
        }
        let key = match std::env::var("ANTHROPIC_API_KEY") {
            Ok(k) if !k.is_empty() => k,
            _ => {
                println!("SKIP — ANTHROPIC_API_KEY is not set");
                return;
            }
        };
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        (p, key)
    }};
}

fn live_config(key: String) -> ClassifierConfig {
    let mut builder = ClassifierConfig::builder().api_key(key);
    if let Ok(dir) = std::env::var("PDFIUM_LIB_DIR") {
        builder = builder.pdfium_lib_dir(dir);
    }
    builder.build().expect("valid config")
}

#[tokio::test]
async fn test_live_rental_contract() {
    let (path, key) = live_skip_unless_ready!(test_cases_dir().join("rental_contract.pdf"));

    let outcome = classify(&path, &live_config(key)).await.expect("classify");
    println!("{outcome:#?}");

    assert!(outcome.is_success(), "diagnostic: {:?}", outcome.diagnostic);
    assert!(outcome.attempts >= 1);
    assert!(outcome.raw_response_json.is_some());
    assert!(!outcome.pages.is_empty() && outcome.pages.len() <= 4);
}

#[tokio::test]
async fn test_live_blurry_photo_never_calls_out() {
    let (path, key) = live_skip_unless_ready!(test_cases_dir().join("blurry_photo.jpg"));

    let outcome = classify(&path, &live_config(key)).await.expect("classify");
    println!("{outcome:#?}");

    assert_eq!(outcome.label, Some(DocumentLabel::PoorImageQuality));
    assert_eq!(outcome.attempts, 0);
}

#[tokio::test]
async fn test_live_invalid_key_is_fatal() {
    let (path, _) = live_skip_unless_ready!(test_cases_dir().join("rental_contract.pdf"));

    let outcome = classify(&path, &live_config("sk-ant-invalid".into()))
        .await
        .expect("classify");

    assert_eq!(outcome.failure, Some(FailureKind::Fatal));
    assert_eq!(outcome.attempts, 1);
}
