//! Pipeline stages for document classification.
//!
//! Each submodule implements exactly one step, so each can be tested alone
//! and swapped (a fake rasteriser, recogniser or transport) without touching
//! the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ quality ──▶ encode ──▶ llm ──▶ response
//! (kind)    (pdfium)   (gate+ocr)  (jpeg)     (retry)  (label)
//!                                              │
//!                                          transport
//!                                        (HTTP / provider)
//! ```
//!
//! 1. [`input`]     — decide whether a path is a PDF, a photo, or unsupported
//! 2. [`render`]    — rasterise at most four leading pages; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`quality`]   — focus, contrast and OCR-confidence gate per page
//! 4. [`ocr`]       — word confidences from tesseract, behind a trait
//! 5. [`encode`]    — RGB → JPEG → base64, order preserved, capped at four
//! 6. [`llm`]       — retry state machine around a single transport attempt
//! 7. [`transport`] — the network call itself
//! 8. [`response`]  — envelope → `ContentType` label

pub mod encode;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod quality;
pub mod render;
pub mod response;
pub mod transport;
