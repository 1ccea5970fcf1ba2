//! Filesystem collaborators used around classification.
//!
//! - [`rename`] — validate a label-derived name and rename without clobbering
//! - [`locate`] — find a document inside a deal folder, tolerating sync lag
//! - [`lock`]   — keep two batch runs from touching the same tree

pub mod locate;
pub mod lock;
pub mod rename;
