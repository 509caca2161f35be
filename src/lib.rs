//! Localized display names for QElectroTech element libraries.
//!
//! Each element document carries a `<names>` block with one entry per
//! language. This crate adds an entry for a target language, translating the
//! best available source entry through an external service and remembering
//! every translation in a persistent cache so identical names are only ever
//! translated once.

pub mod backend;
pub mod cache;
pub mod config;
pub mod corpus;
pub mod error;
pub mod names;
pub mod pipeline;
pub mod retry;
pub mod stats;

pub use backend::{ApiBackend, Backend, ChatBackend};
pub use cache::TranslationCache;
pub use config::{Config, Strategy};
pub use error::BackendError;
pub use pipeline::{Pipeline, RunSummary};
