//! Business card OCR extraction via hosted vision models.
//!
//! Submits card images to vision-capable LLM providers (NVIDIA, Mistral,
//! Gemini) in a configurable fallback order, recovers a JSON object from the
//! free-form model output, and normalizes the fields into a canonical record.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod export;
pub mod extract;
pub mod providers;
pub mod server;
pub mod storage;

pub use config::Settings;
pub use dispatch::{DispatchResult, Dispatcher};
pub use extract::CardRecord;
