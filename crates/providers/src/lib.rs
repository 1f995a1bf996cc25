//! Model client implementations for Tilecast.
//!
//! All providers implement the `tilecast_core::ModelClient` trait: they
//! stream a structured completion and hand back the concatenated text.
//! The router selects the correct provider based on configuration.

pub mod gemini;
pub mod openai_compat;
pub mod router;
mod sse;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::ProviderRouter;
