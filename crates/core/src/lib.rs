//! # Tilecast Core
//!
//! Domain types, traits, and error definitions for the Tilecast dashboard
//! generator. This crate has **zero framework dependencies**: it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the generation loop is a trait here:
//! - [`ModelClient`]: the hosted completion API (text in, text out)
//! - [`EndpointInvoker`]: one HTTP call against a user endpoint
//!
//! Implementations live in their respective crates, so the loop can be
//! exercised with scripted stand-ins.

pub mod call;
pub mod catalog;
pub mod error;
pub mod event;
pub mod invoker;
pub mod literal;
pub mod model;
pub mod plan;
pub mod validate;

// Re-export key types at crate root for ergonomics
pub use call::CallResult;
pub use catalog::{ApiCatalog, ApiDescriptor};
pub use error::{Error, FieldError, ProviderError, Result, RunError};
pub use event::{DomainEvent, EventBus};
pub use invoker::EndpointInvoker;
pub use model::{ModelClient, StructuredRequest};
pub use plan::{Coordinates, DashboardPlan, Decision, FetchRequest, GridSize, RawPlan, RawTile, Tile};
pub use validate::{Violation, validate};
