//! The dashboard generation loop.
//!
//! A run follows a **Plan → Fetch → Observe** cycle:
//!
//! 1. **Ask** the model for a plan (preferences + API catalog + context)
//! 2. **Parse** the response and upgrade its literal-encoded fields
//! 3. **If finished**: validate the layout and return it
//! 4. **If it wants data**: call the requested endpoint, append the result
//!    to the context, loop back to step 1
//!
//! The loop stops when the model declares the dashboard finished or the
//! iteration ceiling is reached.

pub mod context;
pub mod invoker;
pub mod parser;
pub mod prompt;
pub mod runner;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use context::{ContextEntry, IterationContext};
pub use invoker::HttpInvoker;
pub use parser::{ParsedResponse, normalize, parse_response};
pub use runner::{DashboardAgent, RunOutcome, RunReport};
