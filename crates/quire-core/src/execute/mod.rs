//! Execution engine for notebook cells.
//!
//! # Architecture
//!
//! ```text
//! Notebook::execute(target)
//!     │
//!     └── BatchPlan::resume (longest cached prefix)
//!             │
//!             └── BatchExecutor::run
//!                     │
//!                     ├── Cell::execute(prior snapshot) → next snapshot
//!                     │
//!                     └── ExecutionCallback (started / completed / error)
//! ```

mod batch;
mod callback;

pub use batch::{BatchExecutor, BatchFailure, BatchOutcome, BatchPlan, BatchStep};
pub use callback::ExecutionCallback;
pub(crate) use callback::Callbacks;
