//! Bounded execution of validated SQL.
//!
//! Ties admission control, plan inspection and the worker pool together
//! and reports every outcome through the uniform [`ExecutionResult`].

pub mod executor;
pub mod plan;
pub mod pool;
pub mod result;
pub mod service;

pub use executor::{Bounded, QueryExecutor, DEFAULT_TIMEOUT};
pub use plan::PlanSummary;
pub use pool::{WorkerPool, DEFAULT_WORKERS};
pub use result::{ExecutionResult, ExplainResult, TIMEOUT_MESSAGE};
pub use service::{Caller, SandboxService, DEFAULT_MAX_COMPARE};
