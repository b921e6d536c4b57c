//! Convergence engine: declared resources in, a run report out.
//!
//! `engine` owns the declared resources and drives the two passes,
//! `graph` validates notification edges before anything is applied,
//! `retry` decides whether a collaborator failure gets another attempt and
//! `report` collects per-resource outcomes.

pub mod engine;
pub mod graph;
pub mod report;
pub mod retry;

pub use engine::Engine;
pub use report::{ResourceResult, RunReport, RunSummary, Status};
pub use retry::RetryPolicy;
