//! hbase-converge core: attribute store, resource engine, HBase resources,
//! recipes and the host collaborators they drive.
//!
//! A run loads attributes, compiles a run list of recipes into an
//! [`convergence::Engine`], then converges every declared resource against a
//! [`infrastructure::Host`].

pub mod convergence;
pub mod data;
pub mod error;
pub mod helpers;
pub mod infrastructure;
pub mod lock;
pub mod recipes;
pub mod resources;
pub mod templates;
pub mod types;

pub use error::{ConvergeError, ErrorKind};
