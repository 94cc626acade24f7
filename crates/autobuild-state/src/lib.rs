//! autobuild-state: persisted record of the last build per branch
//!
//! The state file is the single source of truth for "already built": a branch
//! is rebuilt only when its head differs from the commit recorded here.

pub mod error;
pub mod store;

pub use error::{StateError, StateResult};
pub use store::{BranchState, StateStore};
