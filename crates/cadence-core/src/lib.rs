//! `cadence-core`: configuration, shared error type and the caller credential
//! passed into every engine operation.

pub mod config;
pub mod error;
pub mod types;

pub use config::CadenceConfig;
pub use error::{CadenceError, Result};
pub use types::{Actor, Plan};
