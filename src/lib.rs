pub mod config;
pub mod consistency;
pub mod error;
pub mod service;
pub mod store;
pub mod traversal;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{KinshipError, Result};
pub use service::KinshipService;
