//! The `utils` module holds the pieces shared by every other module of the
//! bridge: the common error type and logging setup.

pub mod error;
pub mod logging;

pub use error::{BridgeError, Result};
