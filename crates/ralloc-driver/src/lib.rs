//! Module I/O, the two-phase allocation driver, and the sanity checks that gate a
//! successful allocation before it is handed back to a caller.

pub mod driver;
pub mod error;
pub mod json;
pub mod sanity;

pub use driver::{allocate_function, allocate_module, AllocResult, FailureReason, Strategy};
pub use error::DriverError;
pub use json::{parse_module, write_module};
