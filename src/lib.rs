pub mod api;
pub mod core;
pub mod error;
pub mod tax;

pub use error::{FireError, FireResult};
