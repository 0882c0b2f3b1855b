// Fanout Core - Domain Logic, Ports & Use Cases
// NO transport or file-system scanning dependencies (hexagonal layout)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
