mod error;
pub mod models;
mod mutation_bus;
pub mod ports;
pub mod services;

pub use error::*;
pub use mutation_bus::*;
