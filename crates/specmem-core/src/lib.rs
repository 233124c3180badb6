pub mod archive;
pub mod config;
pub mod context;
pub mod error;
pub mod io;
pub mod memory;
pub mod migrate;
pub mod notes;
pub mod parser;
pub mod paths;
pub mod profile;
pub mod query;
pub mod session;
pub mod types;

pub use error::{Result, SpecmemError};
