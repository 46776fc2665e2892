//! Types, errors and traits shared by the REST and streaming clients

pub mod errors;
pub mod traits;
pub mod types;
