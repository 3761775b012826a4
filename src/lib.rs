pub mod adapters;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod ports;
pub mod rag;
pub mod repository;
pub mod retrieval;
pub mod service;

#[cfg(test)]
pub mod test_support;

pub use config::Config;
pub use error::{AppError, Result};
