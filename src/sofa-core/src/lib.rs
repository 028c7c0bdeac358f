//! Sofa Core Library
//!
//! This crate provides the transport-independent pieces of the Sofa client:
//! - Request/response value types
//! - Query string building
//! - Client configuration
//! - Error types
//! - Small helpers shared by the entity layer

pub mod config;
pub mod error;
pub mod http;
pub mod query;
pub mod util;

// Re-export commonly used types
pub use config::{ClientConfig, HttpVersion};
pub use error::{Error, Result};
pub use http::{Headers, Method, RawResponse, Request, Response};
pub use query::{DocumentLister, Query, QueryParams};
