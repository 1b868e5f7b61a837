//! strata-engine
//!
//! The execution engine protocol consumed by the controller: an abstract
//! [`Engine`] trait, its request/reply types, the tagged [`EngineError`]
//! and a JSON-over-HTTP transport.

pub mod engine;
pub mod error;
pub mod http;
pub mod protocol;

pub use crate::engine::{BoxFuture, Engine, EngineResult};
pub use crate::error::{EngineError, ErrorKind};
pub use crate::http::HttpEngine;
pub use crate::protocol::InstanceHandle;
