//! Thin endpoint wrappers over the transport pipeline.
//!
//! Each module maps 1:1 onto a server route group and stays deliberately
//! small: all encryption, envelope handling and error mapping happens in
//! [`crate::transport`]; these functions only name paths and shapes.

pub mod auth;
pub mod configs;
pub mod tasks;
pub mod telemetry;
