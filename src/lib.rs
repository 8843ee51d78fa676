//! E-book record service
//!
//! Feature modules and helpers for the shelf application. The binary in
//! `main.rs` wires them to SurrealDB, the image store and the HTTP server.

pub mod modules;
pub mod utils;

pub use modules::*;
