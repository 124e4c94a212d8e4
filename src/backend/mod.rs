//! Compilation backend: compile requests, result storage and retrieval.

pub mod artifact;
pub mod compiler;
pub mod cors;
pub mod handlers;
pub mod server;
pub mod store;

pub use compiler::{Compiler, CompilerError, VyperCli};
pub use server::BackendServer;
pub use store::ResultStore;
