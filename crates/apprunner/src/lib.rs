//! Application runtime host.
//!
//! Hosts embedded mini-applications and serves the application runtime
//! contract (page resolution, event streams, server methods and client
//! events) over gRPC, plus an optional admin HTTP API.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod manifest;
pub mod runner;
pub mod server;
pub mod service;

pub use client::{RuntimeClient, RuntimeEndpoint};
pub use error::{RuntimeError, RuntimeResult};
pub use runner::{AppRunner, ApplicationDescriptor, ApplicationHandler, RunnerConfig};
pub use server::{Server, ServerOptions};
pub use service::RuntimeService;
