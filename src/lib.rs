//! Server side of the build-cache helper protocol.
//!
//! A parent build driver starts this program as a child and exchanges
//! a stream of JSON values over its stdin and stdout: the server announces the
//! commands it knows, then answers `get` and `put` requests concurrently and
//! finally acknowledges `close` once everything in flight has been answered.
//! Storage is pluggable through [`handlers::Handler`]; a disk-backed store is
//! bundled in [`handlers::disk`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod writer;

pub mod schema;

pub use config::ServerConfig;
pub use error::{CodecError, ConfigError, DispatchError, RegistryError, ServeError};
pub use registry::{Middleware, Registry};
pub use server::Server;
