//! `resources` crate — the `ResourceClient` trait and bundled client implementations.
//!
//! The engine talks to remote services only through [`ResourceClient`]. One
//! client instance is polymorphic over resource kind, so a single value can
//! back every step of a graph.

pub mod error;
pub mod traits;
pub mod memory;
pub mod retry;
pub mod mock;

pub use error::ClientError;
pub use traits::{Operation, Params, ResourceClient, ID_PARAM};
pub use memory::InMemoryClient;
pub use retry::{RetryPolicy, RetryingClient};
