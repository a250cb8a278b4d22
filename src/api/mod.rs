//! HTTP surface: router, handlers, and the server that runs them.

pub mod handlers;
pub mod router;
pub mod server;

pub use handlers::{AccessKeyRequest, SecretList, SecretResponse, SecretSummary, ValidJson};
pub use router::{AppState, create_router};
pub use server::VaultServer;
