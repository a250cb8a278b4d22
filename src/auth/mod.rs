//! Caller authentication.
//!
//! Two ways in, both ending in an owner identifier:
//!
//! 1. **Session**: `Authorization: Bearer <token>` is checked by the
//!    [`gate`] middleware, which asks the auth service for the username and
//!    then the user directory for the owner id.
//! 2. **Access key**: the access-key route calls
//!    [`AuthClient::validate_access_key`] directly; the auth service answers
//!    with the owner id, so no directory lookup is needed.

pub mod client;
pub mod gate;
pub mod resolver;

pub use client::{AccessKeyIdentity, AuthClient, HttpAuthClient, strip_bearer};
pub use gate::{AuthGate, Owner, UNAUTHORIZED_USER, authorization_gate};
pub use resolver::{IdentityResolver, InMemoryUserDirectory, UserDirectory};
