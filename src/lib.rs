//! Replaces Rocket's default error bodies with a nested-dictionary format:
//!
//! ```json
//! { "errors": { "json": { "url": ["Does not exist."] } } }
//! ```
//!
//! Attach [`ErrorsAsNestedDicts`] to a Rocket instance, optionally together
//! with a [`JwtManager`] whose failure hooks should follow the same format.

pub mod catchers;
pub mod dto;
pub mod errors;
pub mod guards;
pub mod jwt;
pub mod session;

pub use catchers::{ErrorsAsNestedDicts, EXTENSION_NAME};
pub use dto::errors::{ErrorField, ErrorPayload};
pub use jwt::JwtManager;
pub use session::DbSession;
