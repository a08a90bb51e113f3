//! Credential models: redacted secrets, the access/refresh pair, and backend wire payloads.

pub mod credentials;
pub mod secret;
pub mod wire;

pub use credentials::*;
pub use secret::*;
pub use wire::*;
