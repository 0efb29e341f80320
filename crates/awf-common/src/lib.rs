pub mod provider;
pub mod request_id;
pub mod sanitize;

pub use provider::{ProviderID, ProviderId};
pub use request_id::{generate as generate_request_id, resolve as resolve_request_id, validate as validate_request_id};
pub use sanitize::{sanitize, sanitize_default};
