pub mod claims;
pub mod jwt;
pub mod session_store;

pub use claims::SessionClaims;
pub use jwt::{issue_token, validate_token};
pub use session_store::SessionStore;
