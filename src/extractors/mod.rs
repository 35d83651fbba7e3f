//! Request extractors and the auth middleware built on them.

mod bearer;
pub use bearer::{require_bearer, BearerToken, Caller};
