//! Resource catalog (JSON), its validation and resolution, and process settings.

pub mod loader;
pub mod resolved;
pub mod settings;
pub mod types;
pub mod validator;

pub use loader::*;
pub use resolved::*;
pub use settings::{Settings, StoreBackend};
pub use types::*;
pub use validator::*;
