pub mod clock;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod medication;
pub mod messages;
pub mod notifications;
pub mod reminder;
pub mod reset;
pub mod state;
pub mod store;
pub mod task;

pub use crate::host::HostEnv;
pub use crate::state::AppState;
pub use crate::store::{JsonFileStore, LocalStore, LocalStoreExt, MemoryStore};
