pub mod config;
pub mod error;
pub mod local_store;
pub mod identity;
pub mod gateway;
pub mod normalize;
pub mod files;
pub mod resources;
pub mod cli;

pub use error::{ApiError, ApiResult};
pub use gateway::Gateway;
pub use identity::{Session, SessionStore};
