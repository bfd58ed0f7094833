pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod prompt;
pub mod provider;
pub mod quota;
pub mod relay;
pub mod server;
pub mod session;
pub mod settings;
pub mod story;

pub use config::AppConfig;
pub use error::ServiceError;
pub use provider::{DeepInfraClient, TextGenerator};
pub use quota::DailyQuota;
pub use server::{AppState, build_router};
pub use session::{InMemorySessionStore, SessionStore};
