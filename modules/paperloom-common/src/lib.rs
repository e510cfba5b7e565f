pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::Config;
pub use error::PaperloomError;
pub use events::SessionEvent;
pub use types::*;
