pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use app::bootstrap::Collaborators;
pub use app::handlers::{DefaultActionHandler, LadderActionHandler};
pub use config::ServiceConfig;
pub use crate::core::{ActionDispatcher, ExecuteActions};
pub use domain::model::{Action, ActionRequest, ActionResponse};
pub use utils::error::{DispatchError, Result};
