pub mod context;
pub mod dispatcher;

pub use crate::domain::model::{Action, ActionRequest, ActionResponse};
pub use crate::domain::ports::{ActionHandler, ExecuteActions};
pub use crate::utils::error::Result;
pub use context::ActionContext;
pub use dispatcher::ActionDispatcher;
