use crate::adapters::{BcryptHasher, SqliteStore};
use crate::app::handlers::{DefaultActionHandler, LadderActionHandler};
use crate::config::toml_config::DiagnosticsConfig;
use crate::config::ServiceConfig;
use crate::core::dispatcher::RESPONSE_PREFIX;
use crate::core::{ActionHandler, ActionRequest, ActionResponse, ExecuteActions};
use crate::domain::ports::{LadderStore, PasswordHasher, SessionStore};
use crate::utils::error::{DispatchError, Result};
use crate::utils::logger;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

/// The collaborators the handlers are built from.
#[derive(Clone)]
pub struct Collaborators {
    pub passwords: Arc<dyn PasswordHasher>,
    pub sessions: Arc<dyn SessionStore>,
    pub ladder: Arc<dyn LadderStore>,
}

impl Collaborators {
    /// Bcrypt passwords plus one SQLite database under `storage.data_dir`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let store = Arc::new(
            SqliteStore::open(&config.storage.data_dir)?.with_session_ttl(config.session.ttl()),
        );

        Ok(Self {
            passwords: Arc::new(BcryptHasher::new(config.password.bcrypt_cost)),
            sessions: store.clone(),
            ladder: store,
        })
    }
}

/// 設定診斷層級；必須在任何協作者建立之前呼叫
pub fn init_diagnostics(diagnostics: &DiagnosticsConfig) {
    logger::init_logger(diagnostics.level, diagnostics.format);
}

/// Handlers in precedence order: default first, ladder second.
pub fn handlers(collaborators: &Collaborators, config: &ServiceConfig) -> Vec<Box<dyn ActionHandler>> {
    let default: Box<dyn ActionHandler> = Box::new(DefaultActionHandler::new(
        collaborators.passwords.clone(),
        collaborators.sessions.clone(),
        config.session.clone(),
    ));
    let ladder: Box<dyn ActionHandler> =
        Box::new(LadderActionHandler::new(collaborators.ladder.clone()));
    vec![default, ladder]
}

/// Builds the dispatcher from the handlers and executes the request exactly once.
pub async fn run<F, D>(
    config: &ServiceConfig,
    collaborators: &Collaborators,
    make_dispatcher: F,
    request: ActionRequest,
) -> ActionResponse
where
    F: FnOnce(Vec<Box<dyn ActionHandler>>) -> D,
    D: ExecuteActions,
{
    let dispatcher = make_dispatcher(handlers(collaborators, config));
    dispatcher.execute_actions(request).await
}

/// The whole composition root for one request.
///
/// Diagnostics are initialised first. Only then is the request read and are
/// the collaborators, handlers and dispatcher built; `execute_actions` runs
/// once. `request` is a lazy future and is only polled after diagnostics are set.
pub async fn serve<I, R, C, F, D>(
    config: &ServiceConfig,
    init_diagnostics: I,
    request: R,
    build_collaborators: C,
    make_dispatcher: F,
) -> Result<ActionResponse>
where
    I: FnOnce(&DiagnosticsConfig),
    R: Future<Output = Result<ActionRequest>>,
    C: FnOnce(&ServiceConfig) -> Result<Collaborators>,
    F: FnOnce(Vec<Box<dyn ActionHandler>>) -> D,
    D: ExecuteActions,
{
    init_diagnostics(&config.diagnostics);
    tracing::debug!("diagnostics set to {:?}", config.diagnostics.level);

    let request = request.await?;
    let collaborators = build_collaborators(config)?;
    Ok(run(config, &collaborators, make_dispatcher, request).await)
}

/// The response for an error that stops the request before dispatch.
pub fn failure_response(err: &DispatchError) -> ActionResponse {
    let status = err.status_code();
    let message = if status < 500 {
        err.user_friendly_message()
    } else {
        "internal error".to_string()
    };
    ActionResponse::text(
        status,
        format!("{}{}", RESPONSE_PREFIX, json!({ "actionerror": message })),
    )
}
