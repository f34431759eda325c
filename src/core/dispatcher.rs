use crate::core::context::ActionContext;
use crate::domain::model::{Action, ActionRequest, ActionResponse};
use crate::domain::ports::{ActionHandler, ExecuteActions};
use crate::utils::error::{DispatchError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Prefix that stops the body from being evaluated as a script.
pub const RESPONSE_PREFIX: char = ']';

enum RequestedActions {
    Single(Result<Action>),
    Batch(Vec<Result<Action>>),
}

/// Routes each requested action to the first registered handler that serves it.
pub struct ActionDispatcher {
    handlers: Vec<Box<dyn ActionHandler>>,
    routes: HashMap<&'static str, usize>,
}

impl ActionDispatcher {
    pub fn new(handlers: Vec<Box<dyn ActionHandler>>) -> Self {
        let mut routes: HashMap<&'static str, usize> = HashMap::new();
        for (index, handler) in handlers.iter().enumerate() {
            for &name in handler.actions() {
                if let Some(&owner) = routes.get(name) {
                    tracing::warn!(
                        "action '{}' of handler '{}' is shadowed by handler '{}'",
                        name,
                        handler.name(),
                        handlers[owner].name()
                    );
                    continue;
                }
                routes.insert(name, index);
            }
        }

        tracing::debug!(
            "dispatcher ready with {} handlers and {} actions",
            handlers.len(),
            routes.len()
        );
        Self { handlers, routes }
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    /// Name of the handler serving `action`, if any.
    pub fn route(&self, action: &str) -> Option<&'static str> {
        self.routes
            .get(action)
            .map(|&index| self.handlers[index].name())
    }

    fn requested_actions(request: &ActionRequest) -> Result<RequestedActions> {
        if let Some(json) = request.param("json") {
            return Self::parse_batch(json).map(RequestedActions::Batch);
        }

        let action = match request.param("act") {
            Some(name) if !name.is_empty() => {
                let mut params = request.params.clone();
                params.remove("act");
                Ok(Action {
                    name: name.to_string(),
                    params,
                })
            }
            _ => Err(DispatchError::MissingAction),
        };
        Ok(RequestedActions::Single(action))
    }

    fn parse_batch(json: &str) -> Result<Vec<Result<Action>>> {
        let value: Value = serde_json::from_str(json)
            .map_err(|_| DispatchError::invalid("malformed json parameter"))?;
        let Value::Array(items) = value else {
            return Err(DispatchError::invalid("json parameter must be an array"));
        };

        Ok(items.into_iter().map(Self::parse_batch_item).collect())
    }

    fn parse_batch_item(item: Value) -> Result<Action> {
        let Value::Object(fields) = item else {
            return Err(DispatchError::MissingAction);
        };

        let mut name = None;
        let mut params = HashMap::new();
        for (key, value) in fields {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            if key == "act" {
                name = Some(value);
            } else {
                params.insert(key, value);
            }
        }

        match name {
            Some(name) if !name.is_empty() => Ok(Action { name, params }),
            _ => Err(DispatchError::MissingAction),
        }
    }

    async fn run_action(&self, action: Result<Action>, ctx: &mut ActionContext) -> Value {
        let outcome = match action {
            Ok(action) => self.dispatch(&action, ctx).await,
            Err(e) => Err(e),
        };
        outcome.unwrap_or_else(|e| Self::error_result(&e))
    }

    async fn dispatch(&self, action: &Action, ctx: &mut ActionContext) -> Result<Value> {
        let Some(&index) = self.routes.get(action.name.as_str()) else {
            tracing::warn!("unknown action '{}'", action.name);
            return Err(DispatchError::UnknownAction {
                name: action.name.clone(),
            });
        };

        let handler = &self.handlers[index];
        tracing::debug!("dispatching '{}' to handler '{}'", action.name, handler.name());
        handler.handle(action, ctx).await
    }

    fn error_result(err: &DispatchError) -> Value {
        if err.is_client_error() {
            tracing::debug!("action rejected: {}", err);
            json!({ "actionerror": err.to_string() })
        } else {
            tracing::error!(
                "action failed: {} (Category: {:?}, Severity: {:?})",
                err,
                err.category(),
                err.severity()
            );
            json!({ "actionerror": "internal error" })
        }
    }

    fn render(result: Value, ctx: ActionContext) -> ActionResponse {
        let mut response = ActionResponse::text(200, format!("{}{}", RESPONSE_PREFIX, result));
        response.set_cookies = ctx.into_set_cookies();
        response
    }
}

#[async_trait]
impl ExecuteActions for ActionDispatcher {
    async fn execute_actions(&self, request: ActionRequest) -> ActionResponse {
        let mut ctx = ActionContext::from_request(&request);

        let result = match Self::requested_actions(&request) {
            Ok(RequestedActions::Single(action)) => self.run_action(action, &mut ctx).await,
            Ok(RequestedActions::Batch(actions)) => {
                tracing::debug!("executing batch of {} actions", actions.len());
                let mut results = Vec::with_capacity(actions.len());
                for action in actions {
                    results.push(self.run_action(action, &mut ctx).await);
                }
                Value::Array(results)
            }
            Err(e) => Self::error_result(&e),
        };

        Self::render(result, ctx)
    }
}
