use crate::domain::model::{
    Account, Action, ActionRequest, ActionResponse, LadderEntry, MatchOutcome, Session,
};
use crate::core::context::ActionContext;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A pluggable unit serving one category of actions.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Action names this handler serves.
    fn actions(&self) -> &'static [&'static str];

    async fn handle(&self, action: &Action, ctx: &mut ActionContext) -> Result<Value>;
}

/// The single entry point the composition root drives.
#[async_trait]
pub trait ExecuteActions: Send + Sync {
    async fn execute_actions(&self, request: ActionRequest) -> ActionResponse;
}

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, hash: &str) -> Result<bool>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn account(&self, userid: &str) -> Result<Option<Account>>;
    async fn create_account(&self, account: Account) -> Result<()>;
    async fn update_password(&self, userid: &str, password_hash: String) -> Result<()>;
    async fn open_session(&self, account: &Account) -> Result<Session>;
    async fn resolve(&self, session_id: &str) -> Result<Option<Session>>;
    async fn close(&self, session_id: &str) -> Result<()>;
}

#[async_trait]
pub trait LadderStore: Send + Sync {
    async fn entries(&self, userid: &str) -> Result<Vec<LadderEntry>>;

    /// Applies one match result and returns the updated `(p1, p2)` entries.
    async fn record(
        &self,
        format: &str,
        p1: &str,
        p2: &str,
        outcome: MatchOutcome,
    ) -> Result<(LadderEntry, LadderEntry)>;
}
