use crate::core::{Action, ActionContext, ActionHandler};
use crate::config::toml_config::SessionConfig;
use crate::domain::model::{to_userid, Account, Session};
use crate::domain::ports::{PasswordHasher, SessionStore};
use crate::utils::error::{DispatchError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

const ACTIONS: &[&str] = &["register", "login", "logout", "upkeep", "changepassword"];
const MAX_USERID_LENGTH: usize = 18;
const MAX_USERNAME_LENGTH: usize = 30;

/// A well-formed bcrypt hash (cost 12) that no submitted password is expected
/// to match. Unknown users are verified against it so a failed login costs the
/// same whether or not the account exists.
const UNKNOWN_USER_HASH: &str = "$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW";

/// Account and session actions.
pub struct DefaultActionHandler {
    passwords: Arc<dyn PasswordHasher>,
    sessions: Arc<dyn SessionStore>,
    settings: SessionConfig,
}

impl DefaultActionHandler {
    pub fn new(
        passwords: Arc<dyn PasswordHasher>,
        sessions: Arc<dyn SessionStore>,
        settings: SessionConfig,
    ) -> Self {
        Self {
            passwords,
            sessions,
            settings,
        }
    }

    async fn current_session(&self, ctx: &ActionContext) -> Result<Option<Session>> {
        match ctx.cookie(&self.settings.cookie_name) {
            Some(session_id) => self.sessions.resolve(session_id).await,
            None => Ok(None),
        }
    }

    async fn start_session(&self, account: &Account, ctx: &mut ActionContext) -> Result<Value> {
        let session = self.sessions.open_session(account).await?;
        ctx.set_cookie(
            &self.settings.cookie_name,
            &session.id,
            self.settings.ttl().num_seconds(),
        );
        tracing::info!(
            "session opened for '{}' from {}",
            account.userid,
            ctx.remote_addr().unwrap_or("unknown")
        );

        Ok(json!({
            "curuser": {
                "loggedin": true,
                "username": account.username,
                "userid": account.userid,
            }
        }))
    }

    fn check_new_password(password: &str, confirmation: &str) -> Result<()> {
        if password.is_empty() {
            return Err(DispatchError::invalid("you must specify a password"));
        }
        if password != confirmation {
            return Err(DispatchError::invalid("your passwords do not match"));
        }
        Ok(())
    }

    async fn register(&self, action: &Action, ctx: &mut ActionContext) -> Result<Value> {
        let username = action.param_or_empty("username").trim();
        if username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(DispatchError::invalid(format!(
                "your username must be at most {} characters long",
                MAX_USERNAME_LENGTH
            )));
        }
        let userid = to_userid(username);
        if userid.is_empty() {
            return Err(DispatchError::invalid(
                "your username must contain at least one letter or number",
            ));
        }
        if userid.len() > MAX_USERID_LENGTH {
            return Err(DispatchError::invalid(format!(
                "your username must be at most {} characters",
                MAX_USERID_LENGTH
            )));
        }
        Self::check_new_password(
            action.param_or_empty("password"),
            action.param_or_empty("cpassword"),
        )?;

        if self.sessions.account(&userid).await?.is_some() {
            return Err(DispatchError::invalid("that username is already taken"));
        }

        let account = Account {
            userid,
            username: username.to_string(),
            password_hash: self.passwords.hash(action.param_or_empty("password"))?,
            registered_at: Utc::now(),
        };
        self.sessions.create_account(account.clone()).await?;
        self.start_session(&account, ctx).await
    }

    async fn login(&self, action: &Action, ctx: &mut ActionContext) -> Result<Value> {
        let userid = to_userid(action.param_or_empty("name"));
        let password = action.param_or_empty("pass");

        let account = self.sessions.account(&userid).await?;
        let verified = match &account {
            Some(account) => self.passwords.verify(password, &account.password_hash)?,
            None => {
                // 不論帳號是否存在都跑一次 bcrypt
                let _ = self.passwords.verify(password, UNKNOWN_USER_HASH);
                false
            }
        };
        let account = match account {
            Some(account) if verified => account,
            _ => {
                tracing::debug!("rejected login for '{}'", userid);
                return Err(DispatchError::unauthorized("wrong username or password"));
            }
        };
        self.start_session(&account, ctx).await
    }

    async fn logout(&self, ctx: &mut ActionContext) -> Result<Value> {
        if let Some(session_id) = ctx.cookie(&self.settings.cookie_name) {
            self.sessions.close(session_id).await?;
        }
        ctx.expire_cookie(&self.settings.cookie_name);
        Ok(json!({ "actionsuccess": true }))
    }

    async fn upkeep(&self, ctx: &ActionContext) -> Result<Value> {
        Ok(match self.current_session(ctx).await? {
            Some(session) => json!({
                "loggedin": true,
                "username": session.username,
                "userid": session.userid,
            }),
            None => json!({ "loggedin": false }),
        })
    }

    async fn change_password(&self, action: &Action, ctx: &ActionContext) -> Result<Value> {
        let session = self
            .current_session(ctx)
            .await?
            .ok_or_else(|| DispatchError::unauthorized("you must be logged in"))?;
        let account = self
            .sessions
            .account(&session.userid)
            .await?
            .ok_or_else(|| DispatchError::unauthorized("you must be logged in"))?;

        if !self
            .passwords
            .verify(action.param_or_empty("oldpassword"), &account.password_hash)?
        {
            return Err(DispatchError::unauthorized("your old password was incorrect"));
        }
        Self::check_new_password(
            action.param_or_empty("password"),
            action.param_or_empty("cpassword"),
        )?;

        let password_hash = self.passwords.hash(action.param_or_empty("password"))?;
        self.sessions
            .update_password(&account.userid, password_hash)
            .await?;
        tracing::info!("password changed for '{}'", account.userid);
        Ok(json!({ "actionsuccess": true }))
    }
}

#[async_trait]
impl ActionHandler for DefaultActionHandler {
    fn name(&self) -> &'static str {
        "default"
    }

    fn actions(&self) -> &'static [&'static str] {
        ACTIONS
    }

    async fn handle(&self, action: &Action, ctx: &mut ActionContext) -> Result<Value> {
        match action.name.as_str() {
            "register" => self.register(action, ctx).await,
            "login" => self.login(action, ctx).await,
            "logout" => self.logout(ctx).await,
            "upkeep" => self.upkeep(ctx).await,
            "changepassword" => self.change_password(action, ctx).await,
            other => Err(DispatchError::UnknownAction {
                name: other.to_string(),
            }),
        }
    }
}
