use crate::core::{Action, ActionContext, ActionHandler};
use crate::domain::model::{to_userid, MatchOutcome};
use crate::domain::ports::LadderStore;
use crate::utils::error::{DispatchError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const ACTIONS: &[&str] = &["ladderget", "ladderupdate"];

/// Ladder actions: reading and recording match tallies.
pub struct LadderActionHandler {
    ladder: Arc<dyn LadderStore>,
}

impl LadderActionHandler {
    pub fn new(ladder: Arc<dyn LadderStore>) -> Self {
        Self { ladder }
    }

    async fn ladder_get(&self, action: &Action) -> Result<Value> {
        let userid = to_userid(action.param_or_empty("user"));
        if userid.is_empty() {
            return Err(DispatchError::invalid("you must specify a user"));
        }
        let format = action.param("format").map(to_userid);

        let mut entries = self.ladder.entries(&userid).await?;
        if let Some(format) = &format {
            entries.retain(|entry| &entry.format == format);
        }
        entries.sort_by(|a, b| a.format.cmp(&b.format));

        Ok(json!({
            "userid": userid,
            "entries": entries,
        }))
    }

    async fn ladder_update(&self, action: &Action) -> Result<Value> {
        let format = to_userid(action.param_or_empty("format"));
        if format.is_empty() {
            return Err(DispatchError::invalid("you must specify a format"));
        }

        let p1 = to_userid(action.param_or_empty("p1"));
        let p2 = to_userid(action.param_or_empty("p2"));
        if p1.is_empty() || p2.is_empty() {
            return Err(DispatchError::invalid("you must specify both players"));
        }
        if p1 == p2 {
            return Err(DispatchError::invalid("a player cannot play against themselves"));
        }

        let outcome = MatchOutcome::from_score(action.param_or_empty("score")).ok_or_else(|| {
            DispatchError::invalid("score must be 1 (p1 wins), 0 (p2 wins) or 0.5 (tie)")
        })?;

        let (p1_entry, p2_entry) = self.ladder.record(&format, &p1, &p2, outcome).await?;
        Ok(json!({
            "actionsuccess": true,
            "p1rating": p1_entry,
            "p2rating": p2_entry,
        }))
    }
}

#[async_trait]
impl ActionHandler for LadderActionHandler {
    fn name(&self) -> &'static str {
        "ladder"
    }

    fn actions(&self) -> &'static [&'static str] {
        ACTIONS
    }

    async fn handle(&self, action: &Action, _ctx: &mut ActionContext) -> Result<Value> {
        match action.name.as_str() {
            "ladderget" => self.ladder_get(action).await,
            "ladderupdate" => self.ladder_update(action).await,
            other => Err(DispatchError::UnknownAction {
                name: other.to_string(),
            }),
        }
    }
}
