use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One incoming web request, already decoded by a gateway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionRequest {
    pub params: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub remote_addr: Option<String>,
}

impl ActionRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// One requested action and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub params: HashMap<String, String>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Parameter value, or the empty string when absent.
    pub fn param_or_empty(&self, name: &str) -> &str {
        self.param(name).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub status: u16,
    pub content_type: String,
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl ActionResponse {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            set_cookies: Vec::new(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub userid: String,
    pub username: String,
    pub password_hash: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub userid: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderEntry {
    pub format: String,
    pub userid: String,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
}

impl LadderEntry {
    pub fn new(format: &str, userid: &str) -> Self {
        Self {
            format: format.to_string(),
            userid: userid.to_string(),
            wins: 0,
            losses: 0,
            ties: 0,
        }
    }

    pub fn games(&self) -> u32 {
        self.wins + self.losses + self.ties
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    P1Win,
    P2Win,
    Tie,
}

impl MatchOutcome {
    /// Parses the score as seen from player one: `1`, `0` or `0.5`.
    pub fn from_score(score: &str) -> Option<Self> {
        match score.trim() {
            "1" | "1.0" => Some(MatchOutcome::P1Win),
            "0" | "0.0" => Some(MatchOutcome::P2Win),
            "0.5" | ".5" => Some(MatchOutcome::Tie),
            _ => None,
        }
    }
}

/// Lower-cases a display name and keeps only `[a-z0-9]`.
pub fn to_userid(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_userid() {
        assert_eq!(to_userid("Red Dragon_99"), "reddragon99");
        assert_eq!(to_userid("  "), "");
        assert_eq!(to_userid("Émile"), "mile");
    }

    #[test]
    fn test_match_outcome_from_score() {
        assert_eq!(MatchOutcome::from_score("1"), Some(MatchOutcome::P1Win));
        assert_eq!(MatchOutcome::from_score("0"), Some(MatchOutcome::P2Win));
        assert_eq!(MatchOutcome::from_score("0.5"), Some(MatchOutcome::Tie));
        assert_eq!(MatchOutcome::from_score("2"), None);
    }
}
