use crate::domain::model::ActionRequest;
use std::collections::HashMap;

/// State shared by every action of one request.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    cookies: HashMap<String, String>,
    set_cookies: Vec<String>,
    remote_addr: Option<String>,
}

impl ActionContext {
    pub fn from_request(request: &ActionRequest) -> Self {
        Self {
            cookies: request.cookies.clone(),
            set_cookies: Vec::new(),
            remote_addr: request.remote_addr.clone(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Sets a cookie on the response. Later actions of the same request see it too.
    pub fn set_cookie(&mut self, name: &str, value: &str, max_age_secs: i64) {
        self.cookies.insert(name.to_string(), value.to_string());
        self.set_cookies.push(format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            name, value, max_age_secs
        ));
    }

    pub fn expire_cookie(&mut self, name: &str) {
        self.cookies.remove(name);
        self.set_cookies
            .push(format!("{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax", name));
    }

    pub fn into_set_cookies(self) -> Vec<String> {
        self.set_cookies
    }
}
