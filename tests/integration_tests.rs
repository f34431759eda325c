use action_dispatch::adapters::cgi;
use action_dispatch::app::bootstrap::{self, Collaborators};
use action_dispatch::{ActionDispatcher, ActionRequest, ActionResponse, ServiceConfig};
use serde_json::Value;
use std::collections::HashMap;
use tempfile::TempDir;

struct Service {
    _dir: TempDir,
    config: ServiceConfig,
    collaborators: Collaborators,
}

impl Service {
    fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = ServiceConfig::default();
        config.storage.data_dir = dir.path().to_str().unwrap().to_string();
        config.password.bcrypt_cost = 4;
        let collaborators = Collaborators::from_config(&config).unwrap();
        Self {
            _dir: dir,
            config,
            collaborators,
        }
    }

    /// Runs one CGI-style request the way the binary does.
    async fn post(&self, body: &str, cookie: Option<&str>) -> ActionResponse {
        let mut env = HashMap::new();
        env.insert("REQUEST_METHOD".to_string(), "POST".to_string());
        env.insert(
            "CONTENT_TYPE".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        if let Some(cookie) = cookie {
            env.insert("HTTP_COOKIE".to_string(), cookie.to_string());
        }
        let request = cgi::parse_request(&env, body.as_bytes(), 64 * 1024).unwrap();
        self.execute(request).await
    }

    async fn execute(&self, request: ActionRequest) -> ActionResponse {
        bootstrap::run(
            &self.config,
            &self.collaborators,
            ActionDispatcher::new,
            request,
        )
        .await
    }
}

fn body(response: &ActionResponse) -> Value {
    let json = response.body.strip_prefix(']').expect("response must start with ]");
    serde_json::from_str(json).unwrap()
}

/// `sid=<value>` from the first Set-Cookie header.
fn session_cookie(response: &ActionResponse) -> String {
    let header = response.set_cookies.first().expect("session cookie");
    header.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_account_round_trip() {
    let service = Service::start();

    let registered = service
        .post("act=register&username=Red+Dragon&password=pw1&cpassword=pw1", None)
        .await;
    assert_eq!(body(&registered)["curuser"]["userid"], "reddragon");
    let cookie = session_cookie(&registered);
    assert!(cookie.starts_with("sid="));

    let upkeep = service.post("act=upkeep", Some(&cookie)).await;
    assert_eq!(body(&upkeep)["loggedin"], true);
    assert_eq!(body(&upkeep)["username"], "Red Dragon");

    let changed = service
        .post(
            "act=changepassword&oldpassword=pw1&password=pw2&cpassword=pw2",
            Some(&cookie),
        )
        .await;
    assert_eq!(body(&changed)["actionsuccess"], true);

    let logout = service.post("act=logout", Some(&cookie)).await;
    assert_eq!(body(&logout)["actionsuccess"], true);
    assert!(logout.set_cookies[0].contains("Max-Age=0"));

    let stale = service.post("act=upkeep", Some(&cookie)).await;
    assert_eq!(body(&stale)["loggedin"], false);

    let old = service.post("act=login&name=reddragon&pass=pw1", None).await;
    assert_eq!(body(&old)["actionerror"], "wrong username or password");
    assert!(old.set_cookies.is_empty());

    let new = service.post("act=login&name=reddragon&pass=pw2", None).await;
    assert_eq!(body(&new)["curuser"]["loggedin"], true);
}

#[tokio::test]
async fn test_ladder_round_trip() {
    let service = Service::start();

    for score in ["1", "1", "0.5", "0"] {
        let response = service
            .post(
                &format!("act=ladderupdate&format=gen9ou&p1=ash&p2=gary&score={}", score),
                None,
            )
            .await;
        assert_eq!(body(&response)["actionsuccess"], true);
    }

    let response = service.post("act=ladderget&user=Gary", None).await;
    let entries = body(&response)["entries"].clone();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["wins"], 1);
    assert_eq!(entries[0]["losses"], 2);
    assert_eq!(entries[0]["ties"], 1);
}

#[tokio::test]
async fn test_batch_login_then_upkeep_shares_the_new_session() {
    let service = Service::start();
    service
        .post("act=register&username=misty&password=staryu&cpassword=staryu", None)
        .await;

    let json = r#"[{"act":"login","name":"misty","pass":"staryu"},{"act":"upkeep"},{"act":"nope"},{"act":"ladderget","user":"misty"}]"#;
    let mut request = ActionRequest::default();
    request.params.insert("json".to_string(), json.to_string());
    let response = service.execute(request).await;

    let results = body(&response);
    assert_eq!(results.as_array().unwrap().len(), 4);
    assert_eq!(results[0]["curuser"]["userid"], "misty");
    assert_eq!(results[1]["loggedin"], true);
    assert_eq!(results[2]["actionerror"], "invalid action: nope");
    assert_eq!(results[3]["entries"], serde_json::json!([]));
    assert_eq!(response.set_cookies.len(), 1);
}

#[tokio::test]
async fn test_response_renders_as_cgi() {
    let service = Service::start();
    let response = service.post("act=upkeep", None).await;

    let rendered = cgi::render_response(&response);
    assert!(rendered.starts_with("Status: 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n"));
    assert!(rendered.ends_with("]{\"loggedin\":false}"));
}
