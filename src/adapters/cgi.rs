//! CGI gateway: turns the process environment and stdin into an
//! [`ActionRequest`] and writes an [`ActionResponse`] back to stdout.

use crate::domain::model::{ActionRequest, ActionResponse};
use crate::utils::error::{DispatchError, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::form_urlencoded;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

fn request_error(message: impl Into<String>) -> DispatchError {
    DispatchError::RequestError {
        message: message.into(),
    }
}

/// Builds a request from CGI variables and the raw body.
///
/// Query parameters are read first and url-encoded body parameters replace
/// them, so a POSTed `act` wins over one in the query string.
pub fn parse_request(
    env: &HashMap<String, String>,
    body: &[u8],
    max_body_bytes: usize,
) -> Result<ActionRequest> {
    if body.len() > max_body_bytes {
        return Err(DispatchError::PayloadTooLarge {
            size: body.len(),
            limit: max_body_bytes,
        });
    }

    let mut params = HashMap::new();
    if let Some(query) = env.get("QUERY_STRING") {
        params.extend(form_urlencoded::parse(query.as_bytes()).into_owned());
    }

    let method = env
        .get("REQUEST_METHOD")
        .map(|m| m.to_ascii_uppercase())
        .unwrap_or_else(|| "GET".to_string());
    let is_form = env
        .get("CONTENT_TYPE")
        .map(|ct| ct.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(true);
    if method == "POST" && is_form && !body.is_empty() {
        params.extend(form_urlencoded::parse(body).into_owned());
    }

    Ok(ActionRequest {
        params,
        cookies: env
            .get("HTTP_COOKIE")
            .map(String::as_str)
            .map(parse_cookies)
            .unwrap_or_default(),
        remote_addr: env.get("REMOTE_ADDR").cloned(),
    })
}

/// Splits a `Cookie` header. The first occurrence of a name wins.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                cookies
                    .entry(name.to_string())
                    .or_insert_with(|| value.trim().trim_matches('"').to_string());
            }
        }
    }
    cookies
}

fn content_length(env: &HashMap<String, String>) -> Result<usize> {
    match env.get("CONTENT_LENGTH").map(|v| v.trim()) {
        None | Some("") => Ok(0),
        Some(value) => value
            .parse()
            .map_err(|_| request_error(format!("invalid CONTENT_LENGTH '{}'", value))),
    }
}

/// Keeps the variables that are valid UTF-8 and warns about the rest.
fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                let name = match key {
                    Ok(key) => key,
                    Err(key) => key.to_string_lossy().into_owned(),
                };
                tracing::warn!("ignoring CGI variable {} (not valid UTF-8)", name);
                None
            }
        })
        .collect()
}

/// Reads the current CGI request from the environment and stdin.
pub async fn read_request(max_body_bytes: usize) -> Result<ActionRequest> {
    let env = utf8_vars(std::env::vars_os());

    let length = content_length(&env)?;
    if length > max_body_bytes {
        return Err(DispatchError::PayloadTooLarge {
            size: length,
            limit: max_body_bytes,
        });
    }

    let mut body = Vec::with_capacity(length);
    if length > 0 {
        tokio::io::stdin()
            .take(length as u64)
            .read_to_end(&mut body)
            .await?;
    }
    tracing::debug!(
        "read {} request from {} ({} body bytes)",
        env.get("REQUEST_METHOD").map(String::as_str).unwrap_or("GET"),
        env.get("REMOTE_ADDR").map(String::as_str).unwrap_or("unknown"),
        body.len()
    );

    parse_request(&env, &body, max_body_bytes)
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

pub fn render_response(response: &ActionResponse) -> String {
    let mut out = format!(
        "Status: {} {}\r\nContent-Type: {}\r\n",
        response.status,
        reason_phrase(response.status),
        response.content_type
    );
    for cookie in &response.set_cookies {
        out.push_str("Set-Cookie: ");
        out.push_str(cookie);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out.push_str(&response.body);
    out
}

pub async fn write_response(response: &ActionResponse) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(render_response(response).as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
