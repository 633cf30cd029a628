//! HTTP session for the `skm-admin` command-line client.
//!
//! `login` stores the session token in a local file; admin requests send it
//! as a bearer header. When the server answers 401 or 403 the file is
//! removed and the operator has to log in again.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::rest::LoginResponse;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not logged in. Run `skm-admin login` first.")]
    NotLoggedIn,

    #[error("{0}. Session cleared; run `skm-admin login` again.")]
    SessionEnded(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("{0}")]
    Server(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token file: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Session {
    client: Client,
    url: String,
    token_file: PathBuf,
}

impl Session {
    pub fn new(url: impl Into<String>, token_file: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            token_file: token_file.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }

    pub fn token(&self) -> Result<String, ClientError> {
        match fs::read_to_string(&self.token_file) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(ClientError::NotLoggedIn),
        }
    }

    /// Exchange credentials for a token and store it.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let res = self
            .client
            .post(self.endpoint("/admin/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ClientError::LoginFailed(error_message(res).await));
        }
        let body: LoginResponse = res.json().await?;
        fs::write(&self.token_file, body.token)?;
        Ok(())
    }

    pub fn logout(&self) {
        let _ = fs::remove_file(&self.token_file);
    }

    /// Send an admin request. A 401/403 ends the stored session.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.bearer_auth(self.token()?).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.logout();
            return Err(ClientError::SessionEnded(error_message(response).await));
        }
        if !status.is_success() {
            return Err(ClientError::Server(error_message(response).await));
        }
        Ok(response)
    }
}

/// The `message` field of an error body, or the status line.
pub async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<Value>().await {
        Ok(body) => body["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string()),
        Err(_) => status.to_string(),
    }
}
