//! REST client for the task/notebook backend.
//!
//! Thin pass-through over `reqwest`: attaches the bearer token, maps 401 to
//! [`ApiError::AuthorizationRequired`] and other failures to
//! [`ApiError::Status`] carrying the backend's `error` string. No retries.
//!
//! The token lives in memory and, when a token file is configured, is
//! persisted there so the next run starts signed in.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::config::ApiConfig;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered 401.
    #[error("Authorization header required")]
    AuthorizationRequired,

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("token store: {0}")]
    TokenStore(String),
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
    token_file: Option<PathBuf>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let token = match &config.auth_token {
            Some(token) => Some(token.clone()),
            None => read_token(config.token_file.as_ref())?,
        };
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(token),
            token_file: config.token_file.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_auth_token(&self, token: &str) -> Result<(), ApiError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        if let Some(path) = &self.token_file {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .map_err(|e| ApiError::TokenStore(format!("{}: {e}", parent.display())))?;
            }
            fs::write(path, token)
                .map_err(|e| ApiError::TokenStore(format!("{}: {e}", path.display())))?;
        }
        Ok(())
    }

    pub fn clear_auth_token(&self) -> Result<(), ApiError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        if let Some(path) = &self.token_file {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(ApiError::TokenStore(format!("{}: {e}", path.display()))),
            }
        }
        Ok(())
    }

    /// Send one request. `Ok(None)` for 204 responses.
    pub async fn request<B>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<Option<Value>, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(%method, %url, "api request");

        let mut req = self
            .http
            .request(method, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(token) = self.auth_token() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                return Err(ApiError::AuthorizationRequired);
            }
            let message = resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or_else(|| "Request failed".to_string());
            warn!(status = status.as_u16(), %message, "api request failed");
            return Err(ApiError::Status { status: status.as_u16(), message });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        resp.json::<Value>()
            .await
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn get(&self, endpoint: &str) -> Result<Option<Value>, ApiError> {
        self.request::<Value>(Method::GET, endpoint, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Option<Value>, ApiError> {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Option<Value>, ApiError> {
        self.request(Method::PUT, endpoint, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Option<Value>, ApiError> {
        self.request::<Value>(Method::DELETE, endpoint, None).await
    }

    /// POST without a body (state transitions such as archive/restore).
    pub async fn post_empty(&self, endpoint: &str) -> Result<Option<Value>, ApiError> {
        self.request::<Value>(Method::POST, endpoint, None).await
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi(self)
    }

    pub fn tasks(&self) -> TaskApi<'_> {
        TaskApi(self)
    }

    pub fn notebooks(&self) -> NotebookApi<'_> {
        NotebookApi(self)
    }

    pub fn pages(&self) -> PageApi<'_> {
        PageApi(self)
    }
}

fn read_token(path: Option<&PathBuf>) -> Result<Option<String>, ApiError> {
    let Some(path) = path else {
        return Ok(None);
    };
    match fs::read_to_string(path) {
        Ok(text) => {
            let token = text.trim();
            Ok((!token.is_empty()).then(|| token.to_string()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ApiError::TokenStore(format!("{}: {e}", path.display()))),
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

// ── resource groups ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

pub struct AuthApi<'a>(&'a ApiClient);

impl AuthApi<'_> {
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<Option<Value>, ApiError> {
        let body = Credentials { email, password, name: Some(name) };
        self.0.post("/auth/register", &body).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Option<Value>, ApiError> {
        let body = Credentials { email, password, name: None };
        self.0.post("/auth/login", &body).await
    }

    pub async fn current_user(&self) -> Result<Option<Value>, ApiError> {
        self.0.get("/user/me").await
    }
}

pub struct TaskApi<'a>(&'a ApiClient);

impl TaskApi<'_> {
    pub async fn all(&self) -> Result<Option<Value>, ApiError> {
        self.0.get("/tasks").await
    }

    pub async fn archived(&self) -> Result<Option<Value>, ApiError> {
        self.0.get("/tasks/archived").await
    }

    pub async fn one(&self, id: u64) -> Result<Option<Value>, ApiError> {
        self.0.get(&format!("/tasks/{id}")).await
    }

    pub async fn create(&self, task: &Value) -> Result<Option<Value>, ApiError> {
        self.0.post("/tasks", task).await
    }

    pub async fn update(&self, id: u64, task: &Value) -> Result<Option<Value>, ApiError> {
        self.0.put(&format!("/tasks/{id}"), task).await
    }

    pub async fn delete(&self, id: u64) -> Result<Option<Value>, ApiError> {
        self.0.delete(&format!("/tasks/{id}")).await
    }

    pub async fn restore(&self, id: u64) -> Result<Option<Value>, ApiError> {
        self.0.post_empty(&format!("/tasks/{id}/restore")).await
    }

    pub async fn permanent_delete(&self, id: u64) -> Result<Option<Value>, ApiError> {
        self.0.delete(&format!("/tasks/{id}/permanent")).await
    }

    pub async fn archive(&self, id: u64) -> Result<Option<Value>, ApiError> {
        self.0.post_empty(&format!("/tasks/{id}/archive")).await
    }

    pub async fn by_status(&self, status: &str) -> Result<Option<Value>, ApiError> {
        self.0.get(&format!("/tasks/status?status={}", encode(status))).await
    }

    pub async fn by_quadrant(&self, quadrant: &str) -> Result<Option<Value>, ApiError> {
        self.0.get(&format!("/tasks/quadrant/{quadrant}")).await
    }
}

pub struct NotebookApi<'a>(&'a ApiClient);

impl NotebookApi<'_> {
    pub async fn all(&self) -> Result<Option<Value>, ApiError> {
        self.0.get("/notebooks").await
    }

    pub async fn one(&self, id: u64) -> Result<Option<Value>, ApiError> {
        self.0.get(&format!("/notebooks/{id}")).await
    }

    pub async fn create(&self, notebook: &Value) -> Result<Option<Value>, ApiError> {
        self.0.post("/notebooks", notebook).await
    }

    pub async fn update(&self, id: u64, notebook: &Value) -> Result<Option<Value>, ApiError> {
        self.0.put(&format!("/notebooks/{id}"), notebook).await
    }

    pub async fn delete(&self, id: u64) -> Result<Option<Value>, ApiError> {
        self.0.delete(&format!("/notebooks/{id}")).await
    }
}

pub struct PageApi<'a>(&'a ApiClient);

impl PageApi<'_> {
    pub async fn one(&self, id: u64) -> Result<Option<Value>, ApiError> {
        self.0.get(&format!("/pages/{id}")).await
    }

    pub async fn create(&self, page: &Value) -> Result<Option<Value>, ApiError> {
        self.0.post("/pages", page).await
    }

    pub async fn update(&self, id: u64, page: &Value) -> Result<Option<Value>, ApiError> {
        self.0.put(&format!("/pages/{id}"), page).await
    }

    pub async fn delete(&self, id: u64) -> Result<Option<Value>, ApiError> {
        self.0.delete(&format!("/pages/{id}")).await
    }

    pub async fn search(&self, query: &str) -> Result<Option<Value>, ApiError> {
        self.0.get(&format!("/pages/search?q={}", encode(query))).await
    }
}
