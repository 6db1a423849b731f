//! Common utilities for the vSphere API client
//!
//! Provides the session-authenticated HTTP wrapper shared by all API calls.

use crate::error::VSphereError;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use tracing::debug;

/// Header carrying the vSphere API session token
pub const SESSION_HEADER: &str = "vmware-api-session-id";

/// HTTP client wrapper with session authentication
pub struct HttpClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    session: RwLock<Option<String>>,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, username: String, password: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            session: RwLock::new(None),
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn session_token(&self) -> Option<String> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    /// Create a new API session with basic auth and remember its token
    pub async fn login(&self) -> Result<(), VSphereError> {
        let url = self.build_url("/api/session");
        debug!("Creating vSphere API session at {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(VSphereError::Http)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(VSphereError::Authentication(format!("{} - {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VSphereError::Api(format!(
                "Failed to create session: {} - {}",
                status, body
            )));
        }

        let token: String = response.json().await.map_err(VSphereError::Http)?;
        if let Ok(mut session) = self.session.write() {
            *session = Some(token);
        }
        debug!("vSphere API session established");
        Ok(())
    }

    async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, VSphereError> {
        if self.session_token().is_none() {
            self.login().await?;
        }
        let token = self
            .session_token()
            .ok_or_else(|| VSphereError::Authentication("no session token".to_string()))?;

        Ok(self
            .client
            .request(method, self.build_url(path))
            .header(SESSION_HEADER, token)
            .header("Accept", "application/json"))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, VSphereError> {
        match body {
            Some(b) => debug!(
                "{} {} with body: {}",
                method,
                path,
                serde_json::to_string_pretty(b).unwrap_or_default()
            ),
            None => debug!("{} {}", method, path),
        }

        let mut request = self.authorized(method.clone(), path).await?;
        if let Some(b) = body {
            request = request.header("Content-Type", "application/json").json(b);
        }
        let response = request.send().await.map_err(VSphereError::Http)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let text = response.text().await.unwrap_or_default();
            return Err(VSphereError::NotFound(format!("{} - {}", path, text)));
        }
        if status == StatusCode::UNAUTHORIZED {
            // Session expired; drop it so the next call logs in again
            if let Ok(mut session) = self.session.write() {
                *session = None;
            }
            let text = response.text().await.unwrap_or_default();
            return Err(VSphereError::Authentication(format!("{} - {}", status, text)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VSphereError::Api(format!(
                "{} {} failed: {} - {}",
                method, path, status, text
            )));
        }
        Ok(response)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, VSphereError> {
        let response = self.send(Method::GET, path, None).await?;
        let text = response.text().await.map_err(VSphereError::Http)?;
        serde_json::from_str(&text).map_err(|e| {
            VSphereError::Api(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    /// Make a POST request and decode the response
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, VSphereError> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        response.json().await.map_err(VSphereError::Http)
    }

    /// Make a POST request whose response body is ignored
    pub async fn post_empty(&self, path: &str, body: &serde_json::Value) -> Result<(), VSphereError> {
        self.send(Method::POST, path, Some(body)).await?;
        Ok(())
    }

    /// Make a PATCH request
    pub async fn patch(&self, path: &str, body: &serde_json::Value) -> Result<(), VSphereError> {
        self.send(Method::PATCH, path, Some(body)).await?;
        Ok(())
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), VSphereError> {
        self.send(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Build query string from filters
    pub fn build_query_string(&self, filters: &[(&str, &str)]) -> String {
        filters
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}
