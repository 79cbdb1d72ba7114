//! Collection service HTTP client
//!
//! Wraps `reqwest::Client` with the base URL, request timeout and
//! `User-Agent` from the `upload` configuration section.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use uplog_http::client::CollectClient;
//! use std::time::Duration;
//!
//! # fn example() -> anyhow::Result<()> {
//! let client = CollectClient::new("https://collect.example.com", Duration::from_secs(30), "uplog/0.1")?;
//! let request = client.request(reqwest::Method::POST, "/apiv1/bbox");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use uplog_core::config::UploadConfig;

/// HTTP client bound to one collection service
#[derive(Debug, Clone)]
pub struct CollectClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
}

impl CollectClient {
    /// Creates a client for `base_url`
    ///
    /// # Arguments
    /// * `base_url` - Service root, e.g. `https://collect.example.com`
    /// * `timeout` - Per-request timeout, covering connect and body upload
    /// * `user_agent` - Value of the `User-Agent` header
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Creates a client from the `upload` configuration section
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )
    }

    /// Service root this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of `path`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Creates a request builder for `path`, relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }
}
