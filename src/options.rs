use std::time::Duration;

use secrecy::{ExposeSecret as _, SecretString};

use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://sequencer.heurist.xyz";

pub const API_KEY_ENV: &str = "HEURIST_API_KEY";
pub const BASE_URL_ENV: &str = "HEURIST_BASE_URL";
pub const WORKFLOW_URL_ENV: &str = "HEURIST_WORKFLOW_URL";

/// Settings a [crate::Client] is built from
///
/// Precedence is explicit value, then environment (only when one of the
/// `with_env_fallback*` methods is used), then the built-in default.
#[derive(Debug, Default)]
pub struct ClientOptions {
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub workflow_url: Option<String>,
    /// Whole-request deadline. Unset means no deadline, as with a bare `reqwest::Client`.
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options read entirely from `HEURIST_API_KEY`, `HEURIST_BASE_URL` and `HEURIST_WORKFLOW_URL`
    pub fn from_env() -> Self {
        Self::new().with_env_fallback()
    }

    pub fn api_key(mut self, key: impl Into<SecretString>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn workflow_url(mut self, url: impl Into<String>) -> Self {
        self.workflow_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fills every unset (or blank) field from the process environment
    pub fn with_env_fallback(self) -> Self {
        self.with_env_fallback_from(|name| std::env::var(name).ok())
    }

    /// Same as [Self::with_env_fallback] with a custom variable lookup
    pub fn with_env_fallback_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).and_then(non_blank);

        if self.api_key.as_ref().is_none_or(|k| k.expose_secret().trim().is_empty()) {
            self.api_key = read(API_KEY_ENV).map(Into::into);
        }
        if self.base_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
            self.base_url = read(BASE_URL_ENV);
        }
        if self.workflow_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
            self.workflow_url = read(WORKFLOW_URL_ENV);
        }
        self
    }

    pub(crate) fn resolve(self) -> Result<Resolved> {
        let api_key = self
            .api_key
            .and_then(|k| non_blank(k.expose_secret().to_owned()))
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "the {API_KEY_ENV} environment variable is missing or empty; either set it, \
                     or pass an api key with `ClientOptions::api_key`"
                ))
            })?;

        Ok(Resolved {
            api_key: api_key.into(),
            base_url: self
                .base_url
                .and_then(non_blank)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            workflow_url: self.workflow_url.and_then(non_blank),
            timeout: self.timeout,
        })
    }
}

pub(crate) struct Resolved {
    pub(crate) api_key: SecretString,
    pub(crate) base_url: String,
    pub(crate) workflow_url: Option<String>,
    pub(crate) timeout: Option<Duration>,
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
