use std::{fmt::Write as _, sync::Arc};

use futures::FutureExt as _;
use reqwest::Method;
use secrecy::{ExposeSecret as _, SecretString};
use serde::de::DeserializeOwned;

use crate::{ClientOptions, Error, Images, Result, SmartGen, Workflow};

/// The remote service a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Service {
    /// The job sequencer at `base_url`
    Sequencer,
    /// `workflow_url` when configured, the sequencer otherwise
    Workflow,
}

pub(crate) struct Route<T> {
    client: Client,
    kind: T,
}

impl<T> Route<T> {
    pub(crate) fn new(client: &Client, kind: T) -> Self {
        Self {
            client: client.clone(),
            kind,
        }
    }
}

impl<T: Request> IntoFuture for Route<T> {
    type Output = Result<T::Model>;
    type IntoFuture = futures::future::BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move {
            let url = self.to_string();
            let mut request = self.client.inner.reqwest.request(T::METHOD, &url);

            if T::AUTHORIZED {
                request = request.bearer_auth(self.client.inner.key.expose_secret());
            }

            if let Some(body) = self.kind.body() {
                request = request.json(&body);
            };

            let method = T::METHOD;
            tracing::debug!(%method, %url, "sending request");

            let response = request.send().await?;
            let status = response.status();
            let raw = response.text().await?;

            if !status.is_success() {
                tracing::warn!(%url, %status, "request rejected");
                return Err(Error::Api { status, body: raw });
            }

            T::parse(&raw)
        }
        .boxed()
    }
}

impl<T: Request> std::fmt::Display for Route<T> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.write_str(self.client.inner.service_url(T::SERVICE).trim_end_matches('/'))?;
        fmt.write_char('/')?;
        self.kind.format_uri(fmt)
    }
}

/// Handle to the Heurist API
///
/// Cloning is cheap, clones share the same connection pool and configuration.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Builds a client from explicit options. The environment is not consulted,
    /// see [ClientOptions::with_env_fallback] for that.
    pub fn new(options: ClientOptions) -> Result<Self> {
        Ok(Self {
            inner: ClientInner::new(options)?,
        })
    }

    /// Builds a client purely from `HEURIST_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientOptions::from_env())
    }

    pub fn images(&self) -> Images {
        Images::new(self)
    }

    pub fn smartgen(&self) -> SmartGen {
        SmartGen::new(self)
    }

    pub fn workflow(&self) -> Workflow {
        Workflow::new(self)
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn workflow_url(&self) -> Option<&str> {
        self.inner.workflow_url.as_deref()
    }

    pub(crate) fn api_key(&self) -> &str {
        self.inner.key.expose_secret()
    }
}

struct ClientInner {
    reqwest: reqwest::Client,
    key: SecretString,
    base_url: Box<str>,
    workflow_url: Option<Box<str>>,
}

impl ClientInner {
    fn new(options: ClientOptions) -> Result<Arc<Self>> {
        let resolved = options.resolve()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = resolved.timeout {
            builder = builder.timeout(timeout);
        }
        let reqwest = builder
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build http client: {e}")))?;

        Ok(Self {
            reqwest,
            key: resolved.api_key,
            base_url: resolved.base_url.into(),
            workflow_url: resolved.workflow_url.map(Into::into),
        }
        .into())
    }

    fn service_url(&self, service: Service) -> &str {
        match service {
            Service::Sequencer => &self.base_url,
            Service::Workflow => self.workflow_url.as_deref().unwrap_or(&self.base_url),
        }
    }
}

/// One endpoint of the API: where it lives, what it sends and how its answer decodes
pub(crate) trait Request: Send + Sized + 'static {
    type Model: Send + 'static;
    type Body: serde::ser::Serialize;

    const METHOD: Method = Method::POST;
    const SERVICE: Service = Service::Sequencer;
    /// Whether the bearer header is attached. Workflow calls carry the key in the body instead.
    const AUTHORIZED: bool = true;

    fn format_uri(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result;

    fn body(&self) -> Option<Self::Body> {
        None
    }

    fn parse(raw: &str) -> Result<Self::Model>;
}

pub(crate) fn decode<M: DeserializeOwned>(raw: &str) -> Result<M> {
    serde_json::from_str(raw).map_err(Into::into)
}
