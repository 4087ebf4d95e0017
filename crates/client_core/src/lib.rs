use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{BookId, OrganizationId, Principal},
    error::{ApiError, ErrorCode},
    protocol::{
        BookPayload, BookQuery, BookRecord, OrganizationPayload, OrganizationQuery,
        OrganizationRecord, Page,
    },
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid api url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("api returned {status}: {error}")]
    Api { status: u16, error: ApiError },
}

impl ClientError {
    pub fn api(status: u16, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            error: ApiError::new(code, message),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport { source, .. } | ClientError::Decode { source, .. } => {
                source.status().map(|status| status.as_u16())
            }
            ClientError::InvalidUrl { .. } => None,
        }
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Operations the admin pages need from the remote API.
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn create_book(&self, payload: &BookPayload) -> Result<BookRecord, ClientError>;
    async fn update_book(
        &self,
        id: &BookId,
        payload: &BookPayload,
    ) -> Result<BookRecord, ClientError>;
    async fn get_books(&self, query: &BookQuery) -> Result<Page<BookRecord>, ClientError>;
    async fn get_book_by_id(&self, id: &BookId) -> Result<BookRecord, ClientError>;
    async fn get_organizations(
        &self,
        query: &OrganizationQuery,
    ) -> Result<Page<OrganizationRecord>, ClientError>;
    async fn create_organization(
        &self,
        payload: &OrganizationPayload,
    ) -> Result<OrganizationRecord, ClientError>;
    async fn update_organization(
        &self,
        id: &OrganizationId,
        payload: &OrganizationPayload,
    ) -> Result<OrganizationRecord, ClientError>;
    async fn current_principal(&self) -> Result<Principal, ClientError>;
}

pub struct AdminClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl AdminClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let parsed = Url::parse(base_url).map_err(|err| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: base_url.to_string(),
                reason: "url cannot be used as a base".to_string(),
            });
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ClientError::Transport {
                endpoint: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: parsed,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "url cannot be used as a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, endpoint = %url, "dispatching admin api request");
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &Url,
        builder: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        decode_response(endpoint, response).await
    }

    async fn get_json<T, Q>(&self, segments: &[&str], query: &Q) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let builder = self.request(Method::GET, url.clone()).query(query);
        self.send(&url, builder).await
    }

    async fn write_json<T, B>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let builder = self.request(method, url.clone()).json(body);
        self.send(&url, builder).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    endpoint: &Url,
    response: Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|source| ClientError::Decode {
                endpoint: endpoint.to_string(),
                source,
            });
    }

    let body = response.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.trim().to_string()
        };
        ApiError::new(ErrorCode::from_status(status.as_u16()), message)
    });
    warn!(endpoint = %endpoint, status = status.as_u16(), code = ?error.code, "admin api rejected request");
    Err(ClientError::Api {
        status: status.as_u16(),
        error,
    })
}

#[async_trait]
impl AdminApi for AdminClient {
    async fn create_book(&self, payload: &BookPayload) -> Result<BookRecord, ClientError> {
        self.write_json(Method::POST, &["books"], payload).await
    }

    async fn update_book(
        &self,
        id: &BookId,
        payload: &BookPayload,
    ) -> Result<BookRecord, ClientError> {
        self.write_json(Method::PUT, &["books", id.as_str()], payload)
            .await
    }

    async fn get_books(&self, query: &BookQuery) -> Result<Page<BookRecord>, ClientError> {
        self.get_json(&["books"], query).await
    }

    async fn get_book_by_id(&self, id: &BookId) -> Result<BookRecord, ClientError> {
        self.get_json(&["books", id.as_str()], &[("include", "organization")])
            .await
    }

    async fn get_organizations(
        &self,
        query: &OrganizationQuery,
    ) -> Result<Page<OrganizationRecord>, ClientError> {
        self.get_json(&["organizations"], query).await
    }

    async fn create_organization(
        &self,
        payload: &OrganizationPayload,
    ) -> Result<OrganizationRecord, ClientError> {
        self.write_json(Method::POST, &["organizations"], payload)
            .await
    }

    async fn update_organization(
        &self,
        id: &OrganizationId,
        payload: &OrganizationPayload,
    ) -> Result<OrganizationRecord, ClientError> {
        self.write_json(Method::PUT, &["organizations", id.as_str()], payload)
            .await
    }

    async fn current_principal(&self) -> Result<Principal, ClientError> {
        let url = self.endpoint(&["session"])?;
        let builder = self.request(Method::GET, url.clone());
        self.send(&url, builder).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
