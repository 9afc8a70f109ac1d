//! Agency connections
//!
//! Two calls are needed from every agent:
//! - `GET /_api/agency/config` returns the agent's own ID, the leader it
//!   believes in and its commit index,
//! - `POST /_api/agency/read` returns a sub-tree of the store (leader only).

use crate::common::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const AGENCY_CONFIG_PATH: &str = "/_api/agency/config";
pub const AGENCY_READ_PATH: &str = "/_api/agency/read";

/// Agent name -> connection
pub type AgentConnections = BTreeMap<String, Arc<dyn AgencyConnection>>;

/// Path into the agency tree, one segment per level
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgencyKey(Vec<String>);

impl AgencyKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(segments.into_iter().map(|s| s.as_ref().to_string()).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for AgencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Keys fetched together in a single read transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadRequest(Vec<AgencyKey>);

impl ReadRequest {
    pub fn new(keys: Vec<AgencyKey>) -> Self {
        Self(keys)
    }

    pub fn keys(&self) -> &[AgencyKey] {
        &self.0
    }

    pub fn paths(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl Serialize for ReadRequest {
    /// `[["/a/b", "/a/c"]]`: one transaction listing every path
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        [self.paths()].serialize(serializer)
    }
}

/// Local configuration reported by one agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Leader this agent believes in; empty while it knows none
    #[serde(default)]
    pub leader_id: String,

    #[serde(default)]
    pub commit_index: u64,

    #[serde(default)]
    pub configuration: AgentConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfiguration {
    /// The agent's own ID
    #[serde(rename = "id", default)]
    pub id: String,
}

/// Connection to a single agent
#[async_trait]
pub trait AgencyConnection: Send + Sync {
    /// Endpoint used for diagnostics
    fn endpoint(&self) -> &str;

    /// Probe the agent's local config
    async fn config(&self) -> Result<AgentConfig>;

    /// Run a read transaction, returning the raw response body
    async fn read(&self, request: &ReadRequest) -> Result<Bytes>;
}

/// Decode a read response, which must be an array of exactly one element
pub fn decode_read_response<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let mut roots: Vec<T> = serde_json::from_slice(body)?;
    if roots.len() != 1 {
        return Err(Error::MalformedResponse(format!(
            "expected 1 element in read response, got {}",
            roots.len()
        )));
    }
    roots
        .pop()
        .ok_or_else(|| Error::Internal("read response vanished".into()))
}

/// Agency connection over HTTP
#[derive(Clone)]
pub struct HttpAgencyConnection {
    endpoint: String,
    client: reqwest::Client,
    jwt: Option<String>,
}

impl HttpAgencyConnection {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, reqwest::Client::new())
    }

    pub fn with_client(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            jwt: None,
        }
    }

    /// Send `Authorization: bearer <token>` with every request
    pub fn with_jwt(mut self, token: impl Into<String>) -> Self {
        self.jwt = Some(token.into());
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.jwt {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn expect_ok(&self, response: reqwest::Response) -> Result<Bytes> {
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::UnexpectedStatus {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl AgencyConnection for HttpAgencyConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn config(&self) -> Result<AgentConfig> {
        let url = format!("{}{}", self.endpoint, AGENCY_CONFIG_PATH);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let body = self.expect_ok(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn read(&self, request: &ReadRequest) -> Result<Bytes> {
        let url = format!("{}{}", self.endpoint, AGENCY_READ_PATH);
        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await?;
        self.expect_ok(response).await
    }
}

/// Build HTTP connections for `name -> endpoint` pairs
pub fn http_connections<'a, I>(agents: I, jwt: Option<&str>) -> AgentConnections
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let client = reqwest::Client::new();
    agents
        .into_iter()
        .map(|(name, endpoint)| {
            let mut conn = HttpAgencyConnection::with_client(endpoint.clone(), client.clone());
            if let Some(token) = jwt {
                conn = conn.with_jwt(token);
            }
            (name.clone(), Arc::new(conn) as Arc<dyn AgencyConnection>)
        })
        .collect()
}
