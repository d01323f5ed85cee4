//! OpenStack Compute (Nova) client.
//!
//! Speaks the Compute v2.1 API:
//! - `POST /servers` to launch
//! - `GET /servers/{id}` to read status
//! - `DELETE /servers/{id}` to delete
//!
//! Authentication is a pre-issued token sent as `X-Auth-Token`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{BackendError, ComputeBackend, CreateInstanceRequest};
use crate::model::{Instance, InstanceStatus};

/// Connection settings for [`NovaClient`].
#[derive(Debug, Clone)]
pub struct NovaConfig {
    /// Compute endpoint, e.g. `https://compute.example.com/v2.1`.
    pub endpoint: String,

    pub auth_token: String,

    pub request_timeout: Duration,
}

/// Compute API client.
pub struct NovaClient {
    client: reqwest::Client,
    endpoint: String,
    auth_token: String,
}

impl NovaClient {
    /// Create a new compute client.
    pub fn new(config: &NovaConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn server_url(&self, instance_id: &str) -> String {
        format!("{}/servers/{}", self.endpoint, instance_id)
    }

    async fn check(
        response: reqwest::Response,
        instance_id: Option<&str>,
        action: &str,
    ) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = instance_id {
                debug!(instance_id = id, action, "Instance not found");
                return Err(BackendError::NotFound(id.to_string()));
            }
        }

        error!(status = %status, body = %body, action, "Compute API request failed");
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message: fault_message(&body),
        })
    }
}

fn transport(e: reqwest::Error) -> BackendError {
    BackendError::Transport(e.to_string())
}

fn decode(e: reqwest::Error) -> BackendError {
    BackendError::Decode(e.to_string())
}

/// Extracts the message from a Nova fault body such as
/// `{"badRequest": {"code": 400, "message": "..."}}`.
fn fault_message(body: &str) -> String {
    serde_json::from_str::<BTreeMap<String, Fault>>(body)
        .ok()
        .and_then(|faults| faults.into_values().next())
        .map(|fault| fault.message)
        .unwrap_or_else(|| body.to_string())
}

#[derive(Debug, Deserialize)]
struct Fault {
    message: String,
}

#[derive(Debug, Serialize)]
struct CreateServerRequest<'a> {
    server: ServerSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerSpec<'a> {
    name: &'a str,
    #[serde(rename = "imageRef")]
    image_ref: &'a str,
    #[serde(rename = "flavorRef")]
    flavor_ref: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    networks: Vec<NetworkRef<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    security_groups: Vec<SecurityGroupRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<String>,
    metadata: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NetworkRef<'a> {
    uuid: &'a str,
}

#[derive(Debug, Serialize)]
struct SecurityGroupRef<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: ServerBody,
}

#[derive(Debug, Deserialize)]
struct ServerBody {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl ComputeBackend for NovaClient {
    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<Instance, BackendError> {
        let url = format!("{}/servers", self.endpoint);
        debug!(url = %url, flavor = %request.flavor, "Creating server");

        let body = CreateServerRequest {
            server: ServerSpec {
                name: &request.name,
                image_ref: &request.image_id,
                flavor_ref: &request.flavor,
                networks: request
                    .networks
                    .iter()
                    .map(|uuid| NetworkRef { uuid })
                    .collect(),
                security_groups: request
                    .security_groups
                    .iter()
                    .map(|name| SecurityGroupRef { name })
                    .collect(),
                user_data: request
                    .user_data
                    .as_deref()
                    .map(|data| base64::engine::general_purpose::STANDARD.encode(data)),
                metadata: &request.metadata,
                key_name: request.key_pair.as_deref(),
            },
        };

        let response = self
            .client
            .post(&url)
            .header("X-Auth-Token", &self.auth_token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response, None, "create").await?;
        let created: ServerEnvelope = response.json().await.map_err(decode)?;

        debug!(instance_id = %created.server.id, "Server accepted");

        Ok(Instance {
            instance_id: created.server.id,
            name: request.name.clone(),
            offering: request.flavor.clone(),
            image_id: request.image_id.clone(),
            metadata: request.metadata.clone(),
            user_data: request.user_data.clone(),
            status: created
                .server
                .status
                .as_deref()
                .map(InstanceStatus::parse)
                .unwrap_or(InstanceStatus::Build),
            created_at: Utc::now(),
        })
    }

    async fn get_instance_status(&self, instance_id: &str) -> Result<InstanceStatus, BackendError> {
        let url = self.server_url(instance_id);
        debug!(url = %url, "Fetching server status");

        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.auth_token)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response, Some(instance_id), "get").await?;
        let server: ServerEnvelope = response.json().await.map_err(decode)?;

        let status = server
            .server
            .status
            .ok_or_else(|| BackendError::Decode(format!("server {instance_id} has no status")))?;
        Ok(InstanceStatus::parse(&status))
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), BackendError> {
        let url = self.server_url(instance_id);
        debug!(url = %url, "Deleting server");

        let response = self
            .client
            .delete(&url)
            .header("X-Auth-Token", &self.auth_token)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response, Some(instance_id), "delete").await?;
        Ok(())
    }
}
