use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use fleet_shared::{
    application::Application, device::Device, query::DeviceQuery, response::ODataResponse,
    service::Service,
};

use crate::{config::Config, retry_async};

pub const API_VERSION: &str = "v6";

/// Lengths of the two full device UUID forms; anything shorter is a prefix.
const FULL_UUID_LENGTHS: [usize; 2] = [32, 62];

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("More than one device matches {uuid} ({count} devices)")]
    AmbiguousDevice { uuid: String, count: usize },

    #[error("Request to {url} failed with {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
}

/// Read-by-id access to the cloud data model.
///
/// This is what the identity resolver consumes; transport, auth and paging
/// stay behind it.
#[async_trait]
pub trait DataApi: Send + Sync {
    /// One device, shaped by `query`. Unknown UUIDs are an error.
    async fn get_device(&self, uuid: &str, query: &DeviceQuery) -> Result<Device>;

    /// One service projected onto `select`, `None` if no such record exists.
    async fn get_service(&self, service_id: u64, select: &[&str]) -> Result<Option<Service>>;
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    username: String,
}

#[derive(Debug, Serialize)]
pub struct TrackEvent {
    pub event: String,
    pub properties: TrackProperties,
}

#[derive(Debug, Serialize)]
pub struct TrackProperties {
    pub distinct_id: Option<String>,
    pub version: String,
    pub arch: String,
    pub platform: String,
    pub api_host: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    api_url: String,
    token: Option<String>,
    client: Client,
}

impl ApiClient {
    pub fn new(
        api_url: &str,
        token: Option<String>,
        trust_invalid_server_cert: bool,
    ) -> Result<Self> {
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            client: get_client(trust_invalid_server_cert)?,
        })
    }

    pub fn from_config(config: &Config, token: Option<String>) -> Result<Self> {
        Self::new(&config.api_url, token, config.trust_invalid_server_cert)
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{}/{}/{}", self.api_url, API_VERSION, resource)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read_collection<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(String, String)],
    ) -> Result<Vec<T>> {
        let url = self.resource_url(resource);
        debug!("GET {} {:?}", url, params);
        let res = self
            .request(Method::GET, &url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;
        let body: ODataResponse<T> = check_status(res, &url).await?.json().await?;
        Ok(body.d)
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let url = self.resource_url("device");
        let params = [("$orderby", "device_name asc")];
        let res = retry_async!(
            3,
            1,
            self.request(Method::GET, &url).query(&params).send()
        )?;
        let body: ODataResponse<Device> = check_status(res, &url).await?.json().await?;
        Ok(body.d)
    }

    pub async fn list_applications(&self) -> Result<Vec<Application>> {
        let url = self.resource_url("application");
        let params = [("$orderby", "app_name asc")];
        let res = retry_async!(
            3,
            1,
            self.request(Method::GET, &url).query(&params).send()
        )?;
        let body: ODataResponse<Application> = check_status(res, &url).await?.json().await?;
        Ok(body.d)
    }

    /// Username behind the current token, `None` when logged out or the
    /// token is rejected.
    pub async fn whoami(&self) -> Result<Option<String>> {
        if self.token.is_none() {
            return Ok(None);
        }
        let url = format!("{}/user/v1/whoami", self.api_url);
        let res = self.request(Method::GET, &url).send().await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let whoami: WhoamiResponse = check_status(res, &url).await?.json().await?;
        Ok(Some(whoami.username))
    }

    pub async fn track(&self, event: &TrackEvent) -> Result<()> {
        let url = format!("{}/analytics/track", self.api_url);
        let res = self.request(Method::POST, &url).json(event).send().await?;
        check_status(res, &url).await?;
        Ok(())
    }
}

#[async_trait]
impl DataApi for ApiClient {
    async fn get_device(&self, uuid: &str, query: &DeviceQuery) -> Result<Device> {
        // an empty prefix would match every device on the account
        if uuid.trim().is_empty() {
            return Err(ApiError::DeviceNotFound(uuid.to_string()).into());
        }
        let mut params = vec![("$filter".to_string(), uuid_filter(uuid))];
        params.extend(query.to_params());

        let mut devices: Vec<Device> = self.read_collection("device", &params).await?;
        match devices.len() {
            0 => Err(ApiError::DeviceNotFound(uuid.to_string()).into()),
            1 => Ok(devices.remove(0)),
            count => Err(ApiError::AmbiguousDevice {
                uuid: uuid.to_string(),
                count,
            }
            .into()),
        }
    }

    async fn get_service(&self, service_id: u64, select: &[&str]) -> Result<Option<Service>> {
        let mut params = vec![("$filter".to_string(), format!("id eq {}", service_id))];
        if !select.is_empty() {
            params.push(("$select".to_string(), select.join(",")));
        }
        match self.read_collection::<Service>("service", &params).await {
            Ok(services) => Ok(services.into_iter().next()),
            Err(e) => match e.downcast_ref::<ApiError>() {
                Some(ApiError::Status { status, .. }) if *status == StatusCode::NOT_FOUND => {
                    Ok(None)
                }
                _ => Err(e),
            },
        }
    }
}

/// `$filter` selecting a device by full UUID or by UUID prefix.
fn uuid_filter(uuid: &str) -> String {
    let quoted = quote_literal(uuid);
    if FULL_UUID_LENGTHS.contains(&uuid.len()) {
        format!("uuid eq {}", quoted)
    } else {
        format!("startswith(uuid,{})", quoted)
    }
}

/// OData string literal: single quotes around, embedded quotes doubled.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

async fn check_status(res: Response, url: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(anyhow!(ApiError::Status {
        url: url.to_string(),
        status,
        body,
    }))
}

fn get_client(trust_invalid_server_cert: bool) -> Result<Client> {
    // local and staging deployments run with self-signed certificates
    if trust_invalid_server_cert {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(client)
    } else {
        let client = Client::new();
        Ok(client)
    }
}
