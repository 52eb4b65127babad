use std::collections::HashMap;
use std::pin::Pin;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use fleetos_shared::{
    device::{Device, Service},
    os::RemoteOsVersion,
};
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, StatusCode, header::CONTENT_TYPE};
use tracing::{debug, warn};

use crate::config::Config;
use crate::os::{
    CatalogSource, ImageEvent, ImageStore, ImageStream, OsError, ProgressState, TransferOptions,
};
use crate::session::DirectoryApi;

/// Response header carrying the version the image store picked for the request.
pub const RESOLVED_VERSION_HEADER: &str = "x-os-version";

/// Thin client for the fleetos REST API.
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

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api_url,
            config.api_token.clone(),
            config.trust_invalid_server_cert,
        )
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let req = self.client.get(format!("{}{}", self.api_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl CatalogSource for ApiClient {
    async fn available_os_versions(
        &self,
        device_types: &[String],
    ) -> Result<HashMap<String, Vec<RemoteOsVersion>>, OsError> {
        let res = self
            .get("/v1/os/versions")
            .query(&[("deviceType", device_types.join(","))])
            .send()
            .await
            .map_err(|e| OsError::Catalog(e.to_string()))?;

        // unknown device types are reported as an empty catalog
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(HashMap::new());
        }
        match res.error_for_status() {
            Ok(r) => r.json().await.map_err(|e| OsError::Catalog(e.to_string())),
            Err(e) => Err(OsError::Catalog(e.to_string())),
        }
    }
}

#[async_trait]
impl ImageStore for ApiClient {
    async fn open(
        &self,
        device_type: &str,
        version: &str,
        options: &TransferOptions,
    ) -> Result<Box<dyn ImageStream>, OsError> {
        let res = self
            .get("/v1/os/download")
            .query(&[
                ("deviceType", device_type),
                ("version", version),
                ("flushMode", options.flush_mode.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OsError::StreamOpen(e.to_string()))?
            .error_for_status()
            .map_err(|e| OsError::StreamOpen(e.to_string()))?;

        let mime = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string());
        let resolved = match res
            .headers()
            .get(RESOLVED_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(v) => v.to_string(),
            None => {
                warn!(
                    "image store did not report a resolved version, assuming {}",
                    version
                );
                version.to_string()
            }
        };
        let total = res.content_length();
        debug!(
            "opened image stream: version={} mime={:?} size={:?}",
            resolved, mime, total
        );

        Ok(Box::new(HttpImageStream {
            mime,
            resolved: Some(resolved),
            total,
            received: 0,
            pending: None,
            body: Box::pin(res.bytes_stream()),
        }))
    }
}

struct HttpImageStream {
    mime: Option<String>,
    resolved: Option<String>,
    total: Option<u64>,
    received: u64,
    pending: Option<Bytes>,
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
}

#[async_trait]
impl ImageStream for HttpImageStream {
    fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    async fn next_event(&mut self) -> Result<ImageEvent, OsError> {
        if let Some(version) = self.resolved.take() {
            return Ok(ImageEvent::ResolvedVersion(version));
        }
        if let Some(chunk) = self.pending.take() {
            return Ok(ImageEvent::Data(chunk));
        }
        match self.body.next().await {
            Some(Ok(chunk)) => {
                self.received += chunk.len() as u64;
                self.pending = Some(chunk);
                Ok(ImageEvent::Progress(self.total.map(|total| {
                    ProgressState {
                        received: self.received,
                        total: Some(total),
                    }
                })))
            }
            Some(Err(e)) => Err(OsError::Transfer(e.to_string())),
            None => match self.total {
                Some(total) if self.received < total => Err(OsError::Transfer(format!(
                    "connection closed after {} of {} bytes",
                    self.received, total
                ))),
                _ => Ok(ImageEvent::End),
            },
        }
    }
}

#[async_trait]
impl DirectoryApi for ApiClient {
    async fn device_by_uuid(&self, uuid: &str) -> Result<Device> {
        let res = self
            .get(&format!("/v1/devices/{}", uuid))
            .send()
            .await
            .context("Failed to reach the API")?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(anyhow!("Device '{}' not found", uuid));
        }
        match res.error_for_status() {
            Ok(r) => Ok(r.json().await?),
            Err(e) => Err(anyhow!(e)),
        }
    }

    async fn service_by_id(&self, service_id: u64) -> Result<Service> {
        let res = self
            .get(&format!("/v1/services/{}", service_id))
            .send()
            .await
            .context("Failed to reach the API")?;
        match res.error_for_status() {
            Ok(r) => Ok(r.json().await?),
            Err(e) => Err(anyhow!(e)),
        }
    }
}

fn get_client(trust_invalid_server_cert: bool) -> Result<Client> {
    // if its localhost we accept invalid certificates
    if trust_invalid_server_cert {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(client)
    } else {
        // otherwise we verify the certificate
        let client = Client::new();
        Ok(client)
    }
}
