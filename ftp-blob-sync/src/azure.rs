#![doc = "Azure Blob Storage sink: implements the core `ObjectSink` contract over the Blob REST API with Shared Key authorization."]
//
//! # Azure Blob Sink
//!
//! [`AzureBlobSink`] is the production [`ObjectSink`] used by the CLI. It speaks the
//! Blob service REST API directly through `reqwest`:
//!
//! - `ensure_container`: `PUT /{container}?restype=container`
//! - `get_object_metadata`: `HEAD /{container}/{blob}`, reading `Content-MD5`
//! - `put_object`: `PUT /{container}/{blob}` as a block blob, with
//!   `x-ms-blob-content-md5` set so the stored fingerprint is always the content MD5
//!
//! Requests are signed with the account key (Shared Key scheme). A key that is not
//! valid base64 is rejected when the sink is constructed, before any request.
//!
//! The endpoint defaults to `https://<account>.blob.core.windows.net`; pass an
//! explicit endpoint (path style, e.g. `http://127.0.0.1:10000/devstoreaccount1`)
//! to target an emulator.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode, Url};
use sha2::Sha256;

use ftp_blob_sync_core::config::{PublicAccess, SinkConfig};
use ftp_blob_sync_core::contract::{ContainerStatus, ObjectMetadata, ObjectSink};
use ftp_blob_sync_core::error::SinkError;
use ftp_blob_sync_core::fingerprint::ContentFingerprint;

pub const API_VERSION: &str = "2021-08-06";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const ERROR_CODE_HEADER: &str = "x-ms-error-code";

type HmacSha256 = Hmac<Sha256>;

pub struct AzureBlobSink {
    client: Client,
    account: String,
    key: Vec<u8>,
    endpoint: Url,
    public_access: Option<PublicAccess>,
}

impl AzureBlobSink {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let key = BASE64.decode(config.account_key.trim()).map_err(|e| {
            tracing::error!(error = %e, account = %config.account_name, "Storage account key is not valid base64");
            SinkError::Credentials(format!("storage account key is not valid base64: {e}"))
        })?;

        let endpoint = match &config.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{}.blob.core.windows.net", config.account_name),
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| SinkError::Endpoint(format!("{endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(SinkError::Endpoint(format!("{endpoint}: not a base URL")));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        tracing::info!(
            account = %config.account_name,
            endpoint = %endpoint,
            "Initialised Azure Blob Storage client"
        );
        Ok(Self {
            client,
            account: config.account_name.clone(),
            key,
            endpoint,
            public_access: config.public_access,
        })
    }

    fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/'));
            }
        }
        url
    }

    /// Sign and send one request. `ms_headers` are the `x-ms-*` headers beyond
    /// date and version.
    async fn send(
        &self,
        method: Method,
        url: Url,
        ms_headers: Vec<(&'static str, String)>,
        body: Option<Vec<u8>>,
    ) -> Result<Response, SinkError> {
        let mut headers: Vec<(&'static str, String)> = vec![
            (
                "x-ms-date",
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ),
            ("x-ms-version", API_VERSION.to_string()),
        ];
        headers.extend(ms_headers);

        let content_length = body.as_ref().map_or(0, Vec::len);
        let to_sign = string_to_sign(&method, &url, &self.account, content_length, &headers);
        let signature = sign(&self.key, &to_sign)?;

        let mut request = self.client.request(method.clone(), url.clone()).header(
            "Authorization",
            format!("SharedKey {}:{}", self.account, signature),
        );
        for (name, value) in &headers {
            request = request.header(*name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        request.send().await.map_err(|e| {
            tracing::error!(error = ?e, %method, url = %url, "Storage request failed");
            SinkError::Transport(e.to_string())
        })
    }
}

/// Shared Key string-to-sign for the Blob service.
pub fn string_to_sign(
    method: &Method,
    url: &Url,
    account: &str,
    content_length: usize,
    ms_headers: &[(&str, String)],
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    // VERB, Content-Encoding, Content-Language, Content-Length, Content-MD5,
    // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
    // If-Unmodified-Since, Range
    let fields = [
        method.as_str(),
        "",
        "",
        length.as_str(),
        "",
        "",
        "",
        "",
        "",
        "",
        "",
        "",
    ];
    let mut out = fields.join("\n");
    out.push('\n');

    let mut canonical_headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .filter(|(name, _)| name.starts_with("x-ms-"))
        .collect();
    canonical_headers.sort();
    for (name, value) in canonical_headers {
        out.push_str(&name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }

    out.push('/');
    out.push_str(account);
    out.push_str(url.path());

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
        .collect();
    query.sort();
    for (name, value) in query {
        out.push('\n');
        out.push_str(&name);
        out.push(':');
        out.push_str(&value);
    }
    out
}

fn sign(key: &[u8], to_sign: &str) -> Result<String, SinkError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SinkError::Credentials(format!("unusable account key: {e}")))?;
    mac.update(to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn error_code(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn status_error(response: &Response) -> SinkError {
    SinkError::Status {
        status: response.status().as_u16(),
        code: error_code(response.headers()),
    }
}

#[async_trait]
impl ObjectSink for AzureBlobSink {
    async fn ensure_container(&self, container: &str) -> Result<ContainerStatus, SinkError> {
        tracing::info!(container, "Creating container");
        let mut url = self.url_for(&[container]);
        url.query_pairs_mut().append_pair("restype", "container");

        let mut ms_headers = Vec::new();
        if let Some(access) = self.public_access {
            ms_headers.push(("x-ms-blob-public-access", access.as_str().to_string()));
        }

        let response = self
            .send(Method::PUT, url, ms_headers, Some(Vec::new()))
            .await?;
        match response.status() {
            StatusCode::CREATED => Ok(ContainerStatus::Created),
            StatusCode::CONFLICT
                if error_code(response.headers()).as_deref() == Some("ContainerAlreadyExists") =>
            {
                Ok(ContainerStatus::AlreadyExists)
            }
            _ => {
                let err = status_error(&response);
                tracing::error!(container, error = %err, "Can't create container");
                Err(err)
            }
        }
    }

    async fn get_object_metadata(
        &self,
        container: &str,
        object: &str,
    ) -> Result<Option<ObjectMetadata>, SinkError> {
        let url = self.url_for(&[container, object]);
        let response = self.send(Method::HEAD, url, Vec::new(), None).await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::debug!(container, object, "Blob not found");
                Ok(None)
            }
            status if status.is_success() => {
                let headers = response.headers();
                let content_md5 = headers
                    .get("content-md5")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let content_length = headers
                    .get("content-length")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Ok(Some(ObjectMetadata {
                    content_md5,
                    content_length,
                }))
            }
            _ => Err(status_error(&response)),
        }
    }

    async fn put_object(
        &self,
        container: &str,
        object: &str,
        bytes: Vec<u8>,
    ) -> Result<(), SinkError> {
        let fingerprint = ContentFingerprint::of(&bytes);
        tracing::info!(container, object, bytes = bytes.len(), %fingerprint, "Uploading blob");

        let url = self.url_for(&[container, object]);
        let ms_headers = vec![
            ("x-ms-blob-content-md5", fingerprint.to_base64()),
            ("x-ms-blob-type", "BlockBlob".to_string()),
        ];
        let response = self.send(Method::PUT, url, ms_headers, Some(bytes)).await?;

        if response.status() == StatusCode::CREATED {
            Ok(())
        } else {
            let err = status_error(&response);
            tracing::error!(container, object, error = %err, "Couldn't upload blob");
            Err(err)
        }
    }
}
