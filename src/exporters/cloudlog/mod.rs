// SPDX-License-Identifier: Apache-2.0

//! Uploader for the CloudLog QSO API.
//!
//! Each record is submitted as one JSON request to `<base>/api/qso`. The
//! uploader makes exactly one attempt per call and classifies the outcome;
//! retry decisions belong to the pipeline driver.

mod api_request;
mod response;

pub use api_request::api_url;
pub use response::ApiResponse;

use std::time::Duration;

use http::StatusCode;
use tower::timeout::Timeout;
use tower::{BoxError, Service, ServiceExt};
use tracing::{debug, warn};

use crate::exporters::http::client::ConnectError;
use crate::exporters::http::http_client::HttpClient;
use crate::exporters::http::request::BaseRequestBuilder;
use crate::exporters::http::response::Response;
use crate::exporters::http::tls;
use crate::exporters::http::types::Request;
use crate::exporters::upload::{Receipt, Upload, UploadFailure};
use crate::receivers::adif::Record;
use api_request::ApiRequestBuilder;

/// HTTP method used for QSO submissions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiMethod {
    #[default]
    Put,
    Post,
}

pub struct CloudlogConfig {
    pub base_url: url::Url,
    pub api_key: String,
    pub station_profile_id: String,
    pub method: ApiMethod,
    pub request_timeout: Duration,
    pub tls: tls::Config,
}

impl CloudlogConfig {
    pub fn new(base_url: url::Url, api_key: String, station_profile_id: String) -> Self {
        Self {
            base_url,
            api_key,
            station_profile_id,
            method: ApiMethod::default(),
            request_timeout: Duration::from_secs(30),
            tls: tls::Config::default(),
        }
    }

    pub fn with_method(mut self, method: ApiMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_tls(mut self, tls: tls::Config) -> Self {
        self.tls = tls;
        self
    }
}

pub struct CloudlogUploader {
    svc: Timeout<HttpClient>,
    requests: ApiRequestBuilder,
    base_url: url::Url,
}

impl CloudlogUploader {
    pub fn new(config: CloudlogConfig) -> Result<Self, BoxError> {
        let qso_url = api_url(config.base_url.as_str())?;
        let client = HttpClient::build(config.tls)?;

        debug!(url = %qso_url, method = ?config.method, "Configured QSO endpoint");

        Ok(Self {
            svc: Timeout::new(client, config.request_timeout),
            requests: ApiRequestBuilder::new(
                qso_url,
                config.method,
                config.api_key,
                config.station_profile_id,
            ),
            base_url: config.base_url,
        })
    }

    /// Check that the base URL answers at all. Any HTTP status counts.
    pub async fn probe(&mut self) -> Result<StatusCode, BoxError> {
        let req = BaseRequestBuilder::new()
            .builder()
            .get(self.base_url.clone())?
            .build()?;

        let resp = self.send(req).await?;
        Ok(resp.status_code())
    }

    async fn send(&mut self, req: Request) -> Result<Response, BoxError> {
        self.svc.ready().await?.call(req).await
    }
}

fn transport_failure(err: BoxError) -> UploadFailure {
    if err.is::<tower::timeout::error::Elapsed>() {
        return UploadFailure::transient("request timed out");
    }
    if let Some(e) = err.downcast_ref::<ConnectError>() {
        return UploadFailure::transient(e.to_string());
    }
    UploadFailure::transient(format!("request failed: {}", err))
}

impl Upload for CloudlogUploader {
    async fn upload(&mut self, record: &Record) -> Result<Receipt, UploadFailure> {
        let req = self.requests.build(record)?;

        let resp = self.send(req).await.map_err(transport_failure)?;
        let (receipt, parsed) = response::classify(&resp)?;

        if let Some(errors) = parsed.adif_errors.filter(|&n| n > 0) {
            warn!(
                offset = record.offset(),
                adif_errors = errors,
                "Record accepted with ADIF errors"
            );
        }

        Ok(receipt)
    }
}
