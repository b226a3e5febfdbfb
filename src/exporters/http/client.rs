// SPDX-License-Identifier: Apache-2.0

use crate::exporters::http::tls::Config;
use bytes::Bytes;
use http_body_util::Full;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use thiserror::Error;
use tower::BoxError;

/// Idle connections are dropped after this long
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) type HttpsClient = HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// The request never reached the server.
#[derive(Debug, Error)]
#[error("unable to connect: {0}")]
pub struct ConnectError(pub String);

impl ConnectError {
    pub(crate) fn from_hyper(err: &hyper_util::client::legacy::Error) -> Self {
        let cause = std::error::Error::source(err)
            .map(|s| s.to_string())
            .unwrap_or_else(|| err.to_string());
        Self(cause)
    }
}

pub(crate) fn build_hyper_client(tls_config: Config) -> Result<HttpsClient, BoxError> {
    let client_config = tls_config.into_client_config()?;

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(client_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    // Records go out one at a time
    let client = HyperClient::builder(TokioExecutor::new())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(1)
        .timer(TokioTimer::new())
        .build::<_, Full<Bytes>>(https);

    Ok(client)
}
