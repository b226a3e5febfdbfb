// SPDX-License-Identifier: Apache-2.0

//! Startup: validate arguments, read the credential, open the log and build
//! the pipeline. Anything that fails here fails before a single record is
//! read.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{info, warn};

use crate::crypto::init_crypto_provider;
use crate::exporters::cloudlog::{CloudlogConfig, CloudlogUploader, api_url};
use crate::exporters::http::tls;
use crate::exporters::retry::RetryConfig;
use crate::init::args::AgentRun;
use crate::init::exit;
use crate::receivers::adif::watcher::{WakeupSource, WatcherConfig, WatcherError};
use crate::receivers::adif::{self, TailConfig, Tailer};
use crate::topology::{Driver, DriverConfig, DriverError, DriverStats};

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("invalid base URL {url:?}: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("station profile ID must be a number, got {0:?}")]
    StationProfile(String),

    #[error("failed to read API key from {path:?}: {source}")]
    ApiKey { path: PathBuf, source: io::Error },

    #[error("API key file {0:?} is empty")]
    EmptyApiKey(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to open log file {path:?}: {source}")]
    LogFile { path: PathBuf, source: adif::Error },

    #[error("unable to watch log file: {0}")]
    Watch(#[from] WatcherError),

    #[error("failed to set up HTTP client: {0}")]
    Client(BoxError),

    #[error("{url} is unreachable: {source}")]
    Unreachable { url: String, source: BoxError },
}

impl BootstrapError {
    pub fn exit_code(&self) -> u8 {
        match self {
            BootstrapError::BaseUrl { .. } | BootstrapError::StationProfile(_) => exit::USAGE,
            BootstrapError::ApiKey { .. } | BootstrapError::EmptyApiKey(_) => exit::NO_INPUT,
            BootstrapError::LogFile { .. } => exit::NO_INPUT,
            BootstrapError::Config(_) | BootstrapError::Client(_) => exit::CONFIG,
            BootstrapError::Watch(_) => exit::OS_ERR,
            BootstrapError::Unreachable { .. } => exit::UNAVAILABLE,
        }
    }
}

/// Parse the CloudLog base URL. Only http and https are accepted.
pub fn parse_base_url(base: &str) -> Result<url::Url, BootstrapError> {
    let invalid = |reason: String| BootstrapError::BaseUrl {
        url: base.to_string(),
        reason,
    };

    let url = url::Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    // Make sure the QSO endpoint can be derived as well
    api_url(base).map_err(|e| invalid(e.to_string()))?;

    Ok(url)
}

/// Station profile IDs are database keys, so anything but digits is a typo.
pub fn parse_station_profile_id(id: &str) -> Result<String, BootstrapError> {
    let id = id.trim();
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BootstrapError::StationProfile(id.to_string()));
    }
    Ok(id.to_string())
}

/// Read the API key: the whole file, surrounding whitespace removed.
pub fn read_api_key(path: &Path) -> Result<String, BootstrapError> {
    let content = std::fs::read_to_string(path).map_err(|source| BootstrapError::ApiKey {
        path: path.to_path_buf(),
        source,
    })?;

    let key = content.trim();
    if key.is_empty() {
        return Err(BootstrapError::EmptyApiKey(path.to_path_buf()));
    }
    Ok(key.to_string())
}

fn retry_config(args: &AgentRun) -> RetryConfig {
    let upload = &args.upload;
    let mut retry = RetryConfig {
        initial_backoff: upload.retry_initial_backoff.into(),
        max_backoff: upload.retry_max_backoff.into(),
        ..Default::default()
    };
    if let Some(max_elapsed) = upload.retry_max_elapsed_time {
        retry.max_elapsed_time = max_elapsed.into();
        retry.indefinite_retry = false;
    }
    retry
}

fn tail_config(args: &AgentRun) -> TailConfig {
    let tail = &args.tail;
    TailConfig::new(&args.log_file)
        .with_start_at(tail.start_at.into())
        .with_max_pending_size(tail.max_pending_size)
        .with_watcher(WatcherConfig {
            mode: tail.watch_mode.into(),
            poll_interval: tail.poll_interval.into(),
            debounce_interval: tail.debounce_interval.into(),
            max_watcher_error_duration: tail.max_watcher_error_duration.into(),
        })
}

/// A fully wired pipeline, ready to run.
pub struct Agent {
    driver: Driver<CloudlogUploader>,
}

impl Agent {
    pub async fn new(args: AgentRun) -> Result<Self, BootstrapError> {
        let base_url = parse_base_url(&args.base_url)?;
        let station_profile_id = parse_station_profile_id(&args.station_profile_id)?;
        let api_key = read_api_key(&args.api_key_file)?;

        let retry = retry_config(&args);
        if retry.initial_backoff.is_zero() || retry.max_backoff < retry.initial_backoff {
            return Err(BootstrapError::Config(
                "retry backoff must be positive and max backoff at least the initial backoff"
                    .to_string(),
            ));
        }

        let request_timeout: Duration = args.upload.request_timeout.into();
        if request_timeout.is_zero() {
            return Err(BootstrapError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }

        init_crypto_provider().map_err(BootstrapError::Client)?;
        let mut tls = tls::Config::builder();
        if let Some(ca_file) = &args.upload.tls_ca_file {
            tls = tls.with_ca_file(ca_file.clone());
        }
        let tls = tls.build().map_err(BootstrapError::Client)?;

        let cloudlog = CloudlogConfig::new(base_url.clone(), api_key, station_profile_id)
            .with_method(args.upload.api_method.into())
            .with_request_timeout(request_timeout)
            .with_tls(tls);
        let mut uploader = CloudlogUploader::new(cloudlog).map_err(BootstrapError::Client)?;

        let tail = tail_config(&args);
        tail.validate().map_err(BootstrapError::Config)?;
        let tailer = Tailer::open(&tail).map_err(|source| BootstrapError::LogFile {
            path: tail.path.clone(),
            source,
        })?;

        if args.upload.skip_startup_probe {
            warn!("Skipping startup probe of {}", base_url);
        } else {
            let status = uploader
                .probe()
                .await
                .map_err(|source| BootstrapError::Unreachable {
                    url: base_url.to_string(),
                    source,
                })?;
            info!(url = %base_url, %status, "CloudLog instance is reachable");
        }

        let wakeups = WakeupSource::spawn(&tail.path, &tail.watcher)?;

        let config = DriverConfig {
            retry,
            on_permanent_error: args.upload.on_permanent_error.into(),
        };
        info!(
            path = ?tail.path,
            start_at = ?tail.start_at,
            watch_mode = ?tail.watcher.mode,
            on_permanent_error = ?config.on_permanent_error,
            indefinite_retry = config.retry.indefinite_retry,
            "Pipeline configured"
        );

        Ok(Self {
            driver: Driver::new(tailer, uploader, wakeups, config),
        })
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<DriverStats, DriverError> {
        self.driver.run(cancel).await
    }
}
