// SPDX-License-Identifier: Apache-2.0

use crate::exporters::cloudlog::ApiMethod;
use crate::receivers::adif::StartAt;
use crate::receivers::adif::watcher::WatchMode;
use crate::topology::PermanentErrorPolicy;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// Base URL of the CloudLog instance, e.g. https://log.example.com/
    #[arg(env = "ADIFTAIL_BASE_URL")]
    pub base_url: String,

    /// File holding the CloudLog API key
    #[arg(env = "ADIFTAIL_API_KEY_FILE")]
    pub api_key_file: PathBuf,

    /// Numeric station profile ID the QSOs are logged against
    #[arg(env = "ADIFTAIL_STATION_PROFILE_ID")]
    pub station_profile_id: String,

    /// ADIF log file to watch
    #[arg(env = "ADIFTAIL_LOG_FILE")]
    pub log_file: PathBuf,

    #[command(flatten)]
    pub tail: TailArgs,

    #[command(flatten)]
    pub upload: UploadArgs,
}

#[derive(Debug, Args, Clone)]
pub struct TailArgs {
    /// Where to start reading the log at startup
    #[arg(value_enum, long, env = "ADIFTAIL_START_AT", default_value = "beginning")]
    pub start_at: StartAtArg,

    /// File watching strategy
    #[arg(value_enum, long, env = "ADIFTAIL_WATCH_MODE", default_value = "auto")]
    pub watch_mode: WatchModeArg,

    /// How often the poll watcher checks the file
    #[arg(long, env = "ADIFTAIL_POLL_INTERVAL", default_value = "250ms")]
    pub poll_interval: humantime::Duration,

    /// Window for batching bursts of native file events
    #[arg(long, env = "ADIFTAIL_DEBOUNCE_INTERVAL", default_value = "100ms")]
    pub debounce_interval: humantime::Duration,

    /// How long native watcher errors may persist before falling back to polling
    #[arg(long, env = "ADIFTAIL_MAX_WATCHER_ERROR_DURATION", default_value = "60s")]
    pub max_watcher_error_duration: humantime::Duration,

    /// Largest number of bytes held without a complete record
    #[arg(long, env = "ADIFTAIL_MAX_PENDING_SIZE", default_value = "16777216")]
    pub max_pending_size: usize,
}

#[derive(Debug, Args, Clone)]
pub struct UploadArgs {
    /// HTTP method for QSO submissions
    #[arg(value_enum, long, env = "ADIFTAIL_API_METHOD", default_value = "put")]
    pub api_method: ApiMethodArg,

    /// Timeout for a single API request
    #[arg(long, env = "ADIFTAIL_REQUEST_TIMEOUT", default_value = "30s")]
    pub request_timeout: humantime::Duration,

    /// Initial delay before retrying a failed upload
    #[arg(long, env = "ADIFTAIL_RETRY_INITIAL_BACKOFF", default_value = "5s")]
    pub retry_initial_backoff: humantime::Duration,

    /// Upper bound for the delay between retries
    #[arg(long, env = "ADIFTAIL_RETRY_MAX_BACKOFF", default_value = "30s")]
    pub retry_max_backoff: humantime::Duration,

    /// Give up on a record after retrying this long. Retries forever if unset
    #[arg(long, env = "ADIFTAIL_RETRY_MAX_ELAPSED_TIME")]
    pub retry_max_elapsed_time: Option<humantime::Duration>,

    /// What to do when the API permanently rejects a record
    #[arg(
        value_enum,
        long,
        env = "ADIFTAIL_ON_PERMANENT_ERROR",
        default_value = "halt"
    )]
    pub on_permanent_error: PermanentErrorArg,

    /// PEM file with a CA certificate to trust instead of the system roots
    #[arg(long, env = "ADIFTAIL_TLS_CA_FILE")]
    pub tls_ca_file: Option<String>,

    /// Skip the reachability check of the base URL at startup
    #[arg(long, env = "ADIFTAIL_SKIP_STARTUP_PROBE", default_value = "false")]
    pub skip_startup_probe: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum StartAtArg {
    Beginning,
    End,
}

impl From<StartAtArg> for StartAt {
    fn from(value: StartAtArg) -> Self {
        match value {
            StartAtArg::Beginning => StartAt::Beginning,
            StartAtArg::End => StartAt::End,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum WatchModeArg {
    Auto,
    Native,
    #[value(alias = "polling")]
    Poll,
}

impl From<WatchModeArg> for WatchMode {
    fn from(value: WatchModeArg) -> Self {
        match value {
            WatchModeArg::Auto => WatchMode::Auto,
            WatchModeArg::Native => WatchMode::Native,
            WatchModeArg::Poll => WatchMode::Poll,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum ApiMethodArg {
    Put,
    Post,
}

impl From<ApiMethodArg> for ApiMethod {
    fn from(value: ApiMethodArg) -> Self {
        match value {
            ApiMethodArg::Put => ApiMethod::Put,
            ApiMethodArg::Post => ApiMethod::Post,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum PermanentErrorArg {
    Halt,
    Skip,
}

impl From<PermanentErrorArg> for PermanentErrorPolicy {
    fn from(value: PermanentErrorArg) -> Self {
        match value {
            PermanentErrorArg::Halt => PermanentErrorPolicy::Halt,
            PermanentErrorArg::Skip => PermanentErrorPolicy::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        agent: AgentRun,
    }

    fn parse(args: &[&str]) -> Result<AgentRun, clap::Error> {
        let mut argv = vec!["adiftail"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).map(|cli| cli.agent)
    }

    const POSITIONALS: [&str; 4] = [
        "https://log.example.com/",
        "/etc/adiftail/key",
        "1",
        "/home/op/wsjtx_log.adi",
    ];

    #[test]
    fn test_defaults() {
        let args = parse(&POSITIONALS).unwrap();

        assert_eq!(args.base_url, "https://log.example.com/");
        assert_eq!(args.station_profile_id, "1");
        assert_eq!(args.log_file, PathBuf::from("/home/op/wsjtx_log.adi"));
        assert_eq!(args.tail.start_at, StartAtArg::Beginning);
        assert_eq!(args.tail.watch_mode, WatchModeArg::Auto);
        assert_eq!(
            Duration::from(args.tail.poll_interval),
            Duration::from_millis(250)
        );
        assert_eq!(args.tail.max_pending_size, 16 * 1024 * 1024);
        assert_eq!(args.upload.api_method, ApiMethodArg::Put);
        assert_eq!(
            Duration::from(args.upload.request_timeout),
            Duration::from_secs(30)
        );
        assert!(args.upload.retry_max_elapsed_time.is_none());
        assert_eq!(args.upload.on_permanent_error, PermanentErrorArg::Halt);
        assert!(!args.upload.skip_startup_probe);
    }

    #[test]
    fn test_options() {
        let mut argv = POSITIONALS.to_vec();
        argv.extend_from_slice(&[
            "--start-at",
            "end",
            "--watch-mode",
            "polling",
            "--api-method",
            "post",
            "--retry-max-elapsed-time",
            "10m",
            "--on-permanent-error",
            "skip",
            "--skip-startup-probe",
        ]);
        let args = parse(&argv).unwrap();

        assert_eq!(StartAt::from(args.tail.start_at), StartAt::End);
        assert_eq!(WatchMode::from(args.tail.watch_mode), WatchMode::Poll);
        assert_eq!(ApiMethod::from(args.upload.api_method), ApiMethod::Post);
        assert_eq!(
            args.upload.retry_max_elapsed_time.map(Duration::from),
            Some(Duration::from_secs(600))
        );
        assert_eq!(
            PermanentErrorPolicy::from(args.upload.on_permanent_error),
            PermanentErrorPolicy::Skip
        );
        assert!(args.upload.skip_startup_probe);
    }

    #[test]
    fn test_missing_positional() {
        assert!(parse(&POSITIONALS[..3]).is_err());
    }

    #[test]
    fn test_invalid_duration() {
        let mut argv = POSITIONALS.to_vec();
        argv.extend_from_slice(&["--request-timeout", "soon"]);
        assert!(parse(&argv).is_err());
    }
}
