// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::io;
use std::process::ExitCode;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use adiftail::init::args::AgentRun;
use adiftail::init::bootstrap::{Agent, BootstrapError};
use adiftail::init::{exit, wait};
use adiftail::topology::DriverError;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "adiftail")]
#[command(bin_name = "adiftail")]
#[command(version, about, long_about = None)]
struct Arguments {
    #[arg(value_enum, long, env = "ADIFTAIL_LOG_FORMAT", default_value = "text")]
    /// Log format
    log_format: LogFormatArg,

    #[command(flatten)]
    agent: AgentRun,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = match Arguments::try_parse() {
        Ok(opt) => opt,
        Err(e) => {
            // --help and --version land here too
            let code = if e.use_stderr() { exit::USAGE } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let _guard = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(exit::SOFTWARE);
        }
    };

    match run_agent(opt.agent) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_code(&e);
            error!(error = e, exit_code = code, "Exiting.");
            ExitCode::from(code)
        }
    }
}

fn exit_code(e: &BoxError) -> u8 {
    if let Some(e) = e.downcast_ref::<BootstrapError>() {
        e.exit_code()
    } else if let Some(e) = e.downcast_ref::<DriverError>() {
        e.exit_code()
    } else {
        exit::SOFTWARE
    }
}

#[tokio::main]
async fn run_agent(agent_args: AgentRun) -> Result<(), BoxError> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting adiftail");

    let agent = Agent::new(agent_args).await?;

    let mut agent_join_set: wait::TaskSet = JoinSet::new();
    let cancel_token = CancellationToken::new();
    {
        let token = cancel_token.clone();
        agent_join_set.spawn(async move {
            agent.run(token).await?;
            Ok(())
        });
    }

    select! {
        res = signal_wait() => {
            res?;
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        e = wait::wait_for_any_task(&mut agent_join_set) => {
            match e {
                Ok(()) => warn!("Unexpected early exit of agent."),
                Err(e) => return Err(e),
            }
        },
    }

    wait::wait_for_tasks_with_timeout(&mut agent_join_set, SHUTDOWN_TIMEOUT).await
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("hyper_util=warn".parse()?)
        .add_directive("rustls=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

#[cfg(unix)]
async fn signal_wait() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_wait() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
