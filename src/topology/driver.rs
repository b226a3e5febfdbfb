// SPDX-License-Identifier: Apache-2.0

//! The pipeline driver.
//!
//! Waits for wake-ups, asks the tailer for newly completed records and hands
//! them to the uploader strictly one at a time, in file order. A record is
//! only left behind once it has been delivered, or skipped under the
//! permanent-error policy.

use std::time::Duration;

use thiserror::Error;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exporters::retry::{Backoff, RetryConfig};
use crate::exporters::upload::{Upload, UploadFailure};
use crate::init::exit;
use crate::receivers::adif::watcher::{Signal, WakeupSource};
use crate::receivers::adif::{self, Record, Tailer};

/// What to do with a record the service will never accept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermanentErrorPolicy {
    /// Stop the pipeline
    #[default]
    Halt,
    /// Log the record and move on to the next one
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    pub retry: RetryConfig,
    pub on_permanent_error: PermanentErrorPolicy,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriverStats {
    pub delivered: u64,
    pub skipped: u64,
    pub retries: u64,
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed reading log file: {0}")]
    Read(#[from] adif::Error),

    #[error("record at offset {offset} was rejected: {failure}")]
    Rejected { offset: u64, failure: UploadFailure },

    #[error(
        "gave up on record at offset {offset} after {attempts} attempts over {elapsed:?}: {failure}"
    )]
    RetriesExhausted {
        offset: u64,
        attempts: u32,
        elapsed: Duration,
        failure: UploadFailure,
    },

    #[error("file watcher stopped: {0}")]
    Watch(String),
}

impl DriverError {
    pub fn exit_code(&self) -> u8 {
        match self {
            DriverError::Read(adif::Error::RecordTooLarge { .. }) => exit::DATA_ERR,
            DriverError::Read(_) => exit::IO_ERR,
            DriverError::Rejected { .. } => exit::IO_ERR,
            DriverError::RetriesExhausted { .. } => exit::UNAVAILABLE,
            DriverError::Watch(_) => exit::OS_ERR,
        }
    }
}

/// Per-record retry state, dropped once the record is delivered
struct DeliveryAttempt {
    offset: u64,
    backoff: Backoff,
    last_failure: Option<UploadFailure>,
}

impl DeliveryAttempt {
    fn new(record: &Record, retry: RetryConfig) -> Self {
        Self {
            offset: record.offset(),
            backoff: Backoff::new(retry),
            last_failure: None,
        }
    }

    fn exhausted(self) -> DriverError {
        DriverError::RetriesExhausted {
            offset: self.offset,
            attempts: self.backoff.attempts() + 1,
            elapsed: self.backoff.elapsed(),
            failure: self
                .last_failure
                .unwrap_or_else(|| UploadFailure::transient("no attempt made")),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Skipped,
    Cancelled,
}

pub struct Driver<U> {
    tailer: Tailer,
    uploader: U,
    wakeups: WakeupSource,
    config: DriverConfig,
    stats: DriverStats,
}

impl<U: Upload> Driver<U> {
    pub fn new(tailer: Tailer, uploader: U, wakeups: WakeupSource, config: DriverConfig) -> Self {
        Self {
            tailer,
            uploader,
            wakeups,
            config,
            stats: DriverStats::default(),
        }
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Run until cancelled or a fatal error occurs.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<DriverStats, DriverError> {
        info!(
            path = ?self.tailer.path(),
            offset = self.tailer.offset(),
            watcher = self.wakeups.backend_name(),
            "Starting log upload pipeline"
        );

        let result = self.run_loop(&cancel).await;

        let stats = self.stats;
        match &result {
            Ok(()) => info!(
                delivered = stats.delivered,
                skipped = stats.skipped,
                retries = stats.retries,
                "Pipeline stopped"
            ),
            Err(e) => error!(
                error = %e,
                delivered = stats.delivered,
                skipped = stats.skipped,
                retries = stats.retries,
                "Pipeline halted"
            ),
        }

        result.map(|_| stats)
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<(), DriverError> {
        loop {
            let signal = select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                signal = self.wakeups.next() => signal,
            };

            match signal {
                Some(Signal::Changed) => {
                    if !self.process_wakeup(cancel).await? {
                        return Ok(());
                    }
                }
                Some(Signal::Removed(path)) => return Err(adif::Error::FileRemoved(path).into()),
                Some(Signal::Renamed(path)) => return Err(adif::Error::FileRenamed(path).into()),
                Some(Signal::Failed(reason)) => return Err(DriverError::Watch(reason)),
                None => return Err(DriverError::Watch("watcher exited unexpectedly".into())),
            }
        }
    }

    /// Read newly completed records and deliver each in order.
    ///
    /// Returns false if cancelled before every record was handled.
    pub async fn process_wakeup(&mut self, cancel: &CancellationToken) -> Result<bool, DriverError> {
        let records = self.tailer.on_wakeup()?;
        if records.is_empty() {
            return Ok(true);
        }
        debug!(count = records.len(), "Found new records");

        let total = records.len();
        for (i, record) in records.iter().enumerate() {
            match self.deliver(record, cancel).await? {
                Outcome::Delivered | Outcome::Skipped => {}
                Outcome::Cancelled => {
                    info!(
                        undelivered = total - i,
                        offset = record.offset(),
                        "Shutdown with records not yet delivered"
                    );
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    async fn deliver(
        &mut self,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DriverError> {
        let mut attempt = DeliveryAttempt::new(record, self.config.retry.clone());

        loop {
            let result = select! {
                biased;
                _ = cancel.cancelled() => return Ok(Outcome::Cancelled),
                result = self.uploader.upload(record) => result,
            };

            let failure = match result {
                Ok(receipt) => {
                    self.stats.delivered += 1;
                    info!(
                        offset = record.offset(),
                        bytes = record.len(),
                        status = %receipt.status,
                        "Uploaded record"
                    );
                    return Ok(Outcome::Delivered);
                }
                Err(failure) => failure,
            };

            if !failure.is_transient() {
                return match self.config.on_permanent_error {
                    PermanentErrorPolicy::Halt => Err(DriverError::Rejected {
                        offset: record.offset(),
                        failure,
                    }),
                    PermanentErrorPolicy::Skip => {
                        self.stats.skipped += 1;
                        error!(
                            offset = record.offset(),
                            record = ?record,
                            reason = %failure,
                            "Record rejected, skipping"
                        );
                        Ok(Outcome::Skipped)
                    }
                };
            }

            let Some(delay) = attempt.backoff.next_delay() else {
                attempt.last_failure = Some(failure);
                return Err(attempt.exhausted());
            };

            self.stats.retries += 1;
            warn!(
                offset = record.offset(),
                attempt = attempt.backoff.attempts(),
                delay = ?delay,
                reason = %failure,
                "Upload failed, will retry again after delay."
            );
            attempt.last_failure = Some(failure);

            select! {
                biased;
                _ = cancel.cancelled() => return Ok(Outcome::Cancelled),
                _ = tokio::time::sleep(delay) => {},
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::upload::Receipt;
    use crate::receivers::adif::TailConfig;
    use crate::receivers::adif::watcher::WakeupSender;
    use bytes::Bytes;
    use http::StatusCode;
    use std::collections::VecDeque;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    type Script = VecDeque<Result<Receipt, UploadFailure>>;

    /// Records every upload and answers from a script, then with success.
    #[derive(Clone, Default)]
    struct MockUploader {
        calls: Arc<Mutex<Vec<Bytes>>>,
        script: Arc<Mutex<Script>>,
        /// Never answer, like a server that accepted the connection and hung
        stalled: bool,
    }

    impl MockUploader {
        fn with_script(script: impl IntoIterator<Item = Result<Receipt, UploadFailure>>) -> Self {
            let mock = Self::default();
            mock.script.lock().unwrap().extend(script);
            mock
        }

        fn stalled() -> Self {
            Self {
                stalled: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Bytes> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Upload for MockUploader {
        async fn upload(&mut self, record: &Record) -> Result<Receipt, UploadFailure> {
            self.calls.lock().unwrap().push(record.content().clone());
            if self.stalled {
                std::future::pending::<()>().await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(created()))
        }
    }

    fn created() -> Receipt {
        Receipt {
            status: StatusCode::CREATED,
            message: "created".to_string(),
        }
    }

    fn fast_retry(indefinite_retry: bool) -> RetryConfig {
        RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(400),
            max_elapsed_time: Duration::from_secs(2),
            indefinite_retry,
        }
    }

    struct Harness {
        _dir: TempDir,
        path: PathBuf,
        uploader: MockUploader,
        sender: WakeupSender,
        driver: Driver<MockUploader>,
    }

    fn harness(initial: &[u8], uploader: MockUploader, config: DriverConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wsjtx_log.adi");
        fs::write(&path, initial).unwrap();

        let tailer = Tailer::open(&TailConfig::new(&path)).unwrap();
        let (sender, wakeups) = WakeupSource::channel();
        let driver = Driver::new(tailer, uploader.clone(), wakeups, config);

        Harness {
            _dir: dir,
            path,
            uploader,
            sender,
            driver,
        }
    }

    fn append(path: &Path, data: &[u8]) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(data).unwrap();
    }

    #[tokio::test]
    async fn test_three_chunk_scenario() {
        let mut h = harness(b"R1\n<e", MockUploader::default(), DriverConfig::default());
        let cancel = CancellationToken::new();

        assert!(h.driver.process_wakeup(&cancel).await.unwrap());
        assert!(h.uploader.calls().is_empty());

        append(&h.path, b"or>R2\n");
        assert!(h.driver.process_wakeup(&cancel).await.unwrap());
        assert_eq!(h.uploader.calls(), vec![Bytes::from_static(b"R1\n<eor>")]);

        append(&h.path, b"<eor>");
        assert!(h.driver.process_wakeup(&cancel).await.unwrap());
        assert_eq!(
            h.uploader.calls(),
            vec![
                Bytes::from_static(b"R1\n<eor>"),
                Bytes::from_static(b"R2\n<eor>")
            ]
        );
        assert_eq!(h.driver.stats().delivered, 2);
    }

    #[tokio::test]
    async fn test_delivers_in_file_order() {
        let log: String = (0..20)
            .map(|i| format!("<CALL:5>K{:04}<EOR>\n", i))
            .collect();
        let mut h = harness(log.as_bytes(), MockUploader::default(), DriverConfig::default());

        h.driver
            .process_wakeup(&CancellationToken::new())
            .await
            .unwrap();

        let calls = h.uploader.calls();
        assert_eq!(calls.len(), 20);
        for (i, call) in calls.iter().enumerate() {
            let expected = format!("<CALL:5>K{:04}<EOR>", i);
            assert!(call.ends_with(expected.as_bytes()), "call {} was {:?}", i, call);
        }
    }

    #[tokio::test]
    async fn test_spurious_wakeups_do_not_duplicate() {
        let mut h = harness(
            b"<CALL:4>K1AB<EOR>\n",
            MockUploader::default(),
            DriverConfig::default(),
        );
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            h.driver.process_wakeup(&cancel).await.unwrap();
        }
        assert_eq!(h.uploader.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let uploader = MockUploader::with_script([
            Err(UploadFailure::transient("unable to connect")),
            Err(UploadFailure::transient("request timed out")),
        ]);
        let config = DriverConfig {
            retry: fast_retry(true),
            ..Default::default()
        };
        let mut h = harness(b"<CALL:4>K1AB<EOR>\n<CALL:4>W1AW<EOR>\n", uploader, config);

        h.driver
            .process_wakeup(&CancellationToken::new())
            .await
            .unwrap();

        let calls = h.uploader.calls();
        assert_eq!(calls.len(), 4);
        // Same record three times before moving on
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[1], calls[2]);
        assert_ne!(calls[2], calls[3]);
        assert_eq!(
            h.driver.stats(),
            DriverStats {
                delivered: 2,
                skipped: 0,
                retries: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_halts() {
        let uploader =
            MockUploader::with_script((0..100).map(|_| Err(UploadFailure::transient("down"))));
        let config = DriverConfig {
            retry: fast_retry(false),
            ..Default::default()
        };
        let mut h = harness(b"<CALL:4>K1AB<EOR>\n<CALL:4>W1AW<EOR>\n", uploader, config);

        let err = h
            .driver
            .process_wakeup(&CancellationToken::new())
            .await
            .unwrap_err();

        match &err {
            DriverError::RetriesExhausted {
                offset,
                attempts,
                failure,
                ..
            } => {
                assert_eq!(*offset, 0);
                assert!(*attempts > 1);
                assert_eq!(failure.reason, "down");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.exit_code(), exit::UNAVAILABLE);

        // The second record was never attempted
        let first = Bytes::from_static(b"<CALL:4>K1AB<EOR>");
        assert!(h.uploader.calls().iter().all(|c| *c == first));
    }

    #[tokio::test]
    async fn test_permanent_failure_halts_by_default() {
        let uploader = MockUploader::with_script([Err(UploadFailure::permanent(
            "station id does not belong to the API key owner",
        )
        .with_status(StatusCode::OK))]);
        let mut h = harness(
            b"<CALL:4>K1AB<EOR>\n<CALL:4>W1AW<EOR>\n",
            uploader,
            DriverConfig::default(),
        );

        let err = h
            .driver
            .process_wakeup(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Rejected { offset: 0, .. }));
        assert_eq!(err.exit_code(), exit::IO_ERR);
        assert_eq!(h.uploader.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_skip_policy() {
        let uploader = MockUploader::with_script([Err(UploadFailure::permanent("bad record"))]);
        let config = DriverConfig {
            on_permanent_error: PermanentErrorPolicy::Skip,
            ..Default::default()
        };
        let mut h = harness(b"<CALL:4>K1AB<EOR>\n<CALL:4>W1AW<EOR>\n", uploader, config);

        assert_ok!(h.driver.process_wakeup(&CancellationToken::new()).await);

        assert_eq!(h.uploader.calls().len(), 2);
        assert_eq!(
            h.driver.stats(),
            DriverStats {
                delivered: 1,
                skipped: 1,
                retries: 0
            }
        );
    }

    #[tokio::test]
    async fn test_truncation_is_fatal() {
        let mut h = harness(
            b"<CALL:4>K1AB<EOR>\n",
            MockUploader::default(),
            DriverConfig::default(),
        );
        let cancel = CancellationToken::new();
        h.driver.process_wakeup(&cancel).await.unwrap();

        let file = OpenOptions::new().write(true).open(&h.path).unwrap();
        file.set_len(3).unwrap();

        let err = h.driver.process_wakeup(&cancel).await.unwrap_err();
        assert!(matches!(
            err,
            DriverError::Read(adif::Error::Truncated { .. })
        ));
        assert_eq!(h.uploader.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_run_processes_signals_until_cancelled() {
        let h = harness(
            b"<CALL:4>K1AB<EOR>\n",
            MockUploader::default(),
            DriverConfig::default(),
        );
        let Harness {
            _dir,
            path,
            uploader,
            sender,
            driver,
        } = h;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(driver.run(cancel.clone()));

        sender.notify();
        wait_for_calls(&uploader, 1).await;

        append(&path, b"<CALL:4>W1AW<EOR>\n");
        sender.notify();
        wait_for_calls(&uploader, 2).await;

        cancel.cancel();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.delivered, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_removal_signal() {
        let h = harness(b"", MockUploader::default(), DriverConfig::default());
        let path = h.path.clone();

        h.sender
            .signal(Signal::Removed(path.clone()))
            .unwrap();
        let err = h.driver.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(&err, DriverError::Read(adif::Error::FileRemoved(p)) if *p == path));
        assert_eq!(err.exit_code(), exit::IO_ERR);
    }

    #[tokio::test]
    async fn test_run_stops_on_watcher_failure() {
        let h = harness(b"", MockUploader::default(), DriverConfig::default());

        h.sender
            .signal(Signal::Failed("inotify queue overflow".into()))
            .unwrap();
        let err = h.driver.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, DriverError::Watch(_)));
        assert_eq!(err.exit_code(), exit::OS_ERR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let uploader =
            MockUploader::with_script((0..100).map(|_| Err(UploadFailure::transient("down"))));
        let config = DriverConfig {
            retry: RetryConfig {
                initial_backoff: Duration::from_secs(3600),
                max_backoff: Duration::from_secs(3600),
                ..fast_retry(true)
            },
            ..Default::default()
        };
        let h = harness(b"<CALL:4>K1AB<EOR>\n", uploader.clone(), config);

        let cancel = CancellationToken::new();
        h.sender.notify();
        let handle = tokio::spawn(h.driver.run(cancel.clone()));

        wait_for_calls(&uploader, 1).await;
        cancel.cancel();

        let stats = assert_ok!(handle.await.unwrap());
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.retries, 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_inflight_upload() {
        let uploader = MockUploader::stalled();
        let h = harness(
            b"<CALL:4>K1AB<EOR>\n<CALL:4>W1AW<EOR>\n",
            uploader.clone(),
            DriverConfig::default(),
        );

        let cancel = CancellationToken::new();
        h.sender.notify();
        let handle = tokio::spawn(h.driver.run(cancel.clone()));

        wait_for_calls(&uploader, 1).await;
        cancel.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("driver did not stop on cancel")
            .unwrap()
            .unwrap();
        assert_eq!(stats, DriverStats::default());
        assert_eq!(uploader.calls().len(), 1);
    }

    #[test]
    fn test_exit_codes() {
        let too_large = DriverError::Read(adif::Error::RecordTooLarge {
            offset: 0,
            size: 1,
        });
        assert_eq!(too_large.exit_code(), exit::DATA_ERR);
        assert_eq!(
            DriverError::Read(adif::Error::FileRenamed(PathBuf::from("log.adi"))).exit_code(),
            exit::IO_ERR
        );
    }

    async fn wait_for_calls(uploader: &MockUploader, n: usize) {
        for _ in 0..500 {
            if uploader.calls().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} uploads", n);
    }
}
