// SPDX-License-Identifier: Apache-2.0

//! The seam between the pipeline and whatever delivers records.

use std::fmt;
use std::future::Future;

use http::StatusCode;

use crate::receivers::adif::Record;

/// How a failed delivery should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// May succeed if the same record is sent again later
    Transient,
    /// Will fail again no matter how often it is retried
    Permanent,
}

/// A failed delivery of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub kind: FailureKind,
    pub status: Option<StatusCode>,
    pub reason: String,
}

impl UploadFailure {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            status: None,
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            status: None,
            reason: reason.into(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
        };
        match self.status {
            Some(status) => write!(f, "{} failure (HTTP {}): {}", kind, status, self.reason),
            None => write!(f, "{} failure: {}", kind, self.reason),
        }
    }
}

impl std::error::Error for UploadFailure {}

/// Confirmation that a record was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub status: StatusCode,
    /// Status string reported by the remote service
    pub message: String,
}

/// Delivers one record per call.
///
/// Implementations make a single attempt. Retrying is up to the caller.
pub trait Upload {
    fn upload(
        &mut self,
        record: &Record,
    ) -> impl Future<Output = Result<Receipt, UploadFailure>> + Send;
}
