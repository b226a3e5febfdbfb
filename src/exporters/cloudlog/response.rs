// SPDX-License-Identifier: Apache-2.0

//! Interpretation of QSO API responses.

use http::StatusCode;
use serde::Deserialize;

use crate::exporters::http::response::Response;
use crate::exporters::upload::{FailureKind, Receipt, UploadFailure};

const ACCEPTED: [&str; 3] = ["created", "success", "ok"];

/// Longest slice of an unparseable body quoted in a failure reason
const BODY_PREVIEW: usize = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiResponse {
    pub status: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub adif_errors: Option<u64>,
    pub adif_count: Option<u64>,
}

impl ApiResponse {
    fn reason(&self) -> Option<&str> {
        self.reason.as_deref().or(self.message.as_deref())
    }
}

/// Classify a response by status code and body.
pub fn classify(response: &Response) -> Result<(Receipt, ApiResponse), UploadFailure> {
    let status = response.status_code();
    let parsed: Option<ApiResponse> = serde_json::from_slice(response.body()).ok();

    if !status.is_success() {
        let kind = failure_kind(status);
        let reason = match parsed.as_ref().and_then(|p| p.reason()) {
            Some(reason) => reason.to_string(),
            None => preview(response.body()),
        };
        return Err(UploadFailure {
            kind,
            status: Some(status),
            reason,
        });
    }

    let Some(parsed) = parsed else {
        return Err(UploadFailure::permanent(format!(
            "unparseable response body: {}",
            preview(response.body())
        ))
        .with_status(status));
    };

    match parsed.status.as_deref() {
        Some(s) if ACCEPTED.iter().any(|a| a.eq_ignore_ascii_case(s)) => Ok((
            Receipt {
                status,
                message: s.to_string(),
            },
            parsed,
        )),
        other => {
            let reason = parsed
                .reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("unexpected status {:?}", other.unwrap_or("<none>")));
            Err(UploadFailure::permanent(reason).with_status(status))
        }
    }
}

fn failure_kind(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => FailureKind::Transient,
        s if s.is_server_error() => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

fn preview(body: &[u8]) -> String {
    if body.is_empty() {
        return "<empty body>".to_string();
    }
    let shown = &body[..body.len().min(BODY_PREVIEW)];
    String::from_utf8_lossy(shown).into_owned()
}
