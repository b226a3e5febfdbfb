// SPDX-License-Identifier: Apache-2.0

use crate::exporters::http::request::{BaseRequestBuilder, RequestUri};
use crate::exporters::http::types::Request;
use crate::exporters::upload::UploadFailure;
use crate::receivers::adif::Record;
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use serde::Serialize;
use tower::BoxError;

use super::ApiMethod;

const QSO_PATH: &str = "api/qso";

/// Resolve the QSO endpoint below `base`.
///
/// A base without a trailing slash is treated as a directory, so
/// `https://example.com/cloudlog` becomes `https://example.com/cloudlog/api/qso`.
pub fn api_url(base: &str) -> Result<url::Url, url::ParseError> {
    let mut base = url::Url::parse(base)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(QSO_PATH)
}

#[derive(Serialize)]
struct QsoPayload<'a> {
    key: &'a str,
    station_profile_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    string: &'a str,
}

#[derive(Clone)]
pub struct ApiRequestBuilder {
    base: BaseRequestBuilder,
    uri: RequestUri,
    api_key: String,
    station_profile_id: String,
}

impl ApiRequestBuilder {
    pub fn new(
        qso_url: url::Url,
        method: ApiMethod,
        api_key: String,
        station_profile_id: String,
    ) -> Self {
        let mut base = BaseRequestBuilder::new();
        base.header_map
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let uri = match method {
            ApiMethod::Put => RequestUri::Put(qso_url),
            ApiMethod::Post => RequestUri::Post(qso_url),
        };

        Self {
            base,
            uri,
            api_key,
            station_profile_id,
        }
    }

    /// Build the request that submits `record`.
    pub fn build(&self, record: &Record) -> Result<Request, UploadFailure> {
        let adif = std::str::from_utf8(record.content()).map_err(|e| {
            UploadFailure::permanent(format!("record is not valid UTF-8: {}", e))
        })?;

        let payload = QsoPayload {
            key: &self.api_key,
            station_profile_id: &self.station_profile_id,
            kind: "adif",
            string: adif,
        };

        self.encode(&payload)
            .map_err(|e| UploadFailure::permanent(format!("unable to build request: {}", e)))
    }

    fn encode(&self, payload: &QsoPayload<'_>) -> Result<Request, BoxError> {
        let body = serde_json::to_vec(payload)?;

        self.base
            .builder()
            .uri(self.uri.clone())
            .body(body)
            .build()
    }
}
