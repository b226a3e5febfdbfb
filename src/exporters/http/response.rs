// SPDX-License-Identifier: Apache-2.0

use std::fmt::{self, Debug, Formatter};

use bytes::Bytes;
use http::StatusCode;
use http::response::Parts;

/// A fully collected HTTP response
pub struct Response {
    head: Parts,
    body: Bytes,
}

impl Response {
    pub fn from_http(head: Parts, body: Bytes) -> Self {
        Self { head, body }
    }

    pub fn status_code(&self) -> StatusCode {
        self.head.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl Debug for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.body.is_empty() {
            write!(f, "HTTPResponse{{Status={}}}", self.head.status)
        } else {
            write!(
                f,
                "HTTPResponse{{Status={}, Body={:?}}}",
                self.head.status,
                String::from_utf8_lossy(&self.body)
            )
        }
    }
}
