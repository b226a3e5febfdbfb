// SPDX-License-Identifier: Apache-2.0

use crate::exporters::http::types::Request;
use bytes::Bytes;
use http::header::USER_AGENT;
use http::{HeaderMap, HeaderValue, Method};
use http_body_util::Full;
use tower::BoxError;

/// `name/major.minor (+repository)`
pub const USER_AGENT_VALUE: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION_MAJOR"),
    ".",
    env!("CARGO_PKG_VERSION_MINOR"),
    " (+",
    env!("CARGO_PKG_REPOSITORY"),
    ")"
);

#[derive(Clone, Debug, PartialEq)]
pub enum RequestUri {
    Get(url::Url),
    Put(url::Url),
    Post(url::Url),
}

impl RequestUri {
    fn into_parts(self) -> (Method, url::Url) {
        match self {
            RequestUri::Get(u) => (Method::GET, u),
            RequestUri::Put(u) => (Method::PUT, u),
            RequestUri::Post(u) => (Method::POST, u),
        }
    }
}

#[derive(Clone)]
pub struct BaseRequestBuilder {
    pub header_map: HeaderMap,
}

impl Default for BaseRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseRequestBuilder {
    pub fn new() -> Self {
        let mut base = BaseRequestBuilder {
            header_map: HeaderMap::new(),
        };

        // add base headers here
        base.header_map
            .insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        base
    }

    pub fn builder(&self) -> RequestBuilder {
        RequestBuilder {
            uri: None,
            header_map: self.header_map.clone(),
            body: None,
        }
    }
}

pub struct RequestBuilder {
    uri: Option<RequestUri>,
    header_map: HeaderMap,
    body: Option<Full<Bytes>>,
}

impl RequestBuilder {
    pub fn get<T: TryInto<url::Url>>(mut self, uri: T) -> Result<Self, T::Error> {
        self.uri = Some(RequestUri::Get(uri.try_into()?));
        Ok(self)
    }

    pub fn uri(mut self, uri: RequestUri) -> Self {
        self.uri = Some(uri);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(Full::new(body.into()));
        self
    }

    pub fn build(self) -> Result<Request, BoxError> {
        let (method, uri) = match self.uri {
            None => return Err("URI is not set".into()),
            Some(u) => u.into_parts(),
        };

        if method != Method::GET && self.body.is_none() {
            return Err("Body is not set".into());
        }

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(uri.as_str());

        if let Some(headers) = builder.headers_mut() {
            for (k, v) in &self.header_map {
                headers.insert(k, v.clone());
            }
        }

        let body = self.body.unwrap_or_default();
        match builder.body(body) {
            Ok(req) => Ok(req),
            Err(e) => Err(format!("unable to build request: {}", e).into()),
        }
    }
}
