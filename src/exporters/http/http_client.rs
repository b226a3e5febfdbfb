// SPDX-License-Identifier: Apache-2.0

use crate::exporters::http::client::{ConnectError, HttpsClient, build_hyper_client};
use crate::exporters::http::response::Response;
use crate::exporters::http::tls::Config;
use crate::exporters::http::types::Request;
use http_body_util::BodyExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{BoxError, Service};

#[derive(Clone)]
pub struct HttpClient {
    inner: HttpsClient,
}

impl HttpClient {
    pub fn build(tls_config: Config) -> Result<Self, BoxError> {
        let inner = build_hyper_client(tls_config)?;

        Ok(Self { inner })
    }

    async fn perform_request(&self, req: Request) -> Result<Response, BoxError> {
        match self.inner.request(req).await {
            Err(e) => {
                if e.is_connect() {
                    Err(ConnectError::from_hyper(&e).into())
                } else {
                    Err(e.into())
                }
            }
            Ok(resp) => {
                let (head, body) = resp.into_parts();

                let body = match body.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(e) => return Err(format!("failed reading response: {}", e).into()),
                };

                Ok(Response::from_http(head, body))
            }
        }
    }
}

impl Service<Request> for HttpClient {
    type Response = Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let this = self.clone();

        Box::pin(async move { this.perform_request(req).await })
    }
}
