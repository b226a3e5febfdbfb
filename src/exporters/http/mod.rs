// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod http_client;
pub mod request;
pub mod response;
pub mod tls;
pub mod types;
