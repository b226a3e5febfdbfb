// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::Full;

pub type Request = hyper::Request<Full<Bytes>>;
