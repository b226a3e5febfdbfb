// SPDX-License-Identifier: Apache-2.0

pub mod cloudlog;
pub mod http;
pub mod retry;
pub mod upload;
