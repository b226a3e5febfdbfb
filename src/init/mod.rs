// SPDX-License-Identifier: Apache-2.0

pub mod args;
pub mod bootstrap;
pub mod exit;
pub mod wait;
