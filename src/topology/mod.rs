// SPDX-License-Identifier: Apache-2.0

pub mod driver;

pub use driver::{Driver, DriverConfig, DriverError, DriverStats, PermanentErrorPolicy};
