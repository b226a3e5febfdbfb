// SPDX-License-Identifier: Apache-2.0

//! Process exit codes, following the BSD `sysexits.h` convention.

/// Command line usage error
pub const USAGE: u8 = 64;
/// Input data was malformed
pub const DATA_ERR: u8 = 65;
/// An input file did not exist or was not readable
pub const NO_INPUT: u8 = 66;
/// A remote service is unavailable
pub const UNAVAILABLE: u8 = 69;
/// Internal software error
pub const SOFTWARE: u8 = 70;
/// An operating system error, such as being unable to set up a watch
pub const OS_ERR: u8 = 71;
/// An error occurred while doing I/O on some file or connection
pub const IO_ERR: u8 = 74;
/// Something was found in an unconfigured or misconfigured state
pub const CONFIG: u8 = 78;
