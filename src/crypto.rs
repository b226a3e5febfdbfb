// SPDX-License-Identifier: Apache-2.0

use rustls::crypto::CryptoProvider;
use tower::BoxError;

/// Install the `ring` provider as the process-wide rustls default.
///
/// Safe to call more than once; losing an install race to another caller is
/// not an error.
pub fn init_crypto_provider() -> Result<(), BoxError> {
    if CryptoProvider::get_default().is_some() {
        return Ok(());
    }

    match rustls::crypto::ring::default_provider().install_default() {
        Ok(_) => Ok(()),
        Err(_) if CryptoProvider::get_default().is_some() => Ok(()),
        Err(e) => Err(format!("failed to initialize crypto library: {:?}", e).into()),
    }
}
