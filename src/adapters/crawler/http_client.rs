use crate::error::Result;
use rquest::Client;
use rquest_util::Emulation;
use std::time::Duration;

/// Browser-impersonating client factory, grounded on the reference
/// application's `ClientType`/`create_client` pair: a heavy-emulation client
/// presents a genuine browser TLS/HTTP fingerprint, which IMS's front door
/// otherwise rejects.
pub fn create_session_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .cookie_store(true)
        .emulation(Emulation::Firefox136)
        .build()
        .map_err(Into::into)
}
