//! Two-round KLAP mutual authentication.
//!
//! 1. **handshake1**: the client sends its local seed; the device answers with
//!    its remote seed and `sha256(local_seed + remote_seed + auth_hash)`.
//! 2. **handshake2**: the client proves knowledge of the auth hash by sending
//!    `sha256(remote_seed + local_seed + auth_hash)`.
//!
//! A failure in either round aborts the handshake. The caller must start over
//! with a fresh local seed; seeds from a failed attempt are never reused.

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::{
    crypto::klap::{
        AuthHash, SEED_LEN, Seed, SessionSeeds, handshake1_seed_auth_hash,
        handshake2_seed_auth_hash,
    },
    error::Error,
    transport::{CONTENT_TYPE, HANDSHAKE1_PATH, HANDSHAKE2_PATH, HttpTransport},
};

/// Runs both handshake rounds and returns the validated seeds.
pub async fn perform<T>(
    transport: &mut T,
    local_seed: Seed,
    auth_hash: &AuthHash,
) -> Result<SessionSeeds, Error>
where
    T: HttpTransport + ?Sized,
{
    let remote_seed = handshake1(transport, &local_seed, auth_hash).await?;
    handshake2(transport, &local_seed, &remote_seed, auth_hash).await?;

    debug!(host = transport.host(), "KLAP handshake completed");

    Ok(SessionSeeds {
        local: local_seed,
        remote: remote_seed,
    })
}

/// Performs handshake 1: send the local seed, validate the server digest.
pub async fn handshake1<T>(
    transport: &mut T,
    local_seed: &Seed,
    auth_hash: &AuthHash,
) -> Result<Seed, Error>
where
    T: HttpTransport + ?Sized,
{
    debug!(
        host = transport.host(),
        local_seed = %hex::encode(local_seed),
        "Performing KLAP handshake1"
    );

    let response = transport
        .post(HANDSHAKE1_PATH, CONTENT_TYPE, local_seed)
        .await?;

    if !response.is_success() {
        return Err(Error::AuthenticationFailed(format!(
            "handshake1 returned status {}",
            response.status
        )));
    }

    if response.body.len() < SEED_LEN {
        return Err(Error::AuthenticationFailed(format!(
            "handshake1 response too short: {} bytes",
            response.body.len()
        )));
    }

    let (remote, server_hash) = response.body.split_at(SEED_LEN);
    let mut remote_seed = Seed::default();
    remote_seed.copy_from_slice(remote);

    let expected = handshake1_seed_auth_hash(local_seed, &remote_seed, auth_hash);
    if !bool::from(expected.as_slice().ct_eq(server_hash)) {
        debug!(
            remote_seed = %hex::encode(remote_seed),
            server_hash = %hex::encode(server_hash),
            "handshake1 server hash did not match"
        );
        return Err(Error::AuthenticationFailed(
            "device response did not match the credentials. \
             Check that your email and password (both case-sensitive) are correct."
                .into(),
        ));
    }

    debug!(remote_seed = %hex::encode(remote_seed), "Handshake1 verified");
    Ok(remote_seed)
}

/// Performs handshake 2: send the client digest, require a 2xx status.
pub async fn handshake2<T>(
    transport: &mut T,
    local_seed: &Seed,
    remote_seed: &Seed,
    auth_hash: &AuthHash,
) -> Result<(), Error>
where
    T: HttpTransport + ?Sized,
{
    debug!(host = transport.host(), "Performing KLAP handshake2");

    let payload = handshake2_seed_auth_hash(local_seed, remote_seed, auth_hash);
    let response = transport
        .post(HANDSHAKE2_PATH, CONTENT_TYPE, &payload)
        .await?;

    if !response.is_success() {
        return Err(Error::AuthenticationFailed(format!(
            "handshake2 returned status {}",
            response.status
        )));
    }

    debug!("Handshake2 succeeded");
    Ok(())
}
