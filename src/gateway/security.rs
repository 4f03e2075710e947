//! Shared-secret checks and bind-address policy for the gateway.

use sha2::{Digest, Sha256};
use std::net::IpAddr;
use subtle::ConstantTimeEq;

/// Hex SHA-256 of a webhook secret. Only the hash is kept in memory.
pub fn hash_webhook_secret(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest)
}

/// Compare two strings in constant time. Lengths are not secret.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// True for anything other than loopback (`localhost`, `127.0.0.0/8`, `::1`).
pub fn is_public_bind(host: &str) -> bool {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") {
        return false;
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => !ip.is_loopback(),
        Err(_) => true,
    }
}
