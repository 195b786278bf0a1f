//! License containers and the verification pipeline.
//!
//! A license file is a small JSON container:
//!
//! ```json
//! {"key_id": "...", "private_key": "<base64url>", "authorization": "<base64>"}
//! ```
//!
//! `authorization` holds a signed envelope whose payload is the claims JSON.
//! Verification runs in a fixed order and stops at the first failure:
//! envelope signature first, then the token binding the claims'
//! expiration to `private_key`.

use crate::envelope::verify_envelope;
use crate::error::{LicenseError, LicenseResult, LicenseStage};
use crate::key::{TrustedKey, trusted_key};
use crate::token;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A license as downloaded from the store or license server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseContainer {
    /// Informational key identifier.
    #[serde(default)]
    pub key_id: String,
    /// base64url secret unique to this license.
    pub private_key: String,
    /// base64 signed envelope carrying the claims.
    pub authorization: String,
}

impl LicenseContainer {
    /// Parses a container from its JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> LicenseResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| LicenseError::malformed(LicenseStage::Container, e))
    }

    /// Serializes the container to JSON bytes.
    pub fn to_vec(&self) -> LicenseResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LicenseError::malformed(LicenseStage::Container, e))
    }

    /// Verifies this container against the embedded authority key.
    pub fn decode(&self) -> LicenseResult<EntitlementRecord> {
        decode(self)
    }
}

/// Claims as signed by the authority, before the token has been checked.
#[derive(Debug, Deserialize)]
struct Claims {
    expiration: DateTime<FixedOffset>,
    token: String,
    #[serde(default, rename = "maxEngines")]
    max_engines: i64,
    #[serde(default, rename = "licenseType")]
    license_type: String,
    #[serde(default)]
    tier: String,
    #[serde(default, rename = "scanningEnabled")]
    scanning_enabled: bool,
}

impl Claims {
    fn into_record(self) -> EntitlementRecord {
        EntitlementRecord {
            expiration: self.expiration,
            max_engines: self.max_engines,
            license_type: self.license_type,
            tier: self.tier,
            scanning_enabled: self.scanning_enabled,
        }
    }
}

/// Verified entitlement claims.
///
/// Only produced by a successful [`decode`]; there is no other constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementRecord {
    expiration: DateTime<FixedOffset>,
    max_engines: i64,
    license_type: String,
    tier: String,
    scanning_enabled: bool,
}

impl EntitlementRecord {
    /// Returns the expiration as issued (offset preserved).
    #[must_use]
    pub fn expiration(&self) -> DateTime<FixedOffset> {
        self.expiration
    }

    /// Returns the maximum number of engines.
    #[must_use]
    pub fn max_engines(&self) -> i64 {
        self.max_engines
    }

    /// Returns the license type.
    #[must_use]
    pub fn license_type(&self) -> &str {
        &self.license_type
    }

    /// Returns the tier.
    #[must_use]
    pub fn tier(&self) -> &str {
        &self.tier
    }

    /// Returns true if image scanning is enabled.
    #[must_use]
    pub fn scanning_enabled(&self) -> bool {
        self.scanning_enabled
    }

    /// Returns true if the license has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }
}

/// Formats a timestamp exactly as the authority does when computing tokens:
/// RFC 3339, whole seconds, `Z` for UTC.
#[must_use]
pub fn wire_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses and verifies raw license file bytes against the embedded key.
pub fn parse_license(bytes: &[u8]) -> LicenseResult<EntitlementRecord> {
    let container = LicenseContainer::from_slice(bytes)?;
    decode(&container)
}

/// Parses and verifies raw license file bytes against `trusted`.
pub fn parse_license_with_key(
    bytes: &[u8],
    trusted: &TrustedKey,
) -> LicenseResult<EntitlementRecord> {
    let container = LicenseContainer::from_slice(bytes)?;
    decode_with_key(&container, trusted)
}

/// Verifies a container against the embedded authority key.
///
/// # Errors
///
/// Returns [`LicenseError::TrustedKey`] if the embedded key is unusable,
/// otherwise see [`decode_with_key`].
pub fn decode(container: &LicenseContainer) -> LicenseResult<EntitlementRecord> {
    decode_with_key(container, trusted_key()?)
}

/// Verifies a container against `trusted`.
///
/// # Errors
///
/// - [`LicenseError::Malformed`] when a base64, envelope or JSON layer fails
///   to decode, with the failing stage.
/// - [`LicenseError::BadSignature`] when the envelope is not signed solely by
///   `trusted`.
/// - [`LicenseError::InvalidToken`] when the claims' token was not issued for
///   this container's private key.
pub fn decode_with_key(
    container: &LicenseContainer,
    trusted: &TrustedKey,
) -> LicenseResult<EntitlementRecord> {
    let result = verify(container, trusted);
    match &result {
        Ok(record) => debug!(
            key_id = %container.key_id,
            tier = %record.tier,
            expiration = %wire_timestamp(&record.expiration),
            "License verified"
        ),
        Err(e) => warn!(key_id = %container.key_id, "License rejected: {}", e),
    }
    result
}

fn verify(
    container: &LicenseContainer,
    trusted: &TrustedKey,
) -> LicenseResult<EntitlementRecord> {
    let envelope = STANDARD.decode(&container.authorization).map_err(|e| {
        LicenseError::malformed(
            LicenseStage::Authorization,
            format!("failed to decode key authorization: {e}"),
        )
    })?;

    let payload = verify_envelope(&envelope, trusted)?;

    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| LicenseError::malformed(LicenseStage::Claims, e))?;

    let secret = token::decode_url_safe(&container.private_key)
        .map_err(|e| LicenseError::malformed(LicenseStage::PrivateKey, e))?;
    if secret.is_empty() {
        return Err(LicenseError::malformed(
            LicenseStage::PrivateKey,
            "private key is empty",
        ));
    }

    let proof = token::decode_url_safe(&claims.token)
        .map_err(|e| LicenseError::malformed(LicenseStage::Token, e))?;
    if !token::verify_token(&secret, &wire_timestamp(&claims.expiration), &proof) {
        return Err(LicenseError::InvalidToken);
    }

    Ok(claims.into_record())
}
