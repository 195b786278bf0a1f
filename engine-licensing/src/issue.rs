//! License issuing on the authority side.

use crate::envelope::Envelope;
use crate::error::{LicenseError, LicenseResult, LicenseStage};
use crate::license::{LicenseContainer, wire_timestamp};
use crate::token;
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE},
};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use rsa::RsaPrivateKey;

/// Entitlements to be granted by a new license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseGrant {
    pub expiration: DateTime<FixedOffset>,
    pub max_engines: i64,
    pub license_type: String,
    pub tier: String,
    pub scanning_enabled: bool,
}

impl LicenseGrant {
    /// Signs this grant with the authority key and binds it to `secret`.
    ///
    /// The claims carry the full-precision expiration; the token is bound to
    /// its whole-second [`wire_timestamp`] form.
    pub fn issue(
        &self,
        authority: &RsaPrivateKey,
        secret: &[u8],
    ) -> LicenseResult<LicenseContainer> {
        if secret.is_empty() {
            return Err(LicenseError::malformed(
                LicenseStage::PrivateKey,
                "private key is empty",
            ));
        }

        let claims = serde_json::json!({
            "expiration": self.expiration.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            "token": token::bind_token(secret, &wire_timestamp(&self.expiration)),
            "maxEngines": self.max_engines,
            "licenseType": self.license_type,
            "tier": self.tier,
            "scanningEnabled": self.scanning_enabled,
        });
        let envelope = Envelope::sign(claims.to_string().as_bytes(), &[authority])?;
        let key_id = envelope
            .signatures
            .first()
            .map(|signature| signature.header.jwk.kid.clone())
            .unwrap_or_default();
        let envelope_json = envelope
            .to_vec()
            .map_err(|e| LicenseError::malformed(LicenseStage::Envelope, e))?;

        Ok(LicenseContainer {
            key_id,
            private_key: URL_SAFE.encode(secret),
            authorization: STANDARD.encode(envelope_json),
        })
    }
}
