//! The license authority's public key and key identifiers.
//!
//! The production key ships inside the binary as a base64-wrapped PEM with a
//! `kid` header. It is parsed lazily on first use so that loading the library
//! has no side effects; a parse failure is reported to every caller that needs
//! the key.

use crate::error::{LicenseError, LicenseResult};
use base64::{Engine, engine::general_purpose::STANDARD};
use rsa::RsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::LazyLock;

/// Public key of the production license server (base64 PEM).
const LICENSE_AUTHORITY_PUBLIC_KEY: &str = "LS0tLS1CRUdJTiBQVUJMSUMgS0VZLS0tLS0Ka2lkOiBKN0xEOjY3VlI6TDVIWjpVN0JBOjJPNEc6NEFMMzpPRjJOOkpIR0I6RUZUSDo1Q1ZROk1GRU86QUVJVAoKTUlJQ0lqQU5CZ2txaGtpRzl3MEJBUUVGQUFPQ0FnOEFNSUlDQ2dLQ0FnRUF5ZEl5K2xVN283UGNlWSs0K3MrQwpRNU9FZ0N5RjhDeEljUUlXdUs4NHBJaVpjaVk2NzMweUNZbndMU0tUbHcrVTZVQy9RUmVXUmlvTU5ORTVEczVUCllFWGJHRzZvbG0ycWRXYkJ3Y0NnKzJVVUgvT2NCOVd1UDZnUlBIcE1GTXN4RHpXd3ZheThKVXVIZ1lVTFVwbTEKSXYrbXE3bHA1blEvUnhyVDBLWlJBUVRZTEVNRWZHd20zaE1PL2dlTFBTK2hnS1B0SUhsa2c2L1djb3hUR29LUAo3OWQvd2FIWXhHTmw3V2hTbmVpQlN4YnBiUUFLazIxbGc3OThYYjd2WnlFQVRETXJSUjlNZUU2QWRqNUhKcFkzCkNveVJBUENtYUtHUkNLNHVvWlNvSXUwaEZWbEtVUHliYncwMDBHTyt3YTJLTjhVd2dJSW0waTVJMXVXOUdrcTQKempCeTV6aGdxdVVYYkc5YldQQU9ZcnE1UWE4MUR4R2NCbEp5SFlBcCtERFBFOVRHZzR6WW1YakpueFpxSEVkdQpHcWRldlo4WE1JMHVrZmtHSUkxNHdVT2lNSUlJclhsRWNCZi80Nkk4Z1FXRHp4eWNaZS9KR1grTEF1YXlYcnlyClVGZWhWTlVkWlVsOXdYTmFKQitrYUNxejVRd2FSOTNzR3crUVNmdEQwTnZMZTdDeU9IK0U2dmc2U3QvTmVUdmcKdjhZbmhDaVhJbFo4SE9mSXdOZTd0RUYvVWN6NU9iUHlrbTN0eWxyTlVqdDBWeUFtdHRhY1ZJMmlHaWhjVVBybQprNGxWSVo3VkQvTFNXK2k3eW9TdXJ0cHNQWGNlMnBLRElvMzBsSkdoTy8zS1VtbDJTVVpDcXpKMXlFbUtweXNICjVIRFc5Y3NJRkNBM2RlQWpmWlV2TjdVQ0F3RUFBUT09Ci0tLS0tRU5EIFBVQkxJQyBLRVktLS0tLQo=";

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";

static AUTHORITY_KEY: LazyLock<Result<TrustedKey, String>> = LazyLock::new(|| {
    TrustedKey::from_encoded_pem(LICENSE_AUTHORITY_PUBLIC_KEY).map_err(|e| e.to_string())
});

/// Returns the embedded production authority key.
///
/// # Errors
///
/// Returns [`LicenseError::TrustedKey`] if the embedded key cannot be parsed.
pub fn trusted_key() -> LicenseResult<&'static TrustedKey> {
    AUTHORITY_KEY
        .as_ref()
        .map_err(|reason| LicenseError::TrustedKey(reason.clone()))
}

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// RFC 4648 base32 without padding.
fn base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize]));
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(char::from(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize]));
    }
    out
}

/// Fingerprint identifying a signing key, as used in license envelopes.
///
/// The first 240 bits of SHA-256 over the key's DER `SubjectPublicKeyInfo`,
/// base32 encoded in twelve colon-separated groups: `J7LD:67VR:...:AEIT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(String);

impl KeyId {
    /// Computes the identifier of a DER-encoded `SubjectPublicKeyInfo`.
    #[must_use]
    pub fn from_spki_der(der: &[u8]) -> Self {
        let digest = Sha256::digest(der);
        let encoded = base32(&digest[..30]);
        let groups: Vec<&str> = encoded
            .as_bytes()
            .chunks(4)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        Self(groups.join(":"))
    }

    /// Computes the identifier of an RSA public key.
    pub fn of(key: &RsaPublicKey) -> Result<Self, rsa::pkcs8::spki::Error> {
        let der = key.to_public_key_der()?;
        Ok(Self::from_spki_der(der.as_bytes()))
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A public key whose signatures are accepted on license envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedKey {
    key: RsaPublicKey,
    id: KeyId,
}

impl TrustedKey {
    /// Trusts the given public key.
    pub fn from_public_key(key: RsaPublicKey) -> LicenseResult<Self> {
        let id = KeyId::of(&key)
            .map_err(|e| LicenseError::TrustedKey(format!("failed to encode public key: {e}")))?;
        Ok(Self { key, id })
    }

    /// Parses an RSA `SubjectPublicKeyInfo` PEM.
    ///
    /// Encapsulated headers are allowed. A `kid` header must name this key.
    pub fn from_pem(pem: &str) -> LicenseResult<Self> {
        let (der, kid_header) = split_pem(pem)?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| LicenseError::TrustedKey(format!("failed to parse public key: {e}")))?;
        let trusted = Self::from_public_key(key)?;

        if let Some(kid) = kid_header {
            if kid != trusted.id.as_str() {
                return Err(LicenseError::TrustedKey(format!(
                    "kid header {kid} does not match key {}",
                    trusted.id
                )));
            }
        }
        Ok(trusted)
    }

    /// Parses a PEM public key that has been wrapped in standard base64.
    pub fn from_encoded_pem(encoded: &str) -> LicenseResult<Self> {
        let pem_bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| LicenseError::TrustedKey(format!("failed to decode public key: {e}")))?;
        let pem = String::from_utf8(pem_bytes)
            .map_err(|e| LicenseError::TrustedKey(format!("public key is not UTF-8: {e}")))?;
        Self::from_pem(&pem)
    }

    /// Returns the underlying public key.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.key
    }

    /// Returns the key identifier.
    #[must_use]
    pub fn key_id(&self) -> &KeyId {
        &self.id
    }
}

/// Returns the DER body of a public key PEM and its `kid` header, if any.
fn split_pem(pem: &str) -> LicenseResult<(Vec<u8>, Option<String>)> {
    let mut lines = pem.lines().map(str::trim);
    if !lines.by_ref().any(|line| line == PEM_BEGIN) {
        return Err(LicenseError::TrustedKey("missing PEM begin marker".into()));
    }

    let mut body = String::new();
    let mut kid = None;
    let mut closed = false;
    for line in lines {
        if line == PEM_END {
            closed = true;
            break;
        }
        match line.split_once(':') {
            Some((name, value)) if name.trim() == "kid" => kid = Some(value.trim().to_string()),
            Some(_) => {}
            None => body.push_str(line),
        }
    }
    if !closed {
        return Err(LicenseError::TrustedKey("missing PEM end marker".into()));
    }

    let der = STANDARD
        .decode(body)
        .map_err(|e| LicenseError::TrustedKey(format!("invalid PEM body: {e}")))?;
    Ok((der, kid))
}
