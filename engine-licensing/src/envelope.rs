//! Signed license envelopes.
//!
//! An envelope is a libtrust JSON Web Signature: a base64url payload and one
//! or more signatures. Each signature entry embeds the signer's RSA public
//! key as a JWK together with its key identifier, and signs
//! `protected + "." + payload` with RSASSA-PKCS1-v1_5.
//!
//! A license envelope is only trusted when it carries exactly one valid
//! signature and that signature was made by the license authority key.

use crate::key::{KeyId, TrustedKey};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{SecondsFormat, Utc};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;

/// Signature algorithm used when signing envelopes.
pub const ENVELOPE_ALGORITHM: &str = "RS256";

const JWK_KEY_TYPE: &str = "RSA";

/// Envelope verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The envelope could not be parsed.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// A signature is invalid or the signer set is not trusted.
    #[error("bad signature: {0}")]
    BadSignature(String),
}

fn malformed(reason: impl std::fmt::Display) -> EnvelopeError {
    EnvelopeError::Malformed(reason.to_string())
}

/// A signed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// base64url (unpadded) payload bytes.
    pub payload: String,
    /// Signer entries.
    pub signatures: Vec<EnvelopeSignature>,
}

/// One signer entry of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvelopeSignature {
    /// Unprotected header carrying the signer's key.
    pub header: SignatureHeader,
    /// base64url RSASSA-PKCS1-v1_5 signature.
    pub signature: String,
    /// base64url protected header JSON, covered by the signature.
    pub protected: String,
}

/// Unprotected signature header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureHeader {
    pub jwk: PublicJwk,
    pub alg: String,
}

/// RSA public key in JWK form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublicJwk {
    pub kty: String,
    pub kid: String,
    /// base64url big-endian modulus.
    pub n: String,
    /// base64url big-endian public exponent.
    pub e: String,
}

impl PublicJwk {
    fn from_key(key: &RsaPublicKey) -> Result<Self, EnvelopeError> {
        let kid = KeyId::of(key).map_err(|e| malformed(format!("cannot encode key: {e}")))?;
        Ok(Self {
            kty: JWK_KEY_TYPE.to_string(),
            kid: kid.to_string(),
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        })
    }

    fn to_key(&self) -> Result<RsaPublicKey, EnvelopeError> {
        if self.kty != JWK_KEY_TYPE {
            return Err(malformed(format!("unsupported key type {:?}", self.kty)));
        }
        let n = URL_SAFE_NO_PAD
            .decode(&self.n)
            .map_err(|e| malformed(format!("invalid modulus encoding: {e}")))?;
        let e = URL_SAFE_NO_PAD
            .decode(&self.e)
            .map_err(|e| malformed(format!("invalid exponent encoding: {e}")))?;
        RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
            .map_err(|e| malformed(format!("invalid RSA public key: {e}")))
    }
}

/// Protected header written by libtrust signers; only its encoding is signed.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProtectedHeader {
    format_length: usize,
    format_tail: String,
    time: String,
}

impl ProtectedHeader {
    /// Splits `payload` before the whitespace preceding its closing brace.
    fn for_payload(payload: &[u8]) -> Self {
        let close = payload
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .unwrap_or(0);
        let format_length = payload[..close]
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        Self {
            format_length,
            format_tail: URL_SAFE_NO_PAD.encode(&payload[format_length..]),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl Envelope {
    /// Signs `payload` with every key in `signers`, in order.
    pub fn sign(payload: &[u8], signers: &[&RsaPrivateKey]) -> Result<Self, EnvelopeError> {
        let protected_json = serde_json::to_vec(&ProtectedHeader::for_payload(payload))
            .map_err(|e| malformed(format!("cannot encode protected header: {e}")))?;
        let protected = URL_SAFE_NO_PAD.encode(protected_json);
        let payload = URL_SAFE_NO_PAD.encode(payload);
        let signatures = signers
            .iter()
            .map(|key| EnvelopeSignature::sign(&protected, &payload, key))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            payload,
            signatures,
        })
    }

    /// Parses an envelope from its JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(malformed)
    }

    /// Serializes the envelope to JSON bytes.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decodes the payload bytes without checking any signature.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        URL_SAFE_NO_PAD
            .decode(&self.payload)
            .map_err(|e| malformed(format!("invalid payload encoding: {e}")))
    }

    /// Verifies every signature and returns the signers' key identifiers.
    pub fn verify_signatures(&self) -> Result<Vec<KeyId>, EnvelopeError> {
        self.signatures
            .iter()
            .map(|entry| entry.verify(&self.payload))
            .collect()
    }
}

impl EnvelopeSignature {
    fn sign(protected: &str, payload: &str, key: &RsaPrivateKey) -> Result<Self, EnvelopeError> {
        let jwk = PublicJwk::from_key(&key.to_public_key())?;
        let signature = SigningKey::<Sha256>::new(key.clone())
            .try_sign(format!("{protected}.{payload}").as_bytes())
            .map_err(|e| malformed(format!("signing failed: {e}")))?;

        Ok(Self {
            header: SignatureHeader {
                jwk,
                alg: ENVELOPE_ALGORITHM.to_string(),
            },
            signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
            protected: protected.to_string(),
        })
    }

    /// Verifies this entry over `payload` with the key it carries.
    fn verify(&self, payload: &str) -> Result<KeyId, EnvelopeError> {
        let jwk = &self.header.jwk;
        let key = jwk.to_key()?;

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(&self.signature)
            .map_err(|e| malformed(format!("invalid signature encoding: {e}")))?;
        let signature = Signature::try_from(sig_bytes.as_slice())
            .map_err(|e| malformed(format!("invalid signature: {e}")))?;

        let kid = KeyId::of(&key).map_err(|e| malformed(format!("cannot encode key: {e}")))?;
        if jwk.kid != kid.as_str() {
            return Err(EnvelopeError::BadSignature(format!(
                "header key id {} does not match embedded key {kid}",
                jwk.kid
            )));
        }

        let message = format!("{}.{payload}", self.protected);
        let message = message.as_bytes();
        let verified = match self.header.alg.as_str() {
            "RS256" => VerifyingKey::<Sha256>::new(key).verify(message, &signature),
            "RS384" => VerifyingKey::<Sha384>::new(key).verify(message, &signature),
            "RS512" => VerifyingKey::<Sha512>::new(key).verify(message, &signature),
            other => return Err(malformed(format!("unsupported algorithm {other:?}"))),
        };
        verified.map_err(|_| {
            EnvelopeError::BadSignature(format!("signature by {kid} failed verification"))
        })?;
        Ok(kid)
    }
}

/// Verifies an envelope against the trusted authority key and returns the
/// signed payload bytes, unparsed.
///
/// # Errors
///
/// [`EnvelopeError::Malformed`] if the envelope cannot be parsed, and
/// [`EnvelopeError::BadSignature`] unless exactly one signature verifies and
/// its signer is `trusted`.
pub fn verify_envelope(bytes: &[u8], trusted: &TrustedKey) -> Result<Vec<u8>, EnvelopeError> {
    let envelope = Envelope::from_slice(bytes)?;
    let payload = envelope.payload_bytes()?;
    let signers = envelope.verify_signatures()?;

    match signers.as_slice() {
        [signer] if signer == trusted.key_id() => Ok(payload),
        [signer] => Err(EnvelopeError::BadSignature(format!(
            "envelope signed by unrecognized key {signer}"
        ))),
        [] => Err(EnvelopeError::BadSignature(
            "envelope carries no signatures".to_string(),
        )),
        many => Err(EnvelopeError::BadSignature(format!(
            "expected exactly one signer, found {}",
            many.len()
        ))),
    }
}
