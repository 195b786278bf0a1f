//! Symmetric token binding a license's claims to its private key.
//!
//! The authority issues each license with a random secret (`private_key`)
//! and embeds `base64url(HMAC-SHA256(secret, expiration))` in the signed
//! claims. Verifying the token proves that the claims were issued for this
//! particular secret, independently of the envelope signature.

use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose::URL_SAFE},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// base64url decoding that accepts both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn compute(secret: &[u8], message: &str) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(message.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Computes the base64url-encoded proof for `message` under `secret`.
#[must_use]
pub fn bind_token(secret: &[u8], message: &str) -> String {
    URL_SAFE.encode(compute(secret, message))
}

/// Checks a decoded candidate proof against `message` under `secret`.
///
/// The comparison runs in constant time over the raw MAC bytes.
#[must_use]
pub fn verify_token(secret: &[u8], message: &str, candidate: &[u8]) -> bool {
    let expected = compute(secret, message);
    expected.as_slice().ct_eq(candidate).into()
}

/// Decodes a base64url string, padded or not.
pub fn decode_url_safe(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_LENIENT.decode(text)
}
