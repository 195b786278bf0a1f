//! License verification and distribution for the enterprise engine.
//!
//! This crate handles:
//! - Verifying license files downloaded from the store
//! - Issuing signed, token-bound licenses on the authority side
//! - Storing licenses on a standalone host or as versioned cluster configs
//!
//! # Verification
//!
//! A license file is a JSON container holding a per-license secret
//! (`private_key`) and a signed envelope (`authorization`). A license is
//! trusted only when both layers check out:
//!
//! 1. The envelope, a libtrust JSON Web Signature, carries exactly one RSA
//!    signature, made by the license authority key embedded in this crate.
//! 2. The claims' `token` equals `HMAC-SHA256(private_key, expiration)`,
//!    binding the signed claims to the secret delivered with them.
//!
//! # Distribution
//!
//! Licenses are stored as raw bytes. On a standalone host they go to
//! `docker.lic` under a root directory; in a cluster each install creates a
//! new immutable config `com.docker.license-N`, keeping prior versions.

mod envelope;
mod error;
mod issue;
mod key;
mod license;
mod placement;
mod subscription;
mod token;
mod version;

pub use envelope::{
    ENVELOPE_ALGORITHM, Envelope, EnvelopeError, EnvelopeSignature, PublicJwk, SignatureHeader,
    verify_envelope,
};
pub use error::{LicenseError, LicenseResult, LicenseStage, PlacementStage};
pub use issue::LicenseGrant;
pub use key::{KeyId, TrustedKey, trusted_key};
pub use license::{
    EntitlementRecord, LicenseContainer, decode, decode_with_key, parse_license,
    parse_license_with_key, wire_timestamp,
};
pub use placement::{
    BackendError, ClusterConfigSink, ClusterProbe, ConfigStore, Distributor, HostFileSink,
    LICENSE_FILE_MODE, LICENSE_FILENAME, LICENSE_NAME_PREFIX, LicenseArtifact, LicenseSink,
    Placement, PlacementConfig, place,
};
pub use subscription::{
    ENGINE_PRODUCT_PREFIX, EXPIRED_STATE, Eusa, SubscriptionDescriptor, SubscriptionSource,
    TRIAL_PRODUCT_ID, TRIAL_RATE_PLAN, TrialRequest, available_subscriptions,
    eligible_subscriptions, generate_trial_license,
};
pub use token::{bind_token, decode_url_safe, verify_token};
pub use version::{VERSION_SEPARATOR, VersionedName, next_version, parse_version};
