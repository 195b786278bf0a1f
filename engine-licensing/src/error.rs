//! Error types for license verification and distribution.

use crate::envelope::EnvelopeError;
use std::fmt;
use thiserror::Error;

/// The decoding layer at which a license was found to be malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LicenseStage {
    /// The license container JSON.
    Container,
    /// The base64 `authorization` field.
    Authorization,
    /// The signed envelope structure.
    Envelope,
    /// The claims payload inside the envelope.
    Claims,
    /// The base64url `private_key` field.
    PrivateKey,
    /// The base64url `token` claim.
    Token,
}

impl fmt::Display for LicenseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Container => "container",
            Self::Authorization => "authorization",
            Self::Envelope => "envelope",
            Self::Claims => "claims",
            Self::PrivateKey => "private key",
            Self::Token => "token",
        };
        f.write_str(name)
    }
}

/// The placement step that failed while distributing a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementStage {
    /// Listing existing versioned artifacts.
    ListVersions,
    /// Creating the new versioned artifact.
    CreateArtifact,
    /// Writing the standalone license file.
    WriteFile,
}

impl fmt::Display for PlacementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListVersions => "list versions",
            Self::CreateArtifact => "create artifact",
            Self::WriteFile => "write file",
        };
        f.write_str(name)
    }
}

/// Licensing errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// A base64, envelope, or JSON layer could not be decoded.
    #[error("malformed license ({stage}): {reason}")]
    Malformed { stage: LicenseStage, reason: String },

    /// The envelope signer set is not exactly the trusted authority key.
    #[error("license signature rejected: {0}")]
    BadSignature(String),

    /// The token does not bind the claims to the license secret.
    #[error("license token does not match its claims")]
    InvalidToken,

    /// The embedded authority key could not be loaded.
    #[error("trusted license key unavailable: {0}")]
    TrustedKey(String),

    /// Persisting the license failed.
    #[error("license distribution failed ({stage}): {reason}")]
    DistributionFailed { stage: PlacementStage, reason: String },
}

impl LicenseError {
    pub(crate) fn malformed(stage: LicenseStage, reason: impl fmt::Display) -> Self {
        Self::Malformed {
            stage,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn distribution(stage: PlacementStage, reason: impl fmt::Display) -> Self {
        Self::DistributionFailed {
            stage,
            reason: reason.to_string(),
        }
    }

    /// Returns true if the license itself is corrupt or untrusted.
    #[must_use]
    pub fn is_untrusted(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. } | Self::BadSignature(_) | Self::InvalidToken
        )
    }

    /// Returns true if the failure came from the storage backend.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::DistributionFailed { .. })
    }

    /// Returns the decoding stage for malformed licenses.
    #[must_use]
    pub fn license_stage(&self) -> Option<LicenseStage> {
        match self {
            Self::Malformed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<EnvelopeError> for LicenseError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Malformed(reason) => Self::Malformed {
                stage: LicenseStage::Envelope,
                reason,
            },
            EnvelopeError::BadSignature(reason) => Self::BadSignature(reason),
        }
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
