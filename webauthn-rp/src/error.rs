//! Error types produced by WebAuthn verification.

use std::fmt;

use webauthn_rp_types::{authenticator::AuthDataError, cbor::CborError};

/// Errors produced by registration and authentication verification.
///
/// Verification fails fast: the first failed check wins and no partial result
/// is produced. Variants carry a short human readable reason and, where the
/// failure maps to a position in an input buffer, a byte offset.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A JSON payload (client data, SafetyNet JWS body) did not parse.
    MalformedJson(String),

    /// A field that should hold base64(url) data did not decode.
    MalformedBase64,

    /// A CBOR item was syntactically or semantically invalid.
    MalformedCbor {
        /// Offset into the CBOR input where decoding gave up, when known.
        offset: Option<usize>,
        /// Short human readable reason.
        reason: String,
    },

    /// The authenticator data blob violated its fixed layout.
    MalformedAuthData {
        /// Offset into the authenticator data.
        offset: usize,
        /// Short human readable reason.
        reason: String,
    },

    /// The outer attestation object was not the expected three-entry map, or
    /// a format statement had missing, unknown or ill-typed fields.
    MalformedAttestationObject(String),

    /// A COSE algorithm identifier outside the supported set.
    UnsupportedAlgorithm(i64),

    /// A signature did not verify.
    SignatureInvalid,

    /// An algorithm was paired with key material of the wrong type, e.g.
    /// ES256 with an RSA key.
    KeyTypeMismatch,

    /// The client data `type` did not match the ceremony being performed.
    ClientDataTypeMismatch,

    /// The challenge in the client data did not equal the expected challenge.
    ChallengeMismatch,

    /// The client data origin is not in the allowed origin set.
    OriginMismatch {
        /// The origin the client reported.
        origin: String,
    },

    /// The RP ID hash in the authenticator data did not match the expected
    /// RP ID.
    RpIdMismatch,

    /// The user presence flag was not set.
    UserPresenceMissing,

    /// User verification was required by policy but the UV flag was not set.
    UserVerificationMissing,

    /// The signature counter did not increase with respect to the stored one.
    CounterRegressed {
        /// The counter stored from the previous ceremony.
        stored: u32,
        /// The counter the authenticator just reported.
        received: u32,
    },

    /// Registration requires attested credential data, which was absent.
    AttestedCredentialDataMissing,

    /// The attestation trust path could not be validated against the injected
    /// trust anchors.
    AttestationUntrusted(String),

    /// A certificate in the trust path is outside its validity window.
    CertificateExpired,

    /// A certificate could not be parsed or violated profile requirements.
    CertificateInvalid(String),

    /// The attestation object carried a format identifier outside the
    /// registry.
    UnknownAttestationFormat(String),

    /// The attestation verified but the caller's policy does not accept its
    /// attestation type.
    AttestationPolicyRejected(&'static str),

    /// The TPM `certInfo` or `pubArea` structure failed validation.
    TpmCertInfoInvalid(String),

    /// The android-key attestation extension was absent or failed validation.
    AndroidKeyExtensionInvalid(String),

    /// The SafetyNet JWS response failed validation.
    SafetyNetResponseInvalid(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedJson(reason) => write!(f, "malformed JSON: {reason}"),
            Error::MalformedBase64 => f.write_str("malformed base64 data"),
            Error::MalformedCbor { offset, reason } => match offset {
                Some(offset) => write!(f, "malformed CBOR: {reason} at offset {offset}"),
                None => write!(f, "malformed CBOR: {reason}"),
            },
            Error::MalformedAuthData { offset, reason } => {
                write!(f, "malformed authenticator data: {reason} at offset {offset}")
            }
            Error::MalformedAttestationObject(reason) => {
                write!(f, "malformed attestation object: {reason}")
            }
            Error::UnsupportedAlgorithm(alg) => {
                write!(f, "unsupported COSE algorithm {alg}")
            }
            Error::SignatureInvalid => f.write_str("signature verification failed"),
            Error::KeyTypeMismatch => f.write_str("algorithm does not match key type"),
            Error::ClientDataTypeMismatch => {
                f.write_str("client data type does not match the ceremony")
            }
            Error::ChallengeMismatch => f.write_str("challenge does not match"),
            Error::OriginMismatch { origin } => {
                write!(f, "origin {origin} is not an allowed origin")
            }
            Error::RpIdMismatch => f.write_str("RP ID hash does not match"),
            Error::UserPresenceMissing => f.write_str("user presence flag not set"),
            Error::UserVerificationMissing => {
                f.write_str("user verification required but flag not set")
            }
            Error::CounterRegressed { stored, received } => write!(
                f,
                "signature counter regressed: stored {stored}, received {received}"
            ),
            Error::AttestedCredentialDataMissing => {
                f.write_str("attested credential data missing")
            }
            Error::AttestationUntrusted(reason) => {
                write!(f, "attestation is not trusted: {reason}")
            }
            Error::CertificateExpired => f.write_str("certificate has expired"),
            Error::CertificateInvalid(reason) => write!(f, "invalid certificate: {reason}"),
            Error::UnknownAttestationFormat(fmt_id) => {
                write!(f, "unknown attestation format {fmt_id:?}")
            }
            Error::AttestationPolicyRejected(reason) => {
                write!(f, "attestation rejected by policy: {reason}")
            }
            Error::TpmCertInfoInvalid(reason) => write!(f, "invalid TPM attestation: {reason}"),
            Error::AndroidKeyExtensionInvalid(reason) => {
                write!(f, "invalid android-key attestation: {reason}")
            }
            Error::SafetyNetResponseInvalid(reason) => {
                write!(f, "invalid SafetyNet response: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<CborError> for Error {
    fn from(err: CborError) -> Self {
        Error::MalformedCbor {
            offset: err.offset,
            reason: err.reason,
        }
    }
}

impl From<AuthDataError> for Error {
    fn from(err: AuthDataError) -> Self {
        Error::MalformedAuthData {
            offset: err.offset,
            reason: err.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn expired_certificate_reason_is_stable() {
        // Callers match on this substring; it mirrors the wording used by
        // common X.509 tooling.
        assert!(Error::CertificateExpired
            .to_string()
            .contains("certificate has expired"));
    }
}
