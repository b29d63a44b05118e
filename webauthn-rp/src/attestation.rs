//! The attestation object envelope and the format verifier registry.
//!
//! The envelope is a three-entry CBOR map `{fmt, attStmt, authData}`. The
//! format tag selects one entry of a closed registry, realized as a sealed
//! sum: each registered format declares its statement fields as a typed
//! struct, decoded in a single walk of the statement map that rejects unknown
//! keys, and contributes a `verify` routine producing an [`AttestationType`]
//! and a [`TrustPath`]. The registry is fixed at compile time; there is no
//! run-time plugin surface.

use std::fmt;
use std::time::SystemTime;

use ciborium::value::Value;
use webauthn_rp_types::authenticator::{AttestedCredentialData, AuthenticatorData};

use crate::{
    cose::CredentialPublicKey,
    crypto::CoseAlgorithm,
    error::Error,
    x509::Certificate,
};

mod android_key;
mod android_safetynet;
mod fido_u2f;
mod packed;
mod tpm;

pub use android_key::AndroidKeyStatement;
pub use android_safetynet::AndroidSafetyNetStatement;
pub use fido_u2f::FidoU2fStatement;
pub use packed::PackedStatement;
pub use tpm::TpmStatement;

/// Default ceiling for an encoded attestation object.
pub const MAX_ATTESTATION_OBJECT_SIZE: usize = 64 * 1024;

/// The registered attestation statement formats.
///
/// <https://www.iana.org/assignments/webauthn/webauthn.xhtml>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationFormat {
    /// No attestation statement.
    None,
    /// FIDO U2F attestation, produced by migrated CTAP1 authenticators.
    FidoU2f,
    /// Packed attestation, the WebAuthn-native format.
    Packed,
    /// TPM attestation, produced by platform authenticators backed by a TPM.
    Tpm,
    /// Android Keystore attestation.
    AndroidKey,
    /// Android SafetyNet attestation.
    AndroidSafetyNet,
}

impl TryFrom<&str> for AttestationFormat {
    type Error = Error;

    fn try_from(fmt: &str) -> Result<Self, Error> {
        match fmt {
            "none" => Ok(Self::None),
            "fido-u2f" => Ok(Self::FidoU2f),
            "packed" => Ok(Self::Packed),
            "tpm" => Ok(Self::Tpm),
            "android-key" => Ok(Self::AndroidKey),
            "android-safetynet" => Ok(Self::AndroidSafetyNet),
            other => Err(Error::UnknownAttestationFormat(other.to_owned())),
        }
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::FidoU2f => "fido-u2f",
            Self::Packed => "packed",
            Self::Tpm => "tpm",
            Self::AndroidKey => "android-key",
            Self::AndroidSafetyNet => "android-safetynet",
        })
    }
}

/// How the authenticator vouched for the new credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationType {
    /// A signing certificate shared across a batch of authenticators.
    Basic,
    /// The credential's own private key signed the attestation.
    Self_,
    /// An attestation CA issued the attestation certificate.
    AttCa,
    /// An ECDAA issuer vouches for the credential; signature verification is
    /// the caller's ECDAA verifier's business.
    Ecdaa,
    /// No attestation was provided.
    None,
}

/// The material a caller uses to judge attestation trustworthiness.
#[derive(Debug, Clone, PartialEq)]
pub enum TrustPath {
    /// An X.509 chain, leaf first.
    X509Chain(Vec<Certificate>),
    /// An ECDAA key identifier.
    EcdaaKeyId(Vec<u8>),
    /// Nothing to judge: `none` or self attestation.
    Empty,
}

/// The outcome of verifying an attestation statement.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedAttestation {
    /// How the authenticator vouched for the credential.
    pub attestation_type: AttestationType,
    /// The material backing that claim.
    pub trust_path: TrustPath,
}

/// The decoded attestation statement, one variant per registered format.
#[derive(Debug, Clone, PartialEq)]
pub enum AttestationStatement {
    /// An empty statement.
    None,
    /// See [`FidoU2fStatement`].
    FidoU2f(FidoU2fStatement),
    /// See [`PackedStatement`].
    Packed(PackedStatement),
    /// See [`TpmStatement`].
    Tpm(TpmStatement),
    /// See [`AndroidKeyStatement`].
    AndroidKey(AndroidKeyStatement),
    /// See [`AndroidSafetyNetStatement`].
    AndroidSafetyNet(AndroidSafetyNetStatement),
}

/// Everything a format verifier consumes besides its own statement.
pub struct VerifyContext<'a> {
    /// The parsed authenticator data.
    pub auth_data: &'a AuthenticatorData,
    /// The raw authenticator data, part of most signed messages.
    pub auth_data_bytes: &'a [u8],
    /// SHA-256 of the client data JSON.
    pub client_data_hash: [u8; 32],
    /// The injected verification instant.
    pub now: SystemTime,
}

impl VerifyContext<'_> {
    pub(crate) fn attested(&self) -> Result<&AttestedCredentialData, Error> {
        self.auth_data
            .attested_credential_data
            .as_ref()
            .ok_or(Error::AttestedCredentialDataMissing)
    }

    pub(crate) fn credential_key(&self) -> Result<CredentialPublicKey, Error> {
        CredentialPublicKey::from_slice(self.attested()?.key_bytes())
    }

    /// The concatenation `authData || clientDataHash` signed by most formats.
    pub(crate) fn signed_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.auth_data_bytes.len() + 32);
        payload.extend_from_slice(self.auth_data_bytes);
        payload.extend_from_slice(&self.client_data_hash);
        payload
    }
}

/// A parsed attestation object.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    /// The format tag the envelope carried.
    pub fmt: AttestationFormat,
    /// The decoded format-specific statement.
    pub statement: AttestationStatement,
    /// The parsed authenticator data.
    pub auth_data: AuthenticatorData,
    /// The raw authenticator data bytes, retained for signature payloads.
    pub auth_data_bytes: Vec<u8>,
}

impl AttestationObject {
    /// Decode the outermost envelope and the format-specific statement.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() > MAX_ATTESTATION_OBJECT_SIZE {
            return Err(Error::MalformedAttestationObject(format!(
                "{} bytes exceeds the {MAX_ATTESTATION_OBJECT_SIZE} byte ceiling",
                bytes.len()
            )));
        }

        let value = webauthn_rp_types::cbor::from_slice_strict(bytes)?;
        let entries = value.as_map().ok_or_else(|| {
            Error::MalformedAttestationObject("attestation object is not a map".into())
        })?;

        let mut fmt = None;
        let mut att_stmt = None;
        let mut auth_data_bytes = None;
        for (key, value) in entries {
            match key.as_text() {
                Some("fmt") => {
                    fmt = Some(value.as_text().ok_or_else(|| {
                        Error::MalformedAttestationObject("fmt is not a text string".into())
                    })?);
                }
                Some("attStmt") => {
                    att_stmt = Some(value.as_map().ok_or_else(|| {
                        Error::MalformedAttestationObject("attStmt is not a map".into())
                    })?);
                }
                Some("authData") => {
                    auth_data_bytes = Some(value.as_bytes().ok_or_else(|| {
                        Error::MalformedAttestationObject("authData is not a byte string".into())
                    })?);
                }
                _ => {
                    return Err(Error::MalformedAttestationObject(format!(
                        "unexpected envelope key {key:?}"
                    )))
                }
            }
        }
        let fmt_tag = fmt.ok_or_else(|| Error::MalformedAttestationObject("missing fmt".into()))?;
        let att_stmt =
            att_stmt.ok_or_else(|| Error::MalformedAttestationObject("missing attStmt".into()))?;
        let auth_data_bytes = auth_data_bytes
            .ok_or_else(|| Error::MalformedAttestationObject("missing authData".into()))?
            .clone();

        let fmt = AttestationFormat::try_from(fmt_tag)?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
        let statement = match fmt {
            AttestationFormat::None => {
                if !att_stmt.is_empty() {
                    return Err(Error::MalformedAttestationObject(
                        "none attestation requires an empty statement".into(),
                    ));
                }
                AttestationStatement::None
            }
            AttestationFormat::FidoU2f => {
                AttestationStatement::FidoU2f(FidoU2fStatement::decode(att_stmt)?)
            }
            AttestationFormat::Packed => {
                AttestationStatement::Packed(PackedStatement::decode(att_stmt)?)
            }
            AttestationFormat::Tpm => AttestationStatement::Tpm(TpmStatement::decode(att_stmt)?),
            AttestationFormat::AndroidKey => {
                AttestationStatement::AndroidKey(AndroidKeyStatement::decode(att_stmt)?)
            }
            AttestationFormat::AndroidSafetyNet => {
                AttestationStatement::AndroidSafetyNet(AndroidSafetyNetStatement::decode(att_stmt)?)
            }
        };

        Ok(Self {
            fmt,
            statement,
            auth_data,
            auth_data_bytes,
        })
    }
}

impl AttestationStatement {
    /// Run the format's verification procedure.
    pub fn verify(&self, ctx: &VerifyContext<'_>) -> Result<VerifiedAttestation, Error> {
        match self {
            Self::None => Ok(VerifiedAttestation {
                attestation_type: AttestationType::None,
                trust_path: TrustPath::Empty,
            }),
            Self::FidoU2f(stmt) => stmt.verify(ctx),
            Self::Packed(stmt) => stmt.verify(ctx),
            Self::Tpm(stmt) => stmt.verify(ctx),
            Self::AndroidKey(stmt) => stmt.verify(ctx),
            Self::AndroidSafetyNet(stmt) => stmt.verify(ctx),
        }
    }
}

// ---- statement map helpers ----------------------------------------------
//
// Statement fields live in a CBOR map with text keys. Each decoder walks the
// map once into named slots and rejects keys its format does not declare.

type Entries = [(Value, Value)];

fn malformed(reason: impl Into<String>) -> Error {
    Error::MalformedAttestationObject(reason.into())
}

fn check_keys(entries: &Entries, allowed: &[&str]) -> Result<(), Error> {
    for (key, _) in entries {
        let name = key
            .as_text()
            .ok_or_else(|| malformed("statement key is not a text string"))?;
        if !allowed.contains(&name) {
            return Err(malformed(format!("unexpected statement field {name:?}")));
        }
    }
    Ok(())
}

fn find<'a>(entries: &'a Entries, name: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find_map(|(k, v)| (k.as_text() == Some(name)).then_some(v))
}

fn bytes_field(entries: &Entries, name: &str) -> Result<Vec<u8>, Error> {
    find(entries, name)
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| malformed(format!("missing byte string field {name:?}")))
}

fn opt_bytes_field(entries: &Entries, name: &str) -> Result<Option<Vec<u8>>, Error> {
    match find(entries, name) {
        None => Ok(None),
        Some(value) => value
            .as_bytes()
            .cloned()
            .map(Some)
            .ok_or_else(|| malformed(format!("field {name:?} is not a byte string"))),
    }
}

fn text_field(entries: &Entries, name: &str) -> Result<String, Error> {
    find(entries, name)
        .and_then(Value::as_text)
        .map(str::to_owned)
        .ok_or_else(|| malformed(format!("missing text field {name:?}")))
}

fn alg_field(entries: &Entries, name: &str) -> Result<CoseAlgorithm, Error> {
    let raw = find(entries, name)
        .and_then(Value::as_integer)
        .and_then(|i| i64::try_from(i).ok())
        .ok_or_else(|| malformed(format!("missing integer field {name:?}")))?;
    CoseAlgorithm::try_from(raw)
}

fn x5c_field(entries: &Entries, name: &str) -> Result<Option<Vec<Certificate>>, Error> {
    let Some(value) = find(entries, name) else {
        return Ok(None);
    };
    let array = value
        .as_array()
        .ok_or_else(|| malformed(format!("field {name:?} is not an array")))?;
    if array.is_empty() {
        return Err(malformed(format!("field {name:?} is empty")));
    }
    array
        .iter()
        .map(|item| {
            item.as_bytes()
                .ok_or_else(|| malformed(format!("{name:?} entry is not a byte string")))
                .and_then(|der| Certificate::from_der(der))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(fmt: &str, stmt: Value) -> Vec<u8> {
        // 37 zero bytes parse as authenticator data with no flags
        let auth_data = vec![0u8; 37];
        let value = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(fmt.into())),
            (Value::Text("attStmt".into()), stmt),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn none_format_with_empty_statement_parses() {
        let object = AttestationObject::parse(&envelope("none", Value::Map(vec![]))).unwrap();
        assert_eq!(object.fmt, AttestationFormat::None);
        assert_eq!(object.statement, AttestationStatement::None);
    }

    #[test]
    fn none_format_with_fields_is_rejected() {
        let stmt = Value::Map(vec![(Value::Text("sig".into()), Value::Bytes(vec![1]))]);
        AttestationObject::parse(&envelope("none", stmt)).unwrap_err();
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(matches!(
            AttestationObject::parse(&envelope("apple", Value::Map(vec![]))),
            Err(Error::UnknownAttestationFormat(f)) if f == "apple"
        ));
    }

    #[test]
    fn unknown_envelope_key_is_rejected() {
        let value = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(vec![0u8; 37])),
            (Value::Text("extra".into()), Value::Integer(1.into())),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();
        assert!(matches!(
            AttestationObject::parse(&bytes),
            Err(Error::MalformedAttestationObject(_))
        ));
    }

    #[test]
    fn oversize_input_is_rejected() {
        let bytes = vec![0u8; MAX_ATTESTATION_OBJECT_SIZE + 1];
        assert!(matches!(
            AttestationObject::parse(&bytes),
            Err(Error::MalformedAttestationObject(_))
        ));
    }
}
