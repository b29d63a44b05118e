//! Android SafetyNet attestation.
//!
//! The statement wraps a Google-signed JWS whose payload attests device
//! integrity. Verification checks the JWS signature against the leaf
//! certificate in its header, pins the leaf hostname, and binds the payload
//! nonce to the ceremony via `SHA-256(authData || clientDataHash)`.
//!
//! <https://w3c.github.io/webauthn/#sctn-android-safetynet-attestation>

use std::time::UNIX_EPOCH;

use p256::ecdsa::signature::DigestVerifier;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use webauthn_rp_types::encoding;

use crate::{
    attestation::{
        bytes_field, check_keys, text_field, AttestationType, TrustPath, VerifiedAttestation,
        VerifyContext,
    },
    crypto::{CoseAlgorithm, VerifyingKey},
    error::Error,
    x509::Certificate,
};

/// The hostname Google issues SafetyNet attestation certificates to.
const ATTEST_HOSTNAME: &str = "attest.android.com";

/// Maximum accepted age of the SafetyNet response relative to `now()`.
const MAX_RESPONSE_AGE_MS: u64 = 60_000;

/// The `android-safetynet` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct AndroidSafetyNetStatement {
    /// The Google Play services version that produced the response.
    pub ver: String,
    /// The JWS bytes of the SafetyNet API response.
    pub response: Vec<u8>,
}

#[derive(Deserialize)]
struct JwsHeader {
    alg: String,
    x5c: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JwsPayload {
    nonce: String,
    timestamp_ms: u64,
    #[serde(default)]
    cts_profile_match: bool,
}

impl AndroidSafetyNetStatement {
    pub(crate) fn decode(
        entries: &[(ciborium::value::Value, ciborium::value::Value)],
    ) -> Result<Self, Error> {
        check_keys(entries, &["ver", "response"])?;
        let ver = text_field(entries, "ver")?;
        if ver.is_empty() {
            return Err(Error::SafetyNetResponseInvalid("empty version".into()));
        }
        Ok(Self {
            ver,
            response: bytes_field(entries, "response")?,
        })
    }

    pub(crate) fn verify(&self, ctx: &VerifyContext<'_>) -> Result<VerifiedAttestation, Error> {
        let invalid = |reason: &str| Error::SafetyNetResponseInvalid(reason.into());

        let response = std::str::from_utf8(&self.response)
            .map_err(|_| invalid("response is not UTF-8"))?;
        let mut parts = response.split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("response is not a three-part JWS"));
        };

        let header_bytes =
            encoding::try_from_base64url(header_b64).ok_or(Error::MalformedBase64)?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| Error::MalformedJson(e.to_string()))?;

        let chain = header
            .x5c
            .iter()
            .map(|cert_b64| {
                let der = encoding::try_from_any_base64(cert_b64).ok_or(Error::MalformedBase64)?;
                Certificate::from_der(&der)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let leaf = chain
            .first()
            .ok_or_else(|| invalid("JWS header has no certificates"))?;

        if leaf.subject_common_name()?.as_deref() != Some(ATTEST_HOSTNAME) {
            return Err(invalid("leaf certificate is not for attest.android.com"));
        }

        let signed = format!("{header_b64}.{payload_b64}");
        let signature = encoding::try_from_base64url(sig_b64).ok_or(Error::MalformedBase64)?;
        verify_jws_signature(leaf, &header.alg, signed.as_bytes(), &signature)?;

        let payload_bytes =
            encoding::try_from_base64url(payload_b64).ok_or(Error::MalformedBase64)?;
        let payload: JwsPayload = serde_json::from_slice(&payload_bytes)
            .map_err(|e| Error::MalformedJson(e.to_string()))?;

        let expected_nonce = Sha256::digest(ctx.signed_payload());
        let nonce =
            encoding::try_from_any_base64(&payload.nonce).ok_or(Error::MalformedBase64)?;
        if nonce != expected_nonce.as_slice() {
            return Err(invalid("nonce does not bind the ceremony"));
        }

        if !payload.cts_profile_match {
            return Err(invalid("ctsProfileMatch is false"));
        }

        let now_ms = ctx
            .now
            .duration_since(UNIX_EPOCH)
            .map_err(|_| invalid("clock is before the unix epoch"))?
            .as_millis() as u64;
        if payload.timestamp_ms > now_ms {
            return Err(invalid("response timestamp is in the future"));
        }
        if now_ms - payload.timestamp_ms > MAX_RESPONSE_AGE_MS {
            return Err(invalid("response timestamp is too old"));
        }

        Ok(VerifiedAttestation {
            attestation_type: AttestationType::Basic,
            trust_path: TrustPath::X509Chain(chain),
        })
    }
}

/// JWS signatures use fixed-size ECDSA encoding, unlike the DER encoding in
/// the rest of WebAuthn, so ES256 is handled directly here.
fn verify_jws_signature(
    leaf: &Certificate,
    alg: &str,
    message: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    match alg {
        "RS256" => leaf
            .verifying_key(CoseAlgorithm::Rs256)?
            .verify(CoseAlgorithm::Rs256, message, signature),
        "ES256" => {
            let VerifyingKey::Es256(key) = leaf.verifying_key(CoseAlgorithm::Es256)? else {
                return Err(Error::KeyTypeMismatch);
            };
            let sig = p256::ecdsa::Signature::from_slice(signature)
                .map_err(|_| Error::SignatureInvalid)?;
            key.verify_digest(Sha256::new().chain_update(message), &sig)
                .map_err(|_| Error::SignatureInvalid)
        }
        other => Err(Error::SafetyNetResponseInvalid(format!(
            "unsupported JWS algorithm {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_jws_is_rejected() {
        let stmt = AndroidSafetyNetStatement {
            ver: "14366018".into(),
            response: b"only.two".to_vec(),
        };
        let auth_data_bytes = vec![0u8; 37];
        let auth_data =
            webauthn_rp_types::authenticator::AuthenticatorData::parse(&auth_data_bytes).unwrap();
        let ctx = VerifyContext {
            auth_data: &auth_data,
            auth_data_bytes: &auth_data_bytes,
            client_data_hash: [0; 32],
            now: UNIX_EPOCH,
        };
        assert!(matches!(
            stmt.verify(&ctx),
            Err(Error::SafetyNetResponseInvalid(_))
        ));
    }
}
