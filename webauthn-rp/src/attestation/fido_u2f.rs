//! FIDO U2F attestation.
//!
//! Produced by CTAP1 authenticators surfaced through WebAuthn. The signed
//! message is the registration data layout from the U2F raw message format,
//! reassembled from WebAuthn fields, and the only algorithm in play is
//! ECDSA-P256-SHA256.
//!
//! <https://w3c.github.io/webauthn/#sctn-fido-u2f-attestation>

use crate::{
    attestation::{
        bytes_field, check_keys, malformed, x5c_field, AttestationType, TrustPath,
        VerifiedAttestation, VerifyContext,
    },
    crypto::CoseAlgorithm,
    error::Error,
    x509::Certificate,
};

/// The `fido-u2f` statement: a single attestation certificate and a signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FidoU2fStatement {
    /// The batch attestation certificate.
    pub attestation_certificate: Certificate,
    /// DER encoded ECDSA signature over the U2F registration layout.
    pub sig: Vec<u8>,
}

impl FidoU2fStatement {
    pub(crate) fn decode(entries: &[(ciborium::value::Value, ciborium::value::Value)]) -> Result<Self, Error> {
        check_keys(entries, &["x5c", "sig"])?;
        let mut x5c = x5c_field(entries, "x5c")?
            .ok_or_else(|| malformed("missing certificate array \"x5c\""))?;
        if x5c.len() != 1 {
            return Err(malformed(format!(
                "fido-u2f requires exactly one certificate, got {}",
                x5c.len()
            )));
        }
        Ok(Self {
            // SAFETY: length checked above.
            attestation_certificate: x5c.pop().unwrap(),
            sig: bytes_field(entries, "sig")?,
        })
    }

    pub(crate) fn verify(&self, ctx: &VerifyContext<'_>) -> Result<VerifiedAttestation, Error> {
        let attested = ctx.attested()?;
        // publicKeyU2F is the uncompressed point of the credential key, which
        // must therefore be EC2 on P-256.
        let public_key_u2f = ctx.credential_key()?.uncompressed_point()?;

        // The U2F registration signature base:
        // 0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F
        let mut message = Vec::with_capacity(1 + 32 + 32 + attested.credential_id().len() + 65);
        message.push(0x00);
        message.extend_from_slice(ctx.auth_data.rp_id_hash());
        message.extend_from_slice(&ctx.client_data_hash);
        message.extend_from_slice(attested.credential_id());
        message.extend_from_slice(&public_key_u2f);

        self.attestation_certificate
            .verifying_key(CoseAlgorithm::Es256)?
            .verify(CoseAlgorithm::Es256, &message, &self.sig)?;

        Ok(VerifiedAttestation {
            attestation_type: AttestationType::Basic,
            trust_path: TrustPath::X509Chain(vec![self.attestation_certificate.clone()]),
        })
    }
}
