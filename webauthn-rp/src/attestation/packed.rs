//! Packed attestation, the WebAuthn-native format.
//!
//! Three shapes share the statement: basic/AttCA attestation with an `x5c`
//! chain, ECDAA with an `ecdaaKeyId`, and self attestation with neither. The
//! signed message is `authData || clientDataHash` in every shape.
//!
//! <https://w3c.github.io/webauthn/#sctn-packed-attestation>

use x509_parser::x509::X509Version;

use crate::{
    attestation::{
        alg_field, bytes_field, check_keys, malformed, opt_bytes_field, x5c_field, AttestationType,
        TrustPath, VerifiedAttestation, VerifyContext,
    },
    crypto::CoseAlgorithm,
    error::Error,
    x509::Certificate,
};

/// `id-fido-gen-ce-aaguid`: 1.3.6.1.4.1.45724.1.1.4
const ID_FIDO_GEN_CE_AAGUID: &[u8] = &der_parser::oid!(raw 1.3.6.1.4.1.45724.1.1.4);

/// The `packed` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedStatement {
    /// The algorithm the signature was produced with.
    pub alg: CoseAlgorithm,
    /// The attestation signature over `authData || clientDataHash`.
    pub sig: Vec<u8>,
    /// The attestation certificate chain, leaf first, for basic and AttCA
    /// attestation.
    pub x5c: Option<Vec<Certificate>>,
    /// The ECDAA issuer key identifier, for ECDAA attestation.
    pub ecdaa_key_id: Option<Vec<u8>>,
}

impl PackedStatement {
    pub(crate) fn decode(
        entries: &[(ciborium::value::Value, ciborium::value::Value)],
    ) -> Result<Self, Error> {
        check_keys(entries, &["alg", "sig", "x5c", "ecdaaKeyId"])?;
        let stmt = Self {
            alg: alg_field(entries, "alg")?,
            sig: bytes_field(entries, "sig")?,
            x5c: x5c_field(entries, "x5c")?,
            ecdaa_key_id: opt_bytes_field(entries, "ecdaaKeyId")?,
        };
        if stmt.x5c.is_some() && stmt.ecdaa_key_id.is_some() {
            return Err(malformed("packed statement with both x5c and ecdaaKeyId"));
        }
        Ok(stmt)
    }

    pub(crate) fn verify(&self, ctx: &VerifyContext<'_>) -> Result<VerifiedAttestation, Error> {
        match (&self.x5c, &self.ecdaa_key_id) {
            (Some(x5c), None) => self.verify_x5c(x5c, ctx),
            (None, Some(key_id)) => {
                // The signature check belongs to an ECDAA verifier, which the
                // core treats as an external collaborator.
                Ok(VerifiedAttestation {
                    attestation_type: AttestationType::Ecdaa,
                    trust_path: TrustPath::EcdaaKeyId(key_id.clone()),
                })
            }
            (None, None) => self.verify_self(ctx),
            (Some(_), Some(_)) => unreachable!("rejected at decode"),
        }
    }

    fn verify_x5c(
        &self,
        x5c: &[Certificate],
        ctx: &VerifyContext<'_>,
    ) -> Result<VerifiedAttestation, Error> {
        for cert in x5c {
            cert.check_validity_at(ctx.now)?;
        }

        let leaf = &x5c[0];
        assert_attestation_cert_requirements(leaf)?;

        // The id-fido-gen-ce-aaguid extension, when present, must not be
        // critical and must carry the AAGUID of the attested credential.
        if let Some(ext) = leaf.extension(ID_FIDO_GEN_CE_AAGUID)? {
            if ext.critical {
                return Err(Error::CertificateInvalid(
                    "id-fido-gen-ce-aaguid must not be critical".into(),
                ));
            }
            let aaguid = octet_string_content(&ext.value)?;
            if aaguid != ctx.attested()?.aaguid.0 {
                return Err(Error::CertificateInvalid(
                    "certificate AAGUID does not match attested credential".into(),
                ));
            }
        }

        leaf.verifying_key(self.alg)?
            .verify(self.alg, &ctx.signed_payload(), &self.sig)?;

        // The statement cannot distinguish batch keys from CA-issued ones, so
        // x5c attestation reports Basic; the caller has the full chain to
        // judge harder.
        Ok(VerifiedAttestation {
            attestation_type: AttestationType::Basic,
            trust_path: TrustPath::X509Chain(x5c.to_vec()),
        })
    }

    fn verify_self(&self, ctx: &VerifyContext<'_>) -> Result<VerifiedAttestation, Error> {
        let key = ctx.credential_key()?;
        if key.alg != self.alg {
            return Err(Error::KeyTypeMismatch);
        }
        crate::crypto::VerifyingKey::from_credential(&key)?.verify(
            self.alg,
            &ctx.signed_payload(),
            &self.sig,
        )?;
        Ok(VerifiedAttestation {
            attestation_type: AttestationType::Self_,
            trust_path: TrustPath::Empty,
        })
    }
}

/// Packed attestation statement certificate requirements, WebAuthn §8.2.1.
fn assert_attestation_cert_requirements(leaf: &Certificate) -> Result<(), Error> {
    let cert = leaf.parse()?;

    // Version MUST be set to 3.
    if cert.version != X509Version::V3 {
        return Err(Error::CertificateInvalid(
            "attestation certificate is not X.509 v3".into(),
        ));
    }

    // Subject: country, organization, a common name, and the literal
    // organizational unit "Authenticator Attestation".
    let subject = cert.subject();
    if subject.iter_country().next().is_none()
        || subject.iter_organization().next().is_none()
        || subject.iter_common_name().next().is_none()
    {
        return Err(Error::CertificateInvalid(
            "attestation certificate subject is incomplete".into(),
        ));
    }
    let ou_ok = subject
        .iter_organizational_unit()
        .next()
        .and_then(|ou| ou.as_str().ok())
        .map(|ou| ou == "Authenticator Attestation")
        .unwrap_or(false);
    if !ou_ok {
        return Err(Error::CertificateInvalid(
            "attestation certificate OU is not \"Authenticator Attestation\"".into(),
        ));
    }

    // The Basic Constraints extension MUST have the CA component set to false.
    match cert.basic_constraints() {
        Ok(Some(bc)) if !bc.value.ca => Ok(()),
        _ => Err(Error::CertificateInvalid(
            "attestation certificate must not be a CA".into(),
        )),
    }
}

/// The content of a DER OCTET STRING.
fn octet_string_content(value: &[u8]) -> Result<Vec<u8>, Error> {
    match der_parser::der::parse_der(value) {
        Ok((_, obj)) => match obj.content {
            der_parser::ber::BerObjectContent::OctetString(content) => Ok(content.to_vec()),
            _ => Err(Error::CertificateInvalid(
                "extension is not an OCTET STRING".into(),
            )),
        },
        Err(_) => Err(Error::CertificateInvalid(
            "extension value is not valid DER".into(),
        )),
    }
}
