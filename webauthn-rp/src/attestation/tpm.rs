//! TPM attestation.
//!
//! The statement wraps two TPM 2.0 structures: `pubArea` (a `TPMT_PUBLIC`
//! describing the attested key) and `certInfo` (a `TPMS_ATTEST` the TPM
//! signed with its attestation identity key). Verification cross-checks the
//! credential key against `pubArea`, the ceremony hash against `certInfo`'s
//! `extraData`, the `pubArea` digest against the attested name, and finally
//! the signature over `certInfo` under the AIK certificate.
//!
//! <https://w3c.github.io/webauthn/#sctn-tpm-attestation>

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_parser::{extensions::GeneralName, x509::X509Version};

use crate::{
    attestation::{
        alg_field, bytes_field, check_keys, malformed, text_field, x5c_field, AttestationType,
        TrustPath, VerifiedAttestation, VerifyContext,
    },
    cose::KeyMaterial,
    crypto::CoseAlgorithm,
    error::Error,
    x509::Certificate,
};

const TPM_GENERATED: u32 = 0xff54_4347;
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_NULL: u16 = 0x0010;
const TPM_ALG_ECC: u16 = 0x0023;

const TPM_ALG_SHA1: u16 = 0x0004;
const TPM_ALG_SHA256: u16 = 0x000b;
const TPM_ALG_SHA384: u16 = 0x000c;
const TPM_ALG_SHA512: u16 = 0x000d;

const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

/// `tcg-kp-AIKCertificate`: 2.23.133.8.3
const TCG_KP_AIK_CERTIFICATE: &[u8] = &der_parser::oid!(raw 2.23.133 .8 .3);
/// `tcg-at-tpmManufacturer`: 2.23.133.2.1
const TCG_AT_TPM_MANUFACTURER: &[u8] = &der_parser::oid!(raw 2.23.133 .2 .1);

/// The `tpm` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct TpmStatement {
    /// The algorithm the signature over `certInfo` was produced with.
    pub alg: CoseAlgorithm,
    /// The AIK certificate chain, leaf first.
    pub x5c: Vec<Certificate>,
    /// The signature over `certInfo`.
    pub sig: Vec<u8>,
    /// The raw `TPMS_ATTEST` structure.
    pub cert_info: Vec<u8>,
    /// The raw `TPMT_PUBLIC` structure.
    pub pub_area: Vec<u8>,
}

impl TpmStatement {
    pub(crate) fn decode(
        entries: &[(ciborium::value::Value, ciborium::value::Value)],
    ) -> Result<Self, Error> {
        check_keys(entries, &["ver", "alg", "x5c", "sig", "certInfo", "pubArea"])?;
        let ver = text_field(entries, "ver")?;
        if ver != "2.0" {
            return Err(malformed(format!("unsupported TPM version {ver:?}")));
        }
        Ok(Self {
            alg: alg_field(entries, "alg")?,
            x5c: x5c_field(entries, "x5c")?.ok_or_else(|| malformed("missing \"x5c\""))?,
            sig: bytes_field(entries, "sig")?,
            cert_info: bytes_field(entries, "certInfo")?,
            pub_area: bytes_field(entries, "pubArea")?,
        })
    }

    pub(crate) fn verify(&self, ctx: &VerifyContext<'_>) -> Result<VerifiedAttestation, Error> {
        let public = TpmtPublic::parse(&self.pub_area)?;
        assert_key_matches(&ctx.credential_key()?.key, &public)?;

        let attest = TpmsAttest::parse(&self.cert_info)?;
        if attest.magic != TPM_GENERATED {
            return Err(Error::TpmCertInfoInvalid(format!(
                "magic {:#010x} is not TPM_GENERATED",
                attest.magic
            )));
        }
        if attest.attest_type != TPM_ST_ATTEST_CERTIFY {
            return Err(Error::TpmCertInfoInvalid(format!(
                "type {:#06x} is not TPM_ST_ATTEST_CERTIFY",
                attest.attest_type
            )));
        }

        // extraData carries the hash of attToBeSigned under the statement
        // algorithm.
        let expected_extra = self.alg.hash(&ctx.signed_payload())?;
        if attest.extra_data != expected_extra {
            return Err(Error::TpmCertInfoInvalid(
                "extraData does not match the ceremony hash".into(),
            ));
        }

        // The attested name is nameAlg-prefixed hash of pubArea.
        if attest.attested_name.len() < 2 {
            return Err(Error::TpmCertInfoInvalid("attested name too short".into()));
        }
        let (name_alg, name_digest) = attest.attested_name.split_at(2);
        let name_alg = u16::from_be_bytes([name_alg[0], name_alg[1]]);
        if name_alg != public.name_alg {
            return Err(Error::TpmCertInfoInvalid(
                "attested name algorithm does not match pubArea nameAlg".into(),
            ));
        }
        if tpm_hash(name_alg, &self.pub_area)? != name_digest {
            return Err(Error::TpmCertInfoInvalid(
                "attested name does not match pubArea digest".into(),
            ));
        }

        let aik = &self.x5c[0];
        aik.verifying_key(self.alg)?
            .verify(self.alg, &self.cert_info, &self.sig)?;
        assert_aik_cert_requirements(aik)?;

        Ok(VerifiedAttestation {
            attestation_type: AttestationType::AttCa,
            trust_path: TrustPath::X509Chain(self.x5c.clone()),
        })
    }
}

/// Bounded big-endian reader over a byte slice. Sub-slices borrow the input;
/// nothing is copied until a caller decides to keep a field.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| Error::TpmCertInfoInvalid("truncated TPM structure".into()))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// A `TPM2B_*` sized buffer: u16 length prefix plus payload.
    fn sized_buf(&mut self) -> Result<&'a [u8], Error> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }
}

/// The fields of a `TPMT_PUBLIC` this verifier cares about.
struct TpmtPublic {
    name_alg: u16,
    key: TpmKey,
}

enum TpmKey {
    Rsa { modulus: Vec<u8>, exponent: u32 },
    Ecc { curve: u16, x: Vec<u8>, y: Vec<u8> },
}

impl TpmtPublic {
    fn parse(pub_area: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(pub_area);
        let alg_type = r.u16()?;
        let name_alg = r.u16()?;
        let _object_attributes = r.u32()?;
        let _auth_policy = r.sized_buf()?;

        let key = match alg_type {
            TPM_ALG_RSA => {
                skip_symmetric(&mut r)?;
                skip_scheme(&mut r)?;
                let _key_bits = r.u16()?;
                let exponent = match r.u32()? {
                    0 => 65537,
                    e => e,
                };
                let modulus = r.sized_buf()?.to_vec();
                TpmKey::Rsa { modulus, exponent }
            }
            TPM_ALG_ECC => {
                skip_symmetric(&mut r)?;
                skip_scheme(&mut r)?;
                let curve = r.u16()?;
                skip_scheme(&mut r)?; // kdf
                let x = r.sized_buf()?.to_vec();
                let y = r.sized_buf()?.to_vec();
                TpmKey::Ecc { curve, x, y }
            }
            other => {
                return Err(Error::TpmCertInfoInvalid(format!(
                    "unsupported pubArea key type {other:#06x}"
                )))
            }
        };

        if !r.is_empty() {
            return Err(Error::TpmCertInfoInvalid(
                "trailing bytes after pubArea".into(),
            ));
        }
        Ok(Self { name_alg, key })
    }
}

/// `TPMT_SYM_DEF_OBJECT`: algorithm, then key bits and mode unless null.
fn skip_symmetric(r: &mut Reader<'_>) -> Result<(), Error> {
    if r.u16()? != TPM_ALG_NULL {
        let _key_bits = r.u16()?;
        let _mode = r.u16()?;
    }
    Ok(())
}

/// A scheme or KDF selector: algorithm, then its hash unless null.
fn skip_scheme(r: &mut Reader<'_>) -> Result<(), Error> {
    if r.u16()? != TPM_ALG_NULL {
        let _hash_alg = r.u16()?;
    }
    Ok(())
}

/// The fields of a `TPMS_ATTEST` this verifier cares about.
struct TpmsAttest {
    magic: u32,
    attest_type: u16,
    extra_data: Vec<u8>,
    attested_name: Vec<u8>,
}

impl TpmsAttest {
    fn parse(cert_info: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(cert_info);
        let magic = r.u32()?;
        let attest_type = r.u16()?;
        let _qualified_signer = r.sized_buf()?;
        let extra_data = r.sized_buf()?.to_vec();
        // TPMS_CLOCK_INFO: clock, resetCount, restartCount, safe
        let _clock = r.u64()?;
        let _reset_count = r.u32()?;
        let _restart_count = r.u32()?;
        let _safe = r.u8()?;
        let _firmware_version = r.u64()?;
        // TPMS_CERTIFY_INFO: name and qualifiedName
        let attested_name = r.sized_buf()?.to_vec();
        let _qualified_name = r.sized_buf()?;

        if !r.is_empty() {
            return Err(Error::TpmCertInfoInvalid(
                "trailing bytes after certInfo".into(),
            ));
        }
        Ok(Self {
            magic,
            attest_type,
            extra_data,
            attested_name,
        })
    }
}

fn tpm_hash(alg: u16, data: &[u8]) -> Result<Vec<u8>, Error> {
    Ok(match alg {
        TPM_ALG_SHA1 => Sha1::digest(data).to_vec(),
        TPM_ALG_SHA256 => Sha256::digest(data).to_vec(),
        TPM_ALG_SHA384 => Sha384::digest(data).to_vec(),
        TPM_ALG_SHA512 => Sha512::digest(data).to_vec(),
        other => {
            return Err(Error::TpmCertInfoInvalid(format!(
                "unsupported TPM hash algorithm {other:#06x}"
            )))
        }
    })
}

/// The credential public key must be the key the TPM described in `pubArea`.
fn assert_key_matches(credential: &KeyMaterial, public: &TpmtPublic) -> Result<(), Error> {
    match (credential, &public.key) {
        (KeyMaterial::Rsa { n, e }, TpmKey::Rsa { modulus, exponent }) => {
            if n != modulus {
                return Err(Error::TpmCertInfoInvalid(
                    "pubArea modulus does not match credential key".into(),
                ));
            }
            let cose_exponent = e
                .iter()
                .try_fold(0u32, |acc, byte| {
                    acc.checked_mul(256).map(|acc| acc + u32::from(*byte))
                })
                .ok_or_else(|| {
                    Error::TpmCertInfoInvalid("credential exponent exceeds 32 bits".into())
                })?;
            if cose_exponent != *exponent {
                return Err(Error::TpmCertInfoInvalid(
                    "pubArea exponent does not match credential key".into(),
                ));
            }
            Ok(())
        }
        (KeyMaterial::Ec2 { curve, x, y }, TpmKey::Ecc { curve: tpm_curve, x: tx, y: ty }) => {
            let expected = match curve {
                coset::iana::EllipticCurve::P_256 => TPM_ECC_NIST_P256,
                coset::iana::EllipticCurve::P_384 => TPM_ECC_NIST_P384,
                coset::iana::EllipticCurve::P_521 => TPM_ECC_NIST_P521,
                _ => return Err(Error::KeyTypeMismatch),
            };
            if expected != *tpm_curve || x != tx || y != ty {
                return Err(Error::TpmCertInfoInvalid(
                    "pubArea point does not match credential key".into(),
                ));
            }
            Ok(())
        }
        _ => Err(Error::KeyTypeMismatch),
    }
}

/// TPM attestation certificate requirements, WebAuthn §8.3.1 and the TCG EK
/// credential profile.
fn assert_aik_cert_requirements(aik: &Certificate) -> Result<(), Error> {
    let cert = aik.parse()?;

    if cert.version != X509Version::V3 {
        return Err(Error::CertificateInvalid(
            "AIK certificate is not X.509 v3".into(),
        ));
    }

    // Subject MUST be empty; the identity lives in the SAN extension, which
    // must therefore be critical.
    if cert.subject().iter().next().is_some() {
        return Err(Error::CertificateInvalid(
            "AIK certificate subject is not empty".into(),
        ));
    }

    let san_ok = match cert.subject_alternative_name() {
        Ok(Some(san)) => {
            san.critical
                && san.value.general_names.iter().any(|name| {
                    if let GeneralName::DirectoryName(dir) = name {
                        dir.iter_attributes().any(|attr| {
                            attr.attr_type().as_bytes() == TCG_AT_TPM_MANUFACTURER
                                && attr.as_str().map(|s| !s.is_empty()).unwrap_or(false)
                        })
                    } else {
                        false
                    }
                })
        }
        _ => false,
    };
    if !san_ok {
        return Err(Error::CertificateInvalid(
            "AIK certificate lacks the TPM device SAN".into(),
        ));
    }

    let eku_ok = match cert.extended_key_usage() {
        Ok(Some(eku)) => eku
            .value
            .other
            .iter()
            .any(|oid| oid.as_bytes() == TCG_KP_AIK_CERTIFICATE),
        _ => false,
    };
    if !eku_ok {
        return Err(Error::CertificateInvalid(
            "AIK certificate lacks the tcg-kp-AIKCertificate EKU".into(),
        ));
    }

    match cert.basic_constraints() {
        Ok(Some(bc)) if !bc.value.ca => Ok(()),
        _ => Err(Error::CertificateInvalid(
            "AIK certificate must not be a CA".into(),
        )),
    }
}
