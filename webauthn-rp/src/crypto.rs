//! Signature algorithm dispatch over the RustCrypto primitive crates.
//!
//! The WebAuthn algorithm set is closed: a fixed list of COSE identifiers,
//! each binding a hash and a signature scheme to a key type. This module maps
//! identifiers to that binding, reconstructs verifying keys from COSE
//! parameters or SubjectPublicKeyInfo, and performs hash-then-verify with
//! algorithm/key-type mismatches rejected before any primitive runs.

use ecdsa::signature::hazmat::PrehashVerifier;
use p256::{
    ecdsa::signature::{DigestVerifier, Verifier},
    elliptic_curve::generic_array::GenericArray,
    pkcs8::{DecodePublicKey, EncodePublicKey},
};
use rsa::{BigUint, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use coset::iana;

use crate::{
    cose::{CredentialPublicKey, KeyMaterial},
    error::Error,
};

/// The COSE signature algorithms this library understands, per the IANA COSE
/// registry. Everything else is [`Error::UnsupportedAlgorithm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoseAlgorithm {
    /// ECDSA with SHA-256 on P-256 (`-7`)
    Es256,
    /// ECDSA with SHA-384 on P-384 (`-35`)
    Es384,
    /// ECDSA with SHA-512 on P-521 (`-36`)
    Es512,
    /// EdDSA over Ed25519 (`-8`)
    EdDsa,
    /// RSASSA-PSS with SHA-256 (`-37`)
    Ps256,
    /// RSASSA-PSS with SHA-384 (`-38`)
    Ps384,
    /// RSASSA-PSS with SHA-512 (`-39`)
    Ps512,
    /// RSASSA-PKCS1-v1_5 with SHA-256 (`-257`)
    Rs256,
    /// RSASSA-PKCS1-v1_5 with SHA-384 (`-258`)
    Rs384,
    /// RSASSA-PKCS1-v1_5 with SHA-512 (`-259`)
    Rs512,
    /// RSASSA-PKCS1-v1_5 with SHA-1 (`-65535`), legacy hardware only
    Rs1,
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Error> {
        Ok(match value {
            -7 => Self::Es256,
            -35 => Self::Es384,
            -36 => Self::Es512,
            -8 => Self::EdDsa,
            -37 => Self::Ps256,
            -38 => Self::Ps384,
            -39 => Self::Ps512,
            -257 => Self::Rs256,
            -258 => Self::Rs384,
            -259 => Self::Rs512,
            -65535 => Self::Rs1,
            other => return Err(Error::UnsupportedAlgorithm(other)),
        })
    }
}

impl CoseAlgorithm {
    /// The IANA COSE identifier.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::Es384 => -35,
            Self::Es512 => -36,
            Self::EdDsa => -8,
            Self::Ps256 => -37,
            Self::Ps384 => -38,
            Self::Ps512 => -39,
            Self::Rs256 => -257,
            Self::Rs384 => -258,
            Self::Rs512 => -259,
            Self::Rs1 => -65535,
        }
    }

    /// Whether this algorithm signs with an RSA key.
    pub fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::Ps256
                | Self::Ps384
                | Self::Ps512
                | Self::Rs256
                | Self::Rs384
                | Self::Rs512
                | Self::Rs1
        )
    }

    /// The EC2 curve this algorithm is bound to, if it is an ECDSA algorithm.
    pub fn ec2_curve(self) -> Option<iana::EllipticCurve> {
        match self {
            Self::Es256 => Some(iana::EllipticCurve::P_256),
            Self::Es384 => Some(iana::EllipticCurve::P_384),
            Self::Es512 => Some(iana::EllipticCurve::P_521),
            _ => None,
        }
    }

    /// Hash `data` with the digest this algorithm implies.
    ///
    /// EdDSA has no detached hash step and is rejected; the only caller that
    /// hashes under a statement algorithm is the TPM verifier, and TPMs do not
    /// speak EdDSA.
    pub fn hash(self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(match self {
            Self::Es256 | Self::Ps256 | Self::Rs256 => Sha256::digest(data).to_vec(),
            Self::Es384 | Self::Ps384 | Self::Rs384 => Sha384::digest(data).to_vec(),
            Self::Es512 | Self::Ps512 | Self::Rs512 => Sha512::digest(data).to_vec(),
            Self::Rs1 => Sha1::digest(data).to_vec(),
            Self::EdDsa => return Err(Error::UnsupportedAlgorithm(self.as_i64())),
        })
    }
}

/// A public key ready to verify signatures, aggregated over the supported
/// primitives.
#[derive(Clone)]
pub enum VerifyingKey {
    /// ECDSA over P-256.
    Es256(p256::ecdsa::VerifyingKey),
    /// ECDSA over P-384.
    Es384(p384::ecdsa::VerifyingKey),
    /// ECDSA over P-521.
    Es512(p521::ecdsa::VerifyingKey),
    /// Ed25519.
    Ed25519(ed25519_dalek::VerifyingKey),
    /// RSA, scheme and hash decided by the algorithm at verify time.
    Rsa(RsaPublicKey),
}

impl std::fmt::Debug for VerifyingKey {
    // p521::ecdsa::VerifyingKey does not implement `Debug`, so this enum
    // cannot use `#[derive(Debug)]`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Es256(k) => f.debug_tuple("Es256").field(k).finish(),
            Self::Es384(k) => f.debug_tuple("Es384").field(k).finish(),
            Self::Es512(_) => f.debug_tuple("Es512").finish(),
            Self::Ed25519(k) => f.debug_tuple("Ed25519").field(k).finish(),
            Self::Rsa(k) => f.debug_tuple("Rsa").field(k).finish(),
        }
    }
}

/// Left-pad a field element to the curve's coordinate size. Authenticators
/// routinely strip leading zero bytes.
fn fixed_coordinate<const N: usize>(bytes: &[u8]) -> Result<[u8; N], Error> {
    if bytes.len() > N {
        return Err(Error::KeyTypeMismatch);
    }
    let mut out = [0u8; N];
    out[N - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

macro_rules! ec2_verifying_key {
    ($curve:ident, $size:expr, $x:expr, $y:expr) => {{
        let x = fixed_coordinate::<$size>($x)?;
        let y = fixed_coordinate::<$size>($y)?;
        let point = $curve::EncodedPoint::from_affine_coordinates(
            GenericArray::from_slice(&x),
            GenericArray::from_slice(&y),
            false,
        );
        $curve::ecdsa::VerifyingKey::from_encoded_point(&point)
            .map_err(|_| Error::KeyTypeMismatch)?
    }};
}

impl VerifyingKey {
    /// Reconstruct a verifying key from decoded COSE key material.
    pub fn from_credential(key: &CredentialPublicKey) -> Result<Self, Error> {
        Ok(match &key.key {
            KeyMaterial::Ec2 { curve, x, y } => match curve {
                iana::EllipticCurve::P_256 => Self::Es256(ec2_verifying_key!(p256, 32, x, y)),
                iana::EllipticCurve::P_384 => Self::Es384(ec2_verifying_key!(p384, 48, x, y)),
                iana::EllipticCurve::P_521 => Self::Es512(ec2_verifying_key!(p521, 66, x, y)),
                _ => return Err(Error::KeyTypeMismatch),
            },
            KeyMaterial::Okp { x, .. } => {
                let bytes: [u8; 32] = x.as_slice().try_into().map_err(|_| Error::KeyTypeMismatch)?;
                Self::Ed25519(
                    ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                        .map_err(|_| Error::KeyTypeMismatch)?,
                )
            }
            KeyMaterial::Rsa { n, e } => Self::Rsa(
                RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
                    .map_err(|_| Error::KeyTypeMismatch)?,
            ),
        })
    }

    /// Reconstruct a verifying key of the kind `alg` requires from a DER
    /// encoded SubjectPublicKeyInfo, typically a certificate's.
    pub fn from_spki_der(alg: CoseAlgorithm, spki: &[u8]) -> Result<Self, Error> {
        let invalid = |_| Error::CertificateInvalid("public key does not match algorithm".into());
        Ok(match alg {
            CoseAlgorithm::Es256 => {
                Self::Es256(p256::ecdsa::VerifyingKey::from_public_key_der(spki).map_err(invalid)?)
            }
            CoseAlgorithm::Es384 => {
                Self::Es384(p384::ecdsa::VerifyingKey::from_public_key_der(spki).map_err(invalid)?)
            }
            CoseAlgorithm::Es512 => {
                Self::Es512(p521::ecdsa::VerifyingKey::from_public_key_der(spki).map_err(invalid)?)
            }
            CoseAlgorithm::EdDsa => Self::Ed25519(
                ed25519_dalek::VerifyingKey::from_public_key_der(spki).map_err(invalid)?,
            ),
            _ => Self::Rsa(RsaPublicKey::from_public_key_der(spki).map_err(invalid)?),
        })
    }

    /// The DER encoded SubjectPublicKeyInfo of this key, for byte-wise
    /// comparison against certificate keys.
    pub fn to_spki_der(&self) -> Result<Vec<u8>, Error> {
        let doc = match self {
            Self::Es256(k) => k.to_public_key_der(),
            Self::Es384(k) => k.to_public_key_der(),
            Self::Es512(k) => k.to_public_key_der(),
            Self::Ed25519(k) => k.to_public_key_der(),
            Self::Rsa(k) => k.to_public_key_der(),
        }
        .map_err(|_| Error::KeyTypeMismatch)?;
        Ok(doc.as_bytes().to_vec())
    }

    /// Verify `signature` over `message` under `alg`.
    ///
    /// The message is hashed with the digest the algorithm implies; ECDSA
    /// signatures are DER encoded, RSA-PSS uses a salt length equal to the
    /// hash length, Ed25519 takes the message directly.
    pub fn verify(&self, alg: CoseAlgorithm, message: &[u8], signature: &[u8]) -> Result<(), Error> {
        match (self, alg) {
            (Self::Es256(key), CoseAlgorithm::Es256) => {
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| Error::SignatureInvalid)?;
                key.verify_digest(Sha256::new().chain_update(message), &sig)
                    .map_err(|_| Error::SignatureInvalid)
            }
            (Self::Es384(key), CoseAlgorithm::Es384) => {
                let sig = p384::ecdsa::Signature::from_der(signature)
                    .map_err(|_| Error::SignatureInvalid)?;
                key.verify_digest(Sha384::new().chain_update(message), &sig)
                    .map_err(|_| Error::SignatureInvalid)
            }
            (Self::Es512(key), CoseAlgorithm::Es512) => {
                let sig = p521::ecdsa::Signature::from_der(signature)
                    .map_err(|_| Error::SignatureInvalid)?;
                key.verify_digest(Sha512::new().chain_update(message), &sig)
                    .map_err(|_| Error::SignatureInvalid)
            }
            (Self::Ed25519(key), CoseAlgorithm::EdDsa) => {
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| Error::SignatureInvalid)?;
                key.verify(message, &sig).map_err(|_| Error::SignatureInvalid)
            }
            (Self::Rsa(key), alg) if alg.is_rsa() => verify_rsa(key, alg, message, signature),
            _ => Err(Error::KeyTypeMismatch),
        }
    }
}

macro_rules! rsa_pkcs1v15 {
    ($digest:ident, $key:expr, $message:expr, $signature:expr) => {{
        let key = rsa::pkcs1v15::VerifyingKey::<$digest>::new($key.clone());
        let sig = rsa::pkcs1v15::Signature::try_from($signature)
            .map_err(|_| Error::SignatureInvalid)?;
        key.verify_digest($digest::new().chain_update($message), &sig)
            .map_err(|_| Error::SignatureInvalid)
    }};
}

macro_rules! rsa_pss {
    ($digest:ident, $key:expr, $message:expr, $signature:expr) => {{
        let key = rsa::pss::VerifyingKey::<$digest>::new($key.clone());
        let sig =
            rsa::pss::Signature::try_from($signature).map_err(|_| Error::SignatureInvalid)?;
        key.verify_digest($digest::new().chain_update($message), &sig)
            .map_err(|_| Error::SignatureInvalid)
    }};
}

fn verify_rsa(
    key: &RsaPublicKey,
    alg: CoseAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    match alg {
        CoseAlgorithm::Rs256 => rsa_pkcs1v15!(Sha256, key, message, signature),
        CoseAlgorithm::Rs384 => rsa_pkcs1v15!(Sha384, key, message, signature),
        CoseAlgorithm::Rs512 => rsa_pkcs1v15!(Sha512, key, message, signature),
        CoseAlgorithm::Rs1 => {
            log::warn!("verifying a legacy SHA-1 RSA attestation signature");
            rsa_pkcs1v15!(Sha1, key, message, signature)
        }
        CoseAlgorithm::Ps256 => rsa_pss!(Sha256, key, message, signature),
        CoseAlgorithm::Ps384 => rsa_pss!(Sha384, key, message, signature),
        CoseAlgorithm::Ps512 => rsa_pss!(Sha512, key, message, signature),
        _ => Err(Error::KeyTypeMismatch),
    }
}
