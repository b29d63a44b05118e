//! Decoding COSE_Key maps into typed public keys.
//!
//! The credential public key travels inside the attested credential data as a
//! COSE_Key (RFC 9052 §7). This module narrows the generic [`CoseKey`] map
//! into a [`CredentialPublicKey`]: a recognized algorithm plus key material
//! consistent with the declared key type. Nothing outside this module looks
//! at raw COSE labels.

use coset::{
    iana::{self, EnumI64},
    AsCborValue, CoseKey, Label, RegisteredLabel, RegisteredLabelWithPrivate,
};

use crate::{crypto::CoseAlgorithm, error::Error};

/// RSA key type parameters, RFC 8230 §4.
const RSA_LABEL_N: i64 = -1;
const RSA_LABEL_E: i64 = -2;

/// The key material of a credential public key, tagged by COSE key type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// A double-coordinate elliptic curve key (`kty = 2`).
    Ec2 {
        /// The curve the point is on.
        curve: iana::EllipticCurve,
        /// The x-coordinate, big-endian.
        x: Vec<u8>,
        /// The y-coordinate, big-endian.
        y: Vec<u8>,
    },
    /// An RSA public key (`kty = 3`).
    Rsa {
        /// The modulus, big-endian.
        n: Vec<u8>,
        /// The public exponent, big-endian.
        e: Vec<u8>,
    },
    /// An octet key pair (`kty = 1`), i.e. an Edwards curve key.
    Okp {
        /// The curve of the key.
        curve: iana::EllipticCurve,
        /// The public key bytes.
        x: Vec<u8>,
    },
}

/// A credential public key: a recognized signature algorithm and key material
/// consistent with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPublicKey {
    /// The normalized signature algorithm the credential signs with.
    pub alg: CoseAlgorithm,
    /// The typed key material.
    pub key: KeyMaterial,
}

impl CredentialPublicKey {
    /// Decode from raw CBOR bytes, requiring the key to cover the input
    /// exactly.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let value = webauthn_rp_types::cbor::from_slice_strict(bytes)?;
        // Judge the algorithm label before handing the map to coset, which
        // folds unknown algorithm identifiers into a generic decode failure.
        alg_from_map(&value)?;
        let key = CoseKey::from_cbor_value(value).map_err(|e| Error::MalformedCbor {
            offset: None,
            reason: format!("invalid COSE key: {e}"),
        })?;
        Self::from_cose(&key)
    }

    /// Narrow a generic [`CoseKey`] into a typed credential public key.
    ///
    /// Fails with [`Error::UnsupportedAlgorithm`] for algorithms outside the
    /// WebAuthn set and [`Error::KeyTypeMismatch`] when the key parameters do
    /// not fit the declared key type or algorithm.
    pub fn from_cose(key: &CoseKey) -> Result<Self, Error> {
        let alg = match &key.alg {
            Some(RegisteredLabelWithPrivate::Assigned(a)) => CoseAlgorithm::try_from(a.to_i64())?,
            Some(RegisteredLabelWithPrivate::PrivateUse(v)) => CoseAlgorithm::try_from(*v)?,
            Some(RegisteredLabelWithPrivate::Text(_)) | None => {
                return Err(Error::MalformedCbor {
                    offset: None,
                    reason: "COSE key has no algorithm".into(),
                })
            }
        };

        let key = match &key.kty {
            RegisteredLabel::Assigned(iana::KeyType::EC2) => {
                let curve = ec2_curve(key)?;
                if alg.ec2_curve() != Some(curve) {
                    return Err(Error::KeyTypeMismatch);
                }
                let x = param_bytes(key, iana::Ec2KeyParameter::X.to_i64())
                    .ok_or(Error::KeyTypeMismatch)?;
                let y = param_bytes(key, iana::Ec2KeyParameter::Y.to_i64())
                    .ok_or(Error::KeyTypeMismatch)?;
                KeyMaterial::Ec2 { curve, x, y }
            }
            RegisteredLabel::Assigned(iana::KeyType::RSA) => {
                if !alg.is_rsa() {
                    return Err(Error::KeyTypeMismatch);
                }
                let n = param_bytes(key, RSA_LABEL_N).ok_or(Error::KeyTypeMismatch)?;
                let e = param_bytes(key, RSA_LABEL_E).ok_or(Error::KeyTypeMismatch)?;
                KeyMaterial::Rsa { n, e }
            }
            RegisteredLabel::Assigned(iana::KeyType::OKP) => {
                if alg != CoseAlgorithm::EdDsa {
                    return Err(Error::KeyTypeMismatch);
                }
                let curve = okp_curve(key)?;
                if curve != iana::EllipticCurve::Ed25519 {
                    return Err(Error::KeyTypeMismatch);
                }
                let x = param_bytes(key, iana::OkpKeyParameter::X.to_i64())
                    .ok_or(Error::KeyTypeMismatch)?;
                KeyMaterial::Okp { curve, x }
            }
            _ => return Err(Error::KeyTypeMismatch),
        };

        Ok(Self { alg, key })
    }

    /// The uncompressed SEC1 point `0x04 || x || y` required by the U2F
    /// signature construction. Only defined for P-256 EC2 keys.
    pub fn uncompressed_point(&self) -> Result<Vec<u8>, Error> {
        match &self.key {
            KeyMaterial::Ec2 { curve, x, y } if *curve == iana::EllipticCurve::P_256 => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Ok(point)
            }
            _ => Err(Error::KeyTypeMismatch),
        }
    }
}

/// The `alg` label (3) of a COSE key map, checked against the supported set.
fn alg_from_map(value: &ciborium::value::Value) -> Result<CoseAlgorithm, Error> {
    let entries = value.as_map().ok_or_else(|| Error::MalformedCbor {
        offset: None,
        reason: "COSE key is not a map".into(),
    })?;
    let alg = entries
        .iter()
        .find_map(|(k, v)| {
            let label = k.as_integer().and_then(|i| i64::try_from(i).ok())?;
            (label == 3).then_some(v)
        })
        .and_then(|v| v.as_integer())
        .and_then(|i| i64::try_from(i).ok())
        .ok_or_else(|| Error::MalformedCbor {
            offset: None,
            reason: "COSE key has no integer algorithm".into(),
        })?;
    CoseAlgorithm::try_from(alg)
}

fn param_bytes(key: &CoseKey, label: i64) -> Option<Vec<u8>> {
    key.params.iter().find_map(|(k, v)| {
        if matches!(k, Label::Int(i) if *i == label) {
            v.as_bytes().filter(|b| !b.is_empty()).cloned()
        } else {
            None
        }
    })
}

fn param_curve(key: &CoseKey, label: i64) -> Result<iana::EllipticCurve, Error> {
    key.params
        .iter()
        .find_map(|(k, v)| {
            if matches!(k, Label::Int(i) if *i == label) {
                v.as_integer()
                    .and_then(|i| i64::try_from(i).ok())
                    .and_then(iana::EllipticCurve::from_i64)
            } else {
                None
            }
        })
        .ok_or(Error::KeyTypeMismatch)
}

fn ec2_curve(key: &CoseKey) -> Result<iana::EllipticCurve, Error> {
    param_curve(key, iana::Ec2KeyParameter::Crv.to_i64())
}

fn okp_curve(key: &CoseKey) -> Result<iana::EllipticCurve, Error> {
    param_curve(key, iana::OkpKeyParameter::Crv.to_i64())
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn decodes_es256_key() {
        let bytes = hex!(
            "a5"                // map, 5 entries
            "0102"              //   1: 2      ; kty: EC2
            "0326"              //   3: -7     ; alg: ES256
            "2001"              //  -1: 1      ; crv: P-256
            "215820" "65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
            "225820" "1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );
        let key = CredentialPublicKey::from_slice(&bytes).expect("failed to decode");
        assert_eq!(key.alg, CoseAlgorithm::Es256);
        match &key.key {
            KeyMaterial::Ec2 { curve, x, y } => {
                assert_eq!(*curve, iana::EllipticCurve::P_256);
                assert_eq!(
                    x.as_slice(),
                    hex!("65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d")
                );
                assert_eq!(
                    y.as_slice(),
                    hex!("1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c")
                );
            }
            other => panic!("expected EC2 key, got {other:?}"),
        }
    }

    #[test]
    fn curve_algorithm_disagreement_is_rejected() {
        // kty EC2, alg ES256, but crv P-384
        let bytes = hex!(
            "a5" "0102" "0326" "2002"
            "215820" "65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
            "225820" "1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );
        assert_eq!(
            CredentialPublicKey::from_slice(&bytes).unwrap_err(),
            Error::KeyTypeMismatch
        );
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        // kty EC2, alg -260 (unassigned)
        let bytes = hex!("a2" "0102" "03390103");
        assert_eq!(
            CredentialPublicKey::from_slice(&bytes).unwrap_err(),
            Error::UnsupportedAlgorithm(-260)
        );
    }

    #[test]
    fn uncompressed_point_is_sec1() {
        let key = CredentialPublicKey {
            alg: CoseAlgorithm::Es256,
            key: KeyMaterial::Ec2 {
                curve: iana::EllipticCurve::P_256,
                x: vec![0xaa; 32],
                y: vec![0xbb; 32],
            },
        };
        let point = key.uncompressed_point().unwrap();
        assert_eq!(point.len(), 65);
        assert_eq!(point[0], 0x04);
    }
}
