//! Minimal X.509 helpers for attestation trust paths.
//!
//! Certificates are kept as owned DER and re-parsed on demand with
//! [`x509_parser`]; the borrow-per-view model fits a library that hands
//! certificate chains back to its caller. Chain validation is deliberately
//! small: leaf-to-anchor path building on issuer/subject names, signature
//! verification per link, validity at an injected instant, and a depth cap.

use std::time::{SystemTime, UNIX_EPOCH};

use p256::{
    ecdsa::signature::hazmat::PrehashVerifier,
    pkcs8::DecodePublicKey,
};
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_parser::{certificate::X509Certificate, oid_registry, prelude::FromDer, time::ASN1Time};

use crate::{
    crypto::{CoseAlgorithm, VerifyingKey},
    error::Error,
};

/// Maximum accepted certificate chain depth.
pub const MAX_CHAIN_DEPTH: usize = 10;

/// An X.509 certificate held as owned DER bytes, parsed on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Take ownership of a DER encoded certificate, validating that it parses.
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let (rem, _) = X509Certificate::from_der(der)
            .map_err(|e| Error::CertificateInvalid(e.to_string()))?;
        if !rem.is_empty() {
            return Err(Error::CertificateInvalid(format!(
                "{} trailing bytes after certificate",
                rem.len()
            )));
        }
        Ok(Self { der: der.to_vec() })
    }

    /// The DER encoding of this certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The raw bytes of the certificate's serial number.
    pub fn raw_serial(&self) -> Result<Vec<u8>, Error> {
        Ok(self.parse()?.tbs_certificate.raw_serial().to_vec())
    }

    /// The DER encoded SubjectPublicKeyInfo.
    pub fn spki_der(&self) -> Result<Vec<u8>, Error> {
        Ok(self.parse()?.tbs_certificate.subject_pki.raw.to_vec())
    }

    /// The first common name of the subject, if any.
    pub fn subject_common_name(&self) -> Result<Option<String>, Error> {
        let cert = self.parse()?;
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_owned);
        Ok(common_name)
    }

    pub(crate) fn parse(&self) -> Result<X509Certificate<'_>, Error> {
        // from_der succeeded in the constructor, so failure here means the
        // bytes were mutated, which the type does not allow.
        X509Certificate::from_der(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| Error::CertificateInvalid(e.to_string()))
    }

    /// A [`VerifyingKey`] of the kind `alg` requires, from this certificate's
    /// SubjectPublicKeyInfo.
    pub(crate) fn verifying_key(&self, alg: CoseAlgorithm) -> Result<VerifyingKey, Error> {
        VerifyingKey::from_spki_der(alg, self.parse()?.tbs_certificate.subject_pki.raw)
    }

    /// The extension with the given OID (raw DER-encoded arcs), if present
    /// exactly once.
    pub(crate) fn extension(&self, oid_raw: &[u8]) -> Result<Option<CertExtension>, Error> {
        let cert = self.parse()?;
        let mut matches = cert
            .extensions()
            .iter()
            .filter(|ext| ext.oid.as_bytes() == oid_raw)
            .map(|ext| CertExtension {
                critical: ext.critical,
                value: ext.value.to_vec(),
            });
        let first = matches.next();
        if matches.next().is_some() {
            return Err(Error::CertificateInvalid(
                "extension present more than once".into(),
            ));
        }
        Ok(first)
    }

    /// Confirm `now` falls inside the certificate's validity window.
    pub(crate) fn check_validity_at(&self, now: SystemTime) -> Result<(), Error> {
        let secs = now
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::CertificateInvalid("clock is before the unix epoch".into()))?
            .as_secs();
        let at = ASN1Time::from_timestamp(secs as i64)
            .map_err(|_| Error::CertificateInvalid("clock out of ASN.1 time range".into()))?;

        let validity = self.parse()?.validity().clone();
        if at > validity.not_after {
            return Err(Error::CertificateExpired);
        }
        if at < validity.not_before {
            return Err(Error::CertificateInvalid("certificate not yet valid".into()));
        }
        Ok(())
    }

    /// Verify that this certificate's issuer name matches `issuer`'s subject
    /// and that its signature verifies under `issuer`'s public key.
    pub(crate) fn verify_signed_by(&self, issuer: &Certificate) -> Result<(), Error> {
        let child = self.parse()?;
        let parent = issuer.parse()?;

        if child.issuer().as_raw() != parent.subject().as_raw() {
            return Err(Error::CertificateInvalid(
                "issuer name does not match signer subject".into(),
            ));
        }

        let scheme = SignatureScheme::from_oid(&child.signature_algorithm.algorithm)?;
        verify_raw_signature(
            scheme,
            parent.tbs_certificate.subject_pki.raw,
            child.tbs_certificate.as_ref(),
            &child.signature_value.data,
        )
    }

    /// Critical extensions outside the profile we understand make the
    /// certificate unusable for chain building.
    fn check_critical_extensions(&self) -> Result<(), Error> {
        let cert = self.parse()?;
        for ext in cert.extensions() {
            if !ext.critical {
                continue;
            }
            let known = ext.oid == oid_registry::OID_X509_EXT_BASIC_CONSTRAINTS
                || ext.oid == oid_registry::OID_X509_EXT_KEY_USAGE
                || ext.oid == oid_registry::OID_X509_EXT_EXTENDED_KEY_USAGE
                || ext.oid == oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME
                || ext.oid == oid_registry::OID_X509_EXT_CERTIFICATE_POLICIES;
            if !known {
                return Err(Error::CertificateInvalid(format!(
                    "unsupported critical extension {}",
                    ext.oid
                )));
            }
        }
        Ok(())
    }
}

/// An extension's criticality flag and raw DER value.
#[derive(Debug, Clone)]
pub(crate) struct CertExtension {
    pub critical: bool,
    pub value: Vec<u8>,
}

/// The X.509 signature algorithms accepted in attestation chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureScheme {
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
    RsaSha1,
    RsaSha256,
    RsaSha384,
    RsaSha512,
}

impl SignatureScheme {
    fn from_oid(oid: &x509_parser::der_parser::Oid<'_>) -> Result<Self, Error> {
        let scheme = if *oid == oid_registry::OID_SIG_ECDSA_WITH_SHA256 {
            Self::EcdsaSha256
        } else if *oid == oid_registry::OID_SIG_ECDSA_WITH_SHA384 {
            Self::EcdsaSha384
        } else if *oid == oid_registry::OID_SIG_ECDSA_WITH_SHA512 {
            Self::EcdsaSha512
        } else if *oid == oid_registry::OID_PKCS1_SHA1WITHRSA {
            Self::RsaSha1
        } else if *oid == oid_registry::OID_PKCS1_SHA256WITHRSA {
            Self::RsaSha256
        } else if *oid == oid_registry::OID_PKCS1_SHA384WITHRSA {
            Self::RsaSha384
        } else if *oid == oid_registry::OID_PKCS1_SHA512WITHRSA {
            Self::RsaSha512
        } else {
            return Err(Error::CertificateInvalid(format!(
                "unsupported signature algorithm {oid}"
            )));
        };
        Ok(scheme)
    }
}

macro_rules! try_ecdsa_verify {
    ($curve:ident, $digest:ident, $spki:expr, $tbs:expr, $sig:expr) => {
        if let Ok(key) = $curve::ecdsa::VerifyingKey::from_public_key_der($spki) {
            let sig = $curve::ecdsa::Signature::from_der($sig)
                .map_err(|_| Error::SignatureInvalid)?;
            return key
                .verify_prehash(&$digest::digest($tbs), &sig)
                .map_err(|_| Error::SignatureInvalid);
        }
    };
}

fn verify_raw_signature(
    scheme: SignatureScheme,
    issuer_spki: &[u8],
    tbs: &[u8],
    sig: &[u8],
) -> Result<(), Error> {
    match scheme {
        SignatureScheme::EcdsaSha256 => {
            try_ecdsa_verify!(p256, Sha256, issuer_spki, tbs, sig);
            try_ecdsa_verify!(p384, Sha256, issuer_spki, tbs, sig);
        }
        SignatureScheme::EcdsaSha384 => {
            try_ecdsa_verify!(p384, Sha384, issuer_spki, tbs, sig);
            try_ecdsa_verify!(p256, Sha384, issuer_spki, tbs, sig);
        }
        SignatureScheme::EcdsaSha512 => {
            try_ecdsa_verify!(p521, Sha512, issuer_spki, tbs, sig);
            try_ecdsa_verify!(p384, Sha512, issuer_spki, tbs, sig);
        }
        SignatureScheme::RsaSha1 => {
            return rsa_cert_verify(CoseAlgorithm::Rs1, issuer_spki, tbs, sig)
        }
        SignatureScheme::RsaSha256 => {
            return rsa_cert_verify(CoseAlgorithm::Rs256, issuer_spki, tbs, sig)
        }
        SignatureScheme::RsaSha384 => {
            return rsa_cert_verify(CoseAlgorithm::Rs384, issuer_spki, tbs, sig)
        }
        SignatureScheme::RsaSha512 => {
            return rsa_cert_verify(CoseAlgorithm::Rs512, issuer_spki, tbs, sig)
        }
    }
    Err(Error::CertificateInvalid(
        "signer public key does not match signature algorithm".into(),
    ))
}

fn rsa_cert_verify(
    alg: CoseAlgorithm,
    issuer_spki: &[u8],
    tbs: &[u8],
    sig: &[u8],
) -> Result<(), Error> {
    VerifyingKey::from_spki_der(alg, issuer_spki)?.verify(alg, tbs, sig)
}

/// The root certificates a caller trusts for attestation, injected per
/// verification call.
#[derive(Debug, Default, Clone)]
pub struct TrustAnchors {
    anchors: Vec<Certificate>,
}

impl TrustAnchors {
    /// An empty anchor set. With no anchors the chain is still validated
    /// internally (signatures, validity, depth) but is not required to
    /// terminate at a known root; the caller judges the returned trust path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a DER encoded root certificate.
    pub fn add_der(&mut self, der: &[u8]) -> Result<(), Error> {
        self.anchors.push(Certificate::from_der(der)?);
        Ok(())
    }

    /// Whether any anchors were injected.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.anchors.iter()
    }
}

/// Validate an attestation trust chain, leaf first.
///
/// Every certificate must be inside its validity window at `now` and free of
/// unsupported critical extensions; every link must verify; and when anchors
/// are present the path must terminate at one of them, either because the
/// last chain certificate is an anchor or because an anchor signed it.
pub fn validate_chain(
    chain: &[Certificate],
    anchors: &TrustAnchors,
    now: SystemTime,
) -> Result<(), Error> {
    if chain.is_empty() {
        return Err(Error::AttestationUntrusted("empty certificate chain".into()));
    }
    if chain.len() > MAX_CHAIN_DEPTH {
        return Err(Error::AttestationUntrusted(format!(
            "certificate chain depth {} exceeds {MAX_CHAIN_DEPTH}",
            chain.len()
        )));
    }

    for cert in chain {
        cert.check_validity_at(now)?;
        cert.check_critical_extensions()?;
    }

    for pair in chain.windows(2) {
        pair[0].verify_signed_by(&pair[1]).map_err(untrusted_link)?;
    }

    if anchors.is_empty() {
        return Ok(());
    }

    // SAFETY: emptiness was checked above.
    let last = chain.last().unwrap();
    if anchors.iter().any(|anchor| anchor.der() == last.der()) {
        return Ok(());
    }
    if anchors
        .iter()
        .any(|anchor| last.verify_signed_by(anchor).is_ok())
    {
        return Ok(());
    }
    Err(Error::AttestationUntrusted(
        "no path to a trust anchor".into(),
    ))
}

fn untrusted_link(err: Error) -> Error {
    match err {
        Error::SignatureInvalid => {
            Error::AttestationUntrusted("certificate chain signature invalid".into())
        }
        Error::CertificateInvalid(reason) => Error::AttestationUntrusted(reason),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Yubico U2F EE certificate from the fido2-helpers corpus; expires 2050.
    const YUBICO_EE_DER: &[u8] = &[
        0x30, 0x82, 0x02, 0x44, 0x30, 0x82, 0x01, 0x2E, 0xA0, 0x03, 0x02, 0x01, 0x02, 0x02, 0x04,
        0x55, 0x62, 0xBE, 0xA0, 0x30, 0x0B, 0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01,
        0x01, 0x0B, 0x30, 0x2E, 0x31, 0x2C, 0x30, 0x2A, 0x06, 0x03, 0x55, 0x04, 0x03, 0x13, 0x23,
        0x59, 0x75, 0x62, 0x69, 0x63, 0x6F, 0x20, 0x55, 0x32, 0x46, 0x20, 0x52, 0x6F, 0x6F, 0x74,
        0x20, 0x43, 0x41, 0x20, 0x53, 0x65, 0x72, 0x69, 0x61, 0x6C, 0x20, 0x34, 0x35, 0x37, 0x32,
        0x30, 0x30, 0x36, 0x33, 0x31, 0x30, 0x20, 0x17, 0x0D, 0x31, 0x34, 0x30, 0x38, 0x30, 0x31,
        0x30, 0x30, 0x30, 0x30, 0x30, 0x30, 0x5A, 0x18, 0x0F, 0x32, 0x30, 0x35, 0x30, 0x30, 0x39,
        0x30, 0x34, 0x30, 0x30, 0x30, 0x30, 0x30, 0x30, 0x5A, 0x30, 0x2A, 0x31, 0x28, 0x30, 0x26,
        0x06, 0x03, 0x55, 0x04, 0x03, 0x0C, 0x1F, 0x59, 0x75, 0x62, 0x69, 0x63, 0x6F, 0x20, 0x55,
        0x32, 0x46, 0x20, 0x45, 0x45, 0x20, 0x53, 0x65, 0x72, 0x69, 0x61, 0x6C, 0x20, 0x31, 0x34,
        0x33, 0x32, 0x35, 0x33, 0x34, 0x36, 0x38, 0x38, 0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2A,
        0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01, 0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01,
        0x07, 0x03, 0x42, 0x00, 0x04, 0x4B, 0x33, 0x1F, 0x77, 0x3D, 0x81, 0x44, 0xB9, 0x99, 0x5C,
        0xBE, 0x45, 0x85, 0x51, 0x7E, 0x17, 0x58, 0x3A, 0xA4, 0x76, 0x23, 0x69, 0x5C, 0xBE, 0x85,
        0xAC, 0x48, 0x2C, 0x80, 0x19, 0xF2, 0xC9, 0xB9, 0x46, 0x7A, 0xE0, 0x45, 0xB0, 0xE6, 0x6F,
        0x13, 0x1B, 0x2E, 0xA3, 0x24, 0x3C, 0x91, 0xFD, 0xA6, 0x02, 0xE3, 0x18, 0xF3, 0xFC, 0x5D,
        0x8D, 0x2A, 0x7A, 0xBA, 0xE7, 0x2B, 0xD1, 0x43, 0x09, 0xA3, 0x3B, 0x30, 0x39, 0x30, 0x22,
        0x06, 0x09, 0x2B, 0x06, 0x01, 0x04, 0x01, 0x82, 0xC4, 0x0A, 0x02, 0x04, 0x15, 0x31, 0x2E,
        0x33, 0x2E, 0x36, 0x2E, 0x31, 0x2E, 0x34, 0x2E, 0x31, 0x2E, 0x34, 0x31, 0x34, 0x38, 0x32,
        0x2E, 0x31, 0x2E, 0x35, 0x30, 0x13, 0x06, 0x0B, 0x2B, 0x06, 0x01, 0x04, 0x01, 0x82, 0xE5,
        0x1C, 0x02, 0x01, 0x01, 0x04, 0x04, 0x03, 0x02, 0x05, 0x20, 0x30, 0x0B, 0x06, 0x09, 0x2A,
        0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B, 0x03, 0x82, 0x01, 0x01, 0x00, 0xAC, 0x16,
        0xD9, 0xB3, 0x6E, 0xB6, 0xB3, 0xA9, 0xB7, 0x6D, 0x75, 0x94, 0xB3, 0x4F, 0x59, 0xF4, 0xF7,
        0x3E, 0xDB, 0xC9, 0xFD, 0xEB, 0x29, 0x35, 0xEB, 0x6B, 0x45, 0x1C, 0xAB, 0xF4, 0x1D, 0x25,
        0xD3, 0xE7, 0x16, 0x14, 0xD7, 0x47, 0x26, 0x04, 0xCA, 0x72, 0xA5, 0x78, 0xE3, 0x23, 0xED,
        0xB7, 0x60, 0x04, 0x68, 0x5F, 0x05, 0xE7, 0xD1, 0xB9, 0xBE, 0x05, 0xDB, 0x6E, 0x94, 0x40,
        0xFA, 0xC5, 0xCF, 0xC9, 0x32, 0xA6, 0xCA, 0xFA, 0xE8, 0x52, 0x99, 0x77, 0x2E, 0xDB, 0x02,
        0x78, 0x20, 0x20, 0x3C, 0xD4, 0x14, 0x1D, 0x3E, 0xEB, 0x6F, 0x6A, 0x2C, 0xE9, 0x9E, 0x39,
        0x57, 0x80, 0x32, 0x63, 0xAB, 0xAB, 0x8D, 0x6E, 0xC4, 0x80, 0xA7, 0xDF, 0x08, 0x4A, 0xD2,
        0xCB, 0xA7, 0xB7, 0xD6, 0xD7, 0x7C, 0x94, 0xC3, 0xEB, 0xC0, 0xB1, 0x66, 0xF9, 0x60, 0x57,
        0xCA, 0xF5, 0xFE, 0x3A, 0x63, 0x1E, 0xA2, 0x6A, 0x43, 0x37, 0x62, 0xA3, 0x6F, 0xBE, 0xCF,
        0x4C, 0xF4, 0x45, 0x09, 0x62, 0x5F, 0xD5, 0xAF, 0x10, 0x49, 0xAA, 0x7C, 0x8B, 0xC7, 0x68,
        0x9A, 0x66, 0x59, 0xE9, 0xAF, 0x5D, 0xE8, 0xF0, 0xD7, 0x2C, 0x28, 0x82, 0x51, 0x74, 0xC5,
        0x0E, 0x06, 0xAB, 0x7F, 0x6A, 0x07, 0x90, 0x83, 0x7B, 0x6D, 0xB3, 0x2A, 0xBF, 0xDC, 0xBC,
        0xA8, 0x35, 0xCB, 0xBB, 0x09, 0x0E, 0xF1, 0xF0, 0xD9, 0x9E, 0x08, 0x69, 0xBF, 0xE9, 0xE5,
        0x67, 0x64, 0xC4, 0x23, 0x0E, 0x6C, 0x05, 0x77, 0x29, 0xB0, 0x10, 0xDE, 0x0E, 0xC5, 0xF9,
        0xCC, 0xE4, 0xC9, 0x1C, 0x28, 0x26, 0x21, 0x8E, 0xA8, 0x08, 0x1A, 0xBB, 0x96, 0x91, 0x51,
        0xEC, 0x16, 0x72, 0x5A, 0xF2, 0xA8, 0xD9, 0x5E, 0x77, 0x95, 0xBC, 0xAA, 0x22, 0x7A, 0x9B,
        0x94, 0x43, 0x20, 0xC4, 0x27, 0x61, 0x9C, 0xAA, 0xF8, 0x54, 0xD9, 0x82, 0x98, 0xD7,
    ];

    fn era(year_offset: u64) -> SystemTime {
        UNIX_EPOCH + std::time::Duration::from_secs(year_offset * 365 * 24 * 3600)
    }

    #[test]
    fn parses_and_exposes_serial() {
        let cert = Certificate::from_der(YUBICO_EE_DER).expect("failed to parse certificate");
        assert_eq!(cert.raw_serial().unwrap(), vec![0x55, 0x62, 0xBE, 0xA0]);
    }

    #[test]
    fn validity_window_is_enforced() {
        let cert = Certificate::from_der(YUBICO_EE_DER).unwrap();
        // valid 2014-08-01 .. 2050-09-04
        cert.check_validity_at(era(55)).expect("2025 is in window");
        assert_eq!(
            cert.check_validity_at(era(85)),
            Err(Error::CertificateExpired)
        );
        assert!(matches!(
            cert.check_validity_at(era(40)),
            Err(Error::CertificateInvalid(_))
        ));
    }

    #[test]
    fn single_certificate_chain_validates_without_anchors() {
        let chain = vec![Certificate::from_der(YUBICO_EE_DER).unwrap()];
        validate_chain(&chain, &TrustAnchors::new(), era(55)).expect("chain should validate");
    }

    #[test]
    fn chain_deeper_than_ten_is_rejected() {
        let cert = Certificate::from_der(YUBICO_EE_DER).unwrap();
        let chain = vec![cert; MAX_CHAIN_DEPTH + 1];
        assert!(matches!(
            validate_chain(&chain, &TrustAnchors::new(), era(55)),
            Err(Error::AttestationUntrusted(_))
        ));
    }

    #[test]
    fn anchors_require_a_path() {
        let chain = vec![Certificate::from_der(YUBICO_EE_DER).unwrap()];
        let mut anchors = TrustAnchors::new();
        // The leaf itself as an anchor: trivially on the path.
        anchors.add_der(YUBICO_EE_DER).unwrap();
        validate_chain(&chain, &anchors, era(55)).expect("anchor equals leaf");
    }
}
