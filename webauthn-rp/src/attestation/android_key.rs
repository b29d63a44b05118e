//! Android Keystore attestation.
//!
//! The leaf certificate carries a Keystore attestation extension describing
//! how the key was created. Verification ties the certificate to the
//! credential key, the extension's challenge to the ceremony, and requires a
//! hardware-generated signing key that is not shared across applications.
//!
//! <https://w3c.github.io/webauthn/#sctn-android-key-attestation>
//! <https://source.android.com/docs/security/features/keystore/attestation>

use crate::{
    attestation::{
        alg_field, bytes_field, check_keys, malformed, x5c_field, AttestationType, TrustPath,
        VerifiedAttestation, VerifyContext,
    },
    crypto::{CoseAlgorithm, VerifyingKey},
    error::Error,
    x509::Certificate,
};

/// Android attestation extension: 1.3.6.1.4.1.11129.2.1.17
const ID_ANDROID_KEY_ATTESTATION: &[u8] = &der_parser::oid!(raw 1.3.6.1.4.1.11129.2.1.17);

/// KeyMint tag numbers used by the checks below.
const TAG_PURPOSE: u32 = 1;
const TAG_ALL_APPLICATIONS: u32 = 600;
const TAG_ORIGIN: u32 = 702;

const KM_PURPOSE_SIGN: i64 = 2;
const KM_ORIGIN_GENERATED: i64 = 0;

/// The `android-key` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct AndroidKeyStatement {
    /// The algorithm the signature was produced with.
    pub alg: CoseAlgorithm,
    /// The signature over `authData || clientDataHash` by the attested key.
    pub sig: Vec<u8>,
    /// The Keystore certificate chain, leaf first.
    pub x5c: Vec<Certificate>,
}

impl AndroidKeyStatement {
    pub(crate) fn decode(
        entries: &[(ciborium::value::Value, ciborium::value::Value)],
    ) -> Result<Self, Error> {
        check_keys(entries, &["alg", "sig", "x5c"])?;
        Ok(Self {
            alg: alg_field(entries, "alg")?,
            sig: bytes_field(entries, "sig")?,
            x5c: x5c_field(entries, "x5c")?.ok_or_else(|| malformed("missing \"x5c\""))?,
        })
    }

    pub(crate) fn verify(&self, ctx: &VerifyContext<'_>) -> Result<VerifiedAttestation, Error> {
        let leaf = &self.x5c[0];

        // The signature is made by the attested key itself, so the leaf must
        // certify exactly the credential public key.
        let credential_key = VerifyingKey::from_credential(&ctx.credential_key()?)?;
        if credential_key.to_spki_der()? != leaf.spki_der()? {
            return Err(Error::AndroidKeyExtensionInvalid(
                "certificate key does not match credential key".into(),
            ));
        }

        credential_key.verify(self.alg, &ctx.signed_payload(), &self.sig)?;

        let ext = leaf
            .extension(ID_ANDROID_KEY_ATTESTATION)?
            .ok_or_else(|| {
                Error::AndroidKeyExtensionInvalid("attestation extension missing".into())
            })?;
        let description = KeyDescription::parse(&ext.value)?;

        if description.challenge != ctx.client_data_hash {
            return Err(Error::AndroidKeyExtensionInvalid(
                "attestationChallenge does not match client data hash".into(),
            ));
        }
        if description.software_enforced.all_applications
            || description.tee_enforced.all_applications
        {
            return Err(Error::AndroidKeyExtensionInvalid(
                "key is not scoped to the RP application".into(),
            ));
        }
        let list_ok = |list: &AuthorizationList| {
            list.origin == Some(KM_ORIGIN_GENERATED) && list.purposes.contains(&KM_PURPOSE_SIGN)
        };
        if !list_ok(&description.tee_enforced) && !list_ok(&description.software_enforced) {
            return Err(Error::AndroidKeyExtensionInvalid(
                "key was not generated on-device for signing".into(),
            ));
        }

        Ok(VerifiedAttestation {
            attestation_type: AttestationType::Basic,
            trust_path: TrustPath::X509Chain(self.x5c.clone()),
        })
    }
}

/// The slice of a KeyMint `KeyDescription` the checks consume.
struct KeyDescription {
    challenge: Vec<u8>,
    software_enforced: AuthorizationList,
    tee_enforced: AuthorizationList,
}

#[derive(Default)]
struct AuthorizationList {
    purposes: Vec<i64>,
    origin: Option<i64>,
    all_applications: bool,
}

impl KeyDescription {
    fn parse(ext_value: &[u8]) -> Result<Self, Error> {
        let mut outer = DerReader::new(ext_value);
        let seq = outer.next_required()?;
        if !(seq.is_universal(TAG_SEQUENCE) && outer.is_empty()) {
            return Err(invalid("KeyDescription is not a single SEQUENCE"));
        }

        let mut fields = DerReader::new(seq.value);
        let _attestation_version = fields.next_required()?;
        let _attestation_security_level = fields.next_required()?;
        let _keymaster_version = fields.next_required()?;
        let _keymaster_security_level = fields.next_required()?;
        let challenge = fields.next_required()?;
        if !challenge.is_universal(TAG_OCTET_STRING) {
            return Err(invalid("attestationChallenge is not an OCTET STRING"));
        }
        let _unique_id = fields.next_required()?;
        let software = fields.next_required()?;
        let tee = fields.next_required()?;
        if !(software.is_universal(TAG_SEQUENCE) && tee.is_universal(TAG_SEQUENCE)) {
            return Err(invalid("authorization lists are not SEQUENCEs"));
        }

        Ok(Self {
            challenge: challenge.value.to_vec(),
            software_enforced: AuthorizationList::parse(software.value)?,
            tee_enforced: AuthorizationList::parse(tee.value)?,
        })
    }
}

impl AuthorizationList {
    fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let mut list = Self::default();
        let mut reader = DerReader::new(bytes);
        while let Some(item) = reader.next()? {
            if item.class != CLASS_CONTEXT {
                return Err(invalid("authorization list entry is not context tagged"));
            }
            match item.tag {
                TAG_PURPOSE => {
                    // [1] EXPLICIT SET OF INTEGER
                    let mut set_reader = DerReader::new(item.value);
                    let set = set_reader.next_required()?;
                    if !set.is_universal(TAG_SET) {
                        return Err(invalid("purpose is not a SET"));
                    }
                    let mut ints = DerReader::new(set.value);
                    while let Some(int) = ints.next()? {
                        list.purposes.push(int.as_integer()?);
                    }
                }
                TAG_ALL_APPLICATIONS => list.all_applications = true,
                TAG_ORIGIN => {
                    let mut int_reader = DerReader::new(item.value);
                    list.origin = Some(int_reader.next_required()?.as_integer()?);
                }
                _ => {} // other KeyMint tags are irrelevant here
            }
        }
        Ok(list)
    }
}

fn invalid(reason: &str) -> Error {
    Error::AndroidKeyExtensionInvalid(reason.into())
}

// ---- minimal DER TLV walker ----------------------------------------------
//
// KeyMint authorization lists use context tags up to 702, which need the
// high-tag-number form; the general-purpose DER parsers in the tree decode
// those as opaque blobs, so walk the TLVs directly.

const CLASS_UNIVERSAL: u8 = 0;
const CLASS_CONTEXT: u8 = 2;

const TAG_OCTET_STRING: u32 = 0x04;
const TAG_SEQUENCE: u32 = 0x10;
const TAG_SET: u32 = 0x11;
const TAG_INTEGER: u32 = 0x02;
const TAG_ENUMERATED: u32 = 0x0a;

struct Tlv<'a> {
    class: u8,
    tag: u32,
    value: &'a [u8],
}

impl Tlv<'_> {
    fn is_universal(&self, tag: u32) -> bool {
        self.class == CLASS_UNIVERSAL && self.tag == tag
    }

    fn as_integer(&self) -> Result<i64, Error> {
        if !(self.is_universal(TAG_INTEGER) || self.is_universal(TAG_ENUMERATED)) {
            return Err(invalid("expected an INTEGER"));
        }
        if self.value.is_empty() || self.value.len() > 8 {
            return Err(invalid("INTEGER out of range"));
        }
        let mut acc: i64 = if self.value[0] & 0x80 != 0 { -1 } else { 0 };
        for byte in self.value {
            acc = (acc << 8) | i64::from(*byte);
        }
        Ok(acc)
    }
}

struct DerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, Error> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| invalid("truncated DER"))?;
        self.pos += 1;
        Ok(b)
    }

    fn next_required(&mut self) -> Result<Tlv<'a>, Error> {
        self.next()?.ok_or_else(|| invalid("truncated DER"))
    }

    fn next(&mut self) -> Result<Option<Tlv<'a>>, Error> {
        if self.is_empty() {
            return Ok(None);
        }

        let first = self.byte()?;
        let class = first >> 6;
        let mut tag = u32::from(first & 0x1f);
        if tag == 0x1f {
            // high tag number form, base-128
            tag = 0;
            loop {
                let b = self.byte()?;
                tag = tag
                    .checked_mul(128)
                    .ok_or_else(|| invalid("tag number overflow"))?
                    + u32::from(b & 0x7f);
                if b & 0x80 == 0 {
                    break;
                }
            }
        }

        let len_byte = self.byte()?;
        let len = if len_byte < 0x80 {
            usize::from(len_byte)
        } else {
            let n = usize::from(len_byte & 0x7f);
            if n == 0 || n > 4 {
                return Err(invalid("unsupported DER length form"));
            }
            let mut len = 0usize;
            for _ in 0..n {
                len = (len << 8) | usize::from(self.byte()?);
            }
            len
        };

        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| invalid("DER length exceeds input"))?;
        let value = &self.buf[self.pos..end];
        self.pos = end;
        Ok(Some(Tlv { class, tag, value }))
    }
}
