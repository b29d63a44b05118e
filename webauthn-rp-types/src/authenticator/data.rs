use std::io::{Cursor, Read};

use ciborium::value::Value;

use super::{Aaguid, Flags};
use crate::cbor;

/// Credential IDs are length-prefixed with a u16 but additionally capped at
/// 1023 bytes.
///
/// <https://w3c.github.io/webauthn/#credential-id>
pub const MAX_CREDENTIAL_ID_LENGTH: usize = 1023;

/// Failure while parsing authenticator data, with the offset of the byte the
/// parser gave up at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDataError {
    /// Byte offset into the authenticator data.
    pub offset: usize,
    /// Short human readable reason.
    pub reason: String,
}

impl std::fmt::Display for AuthDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.reason, self.offset)
    }
}

impl std::error::Error for AuthDataError {}

fn err(offset: usize, reason: impl Into<String>) -> AuthDataError {
    AuthDataError {
        offset,
        reason: reason.into(),
    }
}

/// The authenticator data structure encodes contextual bindings made by the
/// authenticator: the RP ID the credential is scoped to, the user presence and
/// verification state, a signature counter, and optionally the attested
/// credential data and extension outputs.
///
/// A relying party treats this as untrusted input and parses it strictly: the
/// optional trailers must be present exactly when their flags say so, and the
/// whole byte string must be consumed.
///
/// <https://w3c.github.io/webauthn/#sctn-authenticator-data>
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    /// SHA-256 hash of the RP ID the credential is scoped to.
    rp_id_hash: [u8; 32],

    /// The state flags reported by the authenticator. See [Flags].
    pub flags: Flags,

    /// Signature counter, 32-bit unsigned big-endian integer.
    pub counter: u32,

    /// Present exactly when [`Flags::AT`] is set.
    pub attested_credential_data: Option<AttestedCredentialData>,

    /// Extension-defined authenticator data, present exactly when
    /// [`Flags::ED`] is set. This is a CBOR map with extension identifiers as
    /// keys; it is kept as a generic [`Value`] (asserted to be a map during
    /// parsing) since extension outputs are authenticator specific.
    pub extensions: Option<Value>,
}

impl AuthenticatorData {
    /// Parse authenticator data from its byte representation.
    ///
    /// The trailing attested credential data and extensions map must exactly
    /// cover the remainder of the input; trailing bytes or an under-read are
    /// an error, as is an optional section whose flag is clear.
    pub fn parse(v: &[u8]) -> Result<Self, AuthDataError> {
        // hash len (32 bytes) + flags (1 byte) + counter (4 bytes)
        if v.len() < 37 {
            return Err(err(v.len(), "authenticator data shorter than 37 bytes"));
        }

        let (rp_id_hash, rest) = v.split_at(32);
        let (flag_byte, rest) = rest.split_at(1);
        let (counter, rest) = rest.split_at(4);

        let flags = Flags::from_bits(flag_byte[0])
            .ok_or_else(|| err(32, format!("reserved flag bits set: {:#04x}", flag_byte[0])))?;

        let mut cursor = Cursor::new(rest);
        let attested_credential_data = flags
            .contains(Flags::AT)
            .then(|| AttestedCredentialData::from_reader(&mut cursor))
            .transpose()
            .map_err(|mut e| {
                e.offset += 37;
                e
            })?;
        let extensions = flags
            .contains(Flags::ED)
            .then(|| {
                let start = cursor.position() as usize;
                let value = cbor::value_from_reader(&mut cursor)
                    .map_err(|e| err(37 + e.offset.unwrap_or(start), e.reason))?;
                if !value.is_map() {
                    return Err(err(37 + start, "extension data is not a map"));
                }
                Ok(value)
            })
            .transpose()?;

        let consumed = cursor.position() as usize;
        if consumed != rest.len() {
            return Err(err(
                37 + consumed,
                format!("{} trailing bytes", rest.len() - consumed),
            ));
        }

        // SAFETY: these unwraps are safe since the slices were created by
        // `split_at` with matching sizes.
        Ok(AuthenticatorData {
            rp_id_hash: rp_id_hash.try_into().unwrap(),
            flags,
            counter: u32::from_be_bytes(counter.try_into().unwrap()),
            attested_credential_data,
            extensions,
        })
    }

    /// Get read access to the RP ID hash.
    pub fn rp_id_hash(&self) -> &[u8; 32] {
        &self.rp_id_hash
    }

    /// Whether the user was present for the operation.
    pub fn user_present(&self) -> bool {
        self.flags.contains(Flags::UP)
    }

    /// Whether the user was verified (PIN, biometric, ...) for the operation.
    pub fn user_verified(&self) -> bool {
        self.flags.contains(Flags::UV)
    }
}

/// Attested credential data is a variable-length byte array added to the
/// authenticator data when generating an attestation object for a credential.
///
/// The credential public key is carried as its raw CBOR bytes: this parser's
/// job is only to find the key's extent with the codec; narrowing it into a
/// usable public key (and judging its algorithm) is the verifier's business.
///
/// <https://w3c.github.io/webauthn/#attested-credential-data>
#[derive(Debug, Clone, PartialEq)]
pub struct AttestedCredentialData {
    /// The AAGUID of the authenticator.
    pub aaguid: Aaguid,

    /// The credential ID. Not public so the 1..=1023 length invariant holds.
    credential_id: Vec<u8>,

    /// The raw CBOR bytes of the credential public key, asserted to be a
    /// well-formed CBOR map.
    key_bytes: Vec<u8>,
}

impl AttestedCredentialData {
    /// Get read access to the credential ID.
    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    /// The raw CBOR encoding of the credential public key.
    pub fn key_bytes(&self) -> &[u8] {
        &self.key_bytes
    }

    fn from_reader(cursor: &mut Cursor<&[u8]>) -> Result<Self, AuthDataError> {
        let mut aaguid = [0; 16];
        cursor
            .read_exact(&mut aaguid)
            .map_err(|_| err(cursor.position() as usize, "missing AAGUID"))?;
        let aaguid = Aaguid(aaguid);

        let mut cred_len = [0; 2];
        cursor
            .read_exact(&mut cred_len)
            .map_err(|_| err(cursor.position() as usize, "missing credential ID length"))?;
        let cred_len: usize = u16::from_be_bytes(cred_len).into();
        if cred_len == 0 || cred_len > MAX_CREDENTIAL_ID_LENGTH {
            return Err(err(
                cursor.position() as usize,
                format!("credential ID length {cred_len} outside 1..=1023"),
            ));
        }

        let mut credential_id = vec![0; cred_len];
        cursor
            .read_exact(&mut credential_id)
            .map_err(|_| err(cursor.position() as usize, "truncated credential ID"))?;

        // The COSE key has no length prefix; its extent is whatever the CBOR
        // decoder consumes.
        let key_start = cursor.position() as usize;
        let cose_val = cbor::value_from_reader(cursor)
            .map_err(|e| err(e.offset.unwrap_or(key_start), e.reason))?;
        if !cose_val.is_map() {
            return Err(err(key_start, "credential public key is not a map"));
        }
        let key_end = cursor.position() as usize;
        let key_bytes = cursor.get_ref()[key_start..key_end].to_vec();

        Ok(Self {
            aaguid,
            credential_id,
            key_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use ciborium::cbor;

    use super::*;

    // Authenticator data extracted from a yubikey version 5.
    const YUBIKEY_AT_ED: &[u8] = &[
        0x74, 0xa6, 0xea, 0x92, 0x13, 0xc9, 0x9c, 0x2f, 0x74, 0xb2, 0x24, 0x92, 0xb3, 0x20, 0xcf,
        0x40, 0x26, 0x2a, 0x94, 0xc1, 0xa9, 0x50, 0xa0, 0x39, 0x7f, 0x29, 0x25, 0x0b, 0x60, 0x84,
        0x1e, 0xf0, 0xc5, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x30, 0x0c, 0x98, 0x51, 0xdc, 0x8b, 0xd1,
        0xef, 0x2d, 0x08, 0x4b, 0x20, 0x1c, 0xbf, 0x5e, 0x4c, 0x14, 0x04, 0x4f, 0xf8, 0x87, 0x04,
        0x11, 0x5e, 0x6c, 0x58, 0x94, 0xb8, 0x69, 0xbb, 0x45, 0x3c, 0x3f, 0xe2, 0x1e, 0xb1, 0x22,
        0x44, 0xc6, 0xe7, 0xe9, 0x6a, 0xbe, 0xd3, 0x0f, 0x18, 0x1b, 0x9f, 0x86, 0xa5, 0x01, 0x02,
        0x03, 0x26, 0x20, 0x01, 0x21, 0x58, 0x20, 0x0c, 0x98, 0x51, 0xdc, 0x8b, 0xd1, 0xef, 0x2d,
        0x08, 0x4b, 0x20, 0x1c, 0xbf, 0xad, 0xd9, 0xa6, 0x97, 0xbb, 0x48, 0xd9, 0xd7, 0xff, 0x91,
        0x0f, 0x0a, 0x6a, 0xc1, 0x0b, 0x91, 0x2b, 0xe9, 0x58, 0x22, 0x58, 0x20, 0x46, 0x78, 0x6f,
        0x2a, 0x95, 0x76, 0x69, 0x8c, 0x9f, 0x3a, 0xe2, 0x52, 0x3b, 0x4e, 0xb9, 0x4b, 0x8e, 0x07,
        0x4c, 0x35, 0xab, 0xc4, 0xdf, 0x68, 0x8f, 0xcd, 0x85, 0xd2, 0x9a, 0x01, 0xab, 0xba, 0xa1,
        0x6b, 0x63, 0x72, 0x65, 0x64, 0x50, 0x72, 0x6f, 0x74, 0x65, 0x63, 0x74, 0x02,
    ];

    // 37-byte header, 16-byte AAGUID, 2-byte length, 48-byte credential ID.
    const KEY_START: usize = 37 + 16 + 2 + 48;
    // trailing `{"credProtect": 2}` extension map
    const EXT_LEN: usize = 14;

    #[test]
    fn parse_authenticator_data_with_at_and_ed() {
        let auth_data =
            AuthenticatorData::parse(YUBIKEY_AT_ED).expect("could not parse authenticator data");

        assert_eq!(
            auth_data.flags,
            Flags::UP | Flags::UV | Flags::AT | Flags::ED
        );
        assert_eq!(auth_data.counter, 1);
        assert_eq!(auth_data.rp_id_hash(), &YUBIKEY_AT_ED[..32]);

        let acd = auth_data
            .attested_credential_data
            .expect("missing attested credential data");
        // interestingly a yubikey returns an empty AAGUID
        assert!(acd.aaguid.is_empty());
        assert_eq!(acd.credential_id(), &YUBIKEY_AT_ED[55..55 + 48]);
        assert_eq!(
            acd.key_bytes(),
            &YUBIKEY_AT_ED[KEY_START..YUBIKEY_AT_ED.len() - EXT_LEN]
        );

        assert_eq!(
            auth_data.extensions,
            Some(cbor!({"credProtect" => 2}).unwrap())
        );
    }

    #[test]
    fn trailing_byte_after_extensions_is_rejected() {
        let mut data = YUBIKEY_AT_ED.to_vec();
        data.push(0x00);
        let e = AuthenticatorData::parse(&data).unwrap_err();
        assert!(e.reason.contains("trailing"));
    }

    #[test]
    fn data_past_end_without_ed_flag_is_rejected() {
        let mut data = YUBIKEY_AT_ED.to_vec();
        // clear ED, leaving the extensions map as unexplained trailing bytes
        data[32] &= !0x80;
        AuthenticatorData::parse(&data).unwrap_err();
    }

    #[test]
    fn at_flag_without_attested_data_is_rejected() {
        let mut data = YUBIKEY_AT_ED[..37].to_vec();
        data[32] = 0x41; // UP | AT
        AuthenticatorData::parse(&data).unwrap_err();
    }

    #[test]
    fn plain_assertion_data_parses() {
        let mut data = YUBIKEY_AT_ED[..37].to_vec();
        data[32] = 0x05; // UP | UV
        let auth_data = AuthenticatorData::parse(&data).expect("could not parse");
        assert!(auth_data.attested_credential_data.is_none());
        assert!(auth_data.extensions.is_none());
        assert!(auth_data.user_present());
        assert!(auth_data.user_verified());
    }

    #[test]
    fn short_input_is_rejected() {
        AuthenticatorData::parse(&YUBIKEY_AT_ED[..36]).unwrap_err();
    }

    fn synthetic_attested(cred_id_len: usize) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x11; 32]); // rp id hash
        data.push(0x41); // UP | AT
        data.extend_from_slice(&[0, 0, 0, 9]); // counter
        data.extend_from_slice(&[0; 16]); // aaguid
        data.extend_from_slice(&(cred_id_len as u16).to_be_bytes());
        data.extend(std::iter::repeat(0xcd).take(cred_id_len));
        // minimal CBOR map standing in for the COSE key
        data.extend_from_slice(&[0xa1, 0x01, 0x02]);
        data
    }

    #[test]
    fn credential_id_length_bounds() {
        assert!(AuthenticatorData::parse(&synthetic_attested(1)).is_ok());
        assert!(AuthenticatorData::parse(&synthetic_attested(1023)).is_ok());
        AuthenticatorData::parse(&synthetic_attested(0)).unwrap_err();
        AuthenticatorData::parse(&synthetic_attested(1024)).unwrap_err();
    }
}
