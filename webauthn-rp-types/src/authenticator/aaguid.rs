use serde::{Deserialize, Serialize};

/// An Authenticator Attestation GUID is a 128-bit identifier.
///
/// It indicates the type (e.g. make and model) of an authenticator, and is
/// identical across all substantially identical authenticators made by the
/// same manufacturer so that Relying Parties may use it to infer properties
/// of the authenticator. Authenticators doing self or no attestation report
/// an all-zero AAGUID.
///
/// <https://w3c.github.io/webauthn/#sctn-authenticator-model>
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Aaguid(pub [u8; Self::LEN]);

impl Aaguid {
    const LEN: usize = 16;

    /// Generate an empty AAGUID.
    pub const fn new_empty() -> Self {
        Self([0; Self::LEN])
    }

    /// Whether this AAGUID is all zeroes.
    pub fn is_empty(&self) -> bool {
        self.0 == [0; Self::LEN]
    }
}

impl Default for Aaguid {
    fn default() -> Self {
        Self::new_empty()
    }
}

impl From<[u8; 16]> for Aaguid {
    fn from(inner: [u8; 16]) -> Self {
        Aaguid(inner)
    }
}

impl Serialize for Aaguid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Aaguid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct AaguidVisitor;
        impl<'de> serde::de::Visitor<'de> for AaguidVisitor {
            type Value = Aaguid;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "a byte string of {} bytes", Aaguid::LEN)
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.try_into().map(Aaguid).map_err(|_| {
                    E::custom(format!("byte string of len {} is not of len 16", v.len()))
                })
            }
        }
        deserializer.deserialize_bytes(AaguidVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::Aaguid;

    #[test]
    fn deserialize_byte_str_to_aaguid() {
        let cbor_bytes = [
            0x50, // bytes(16)
            0x02, 0x2b, 0xeb, 0xfd, 0x62, 0x3c, 0xac, 0x25, // data
            0xce, 0xe4, 0xd0, 0x90, 0xb9, 0xf8, 0xb5, 0xaf,
        ];

        let aaguid: Aaguid = ciborium::de::from_reader(cbor_bytes.as_slice())
            .expect("could not deserialize from byte string");
        assert_eq!(
            aaguid,
            Aaguid([
                0x02, 0x2b, 0xeb, 0xfd, 0x62, 0x3c, 0xac, 0x25, 0xce, 0xe4, 0xd0, 0x90, 0xb9, 0xf8,
                0xb5, 0xaf,
            ])
        );
    }

    #[test]
    fn new_empty_truly_zero() {
        assert!(Aaguid::new_empty().is_empty());
    }
}
