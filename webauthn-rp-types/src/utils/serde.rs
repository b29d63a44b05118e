//! Utilities to be used in serde derives for more robust (de)serializations.

use serde::{Deserialize, Deserializer};

/// Many fields in the WebAuthn spec have the following wording.
///
/// > The values SHOULD be members of `T` but client platforms MUST ignore unknown values.
///
/// This method is a simple way of ignoring unknown values without failing deserialization.
pub fn ignore_unknown<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(T::deserialize(de).unwrap_or_default())
}

/// Same as [`ignore_unknown`] for optional sequences, where unknown entries are
/// dropped rather than defaulted.
pub fn ignore_unknown_opt_vec<'de, D, T>(de: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let values: Option<Vec<serde_json::Value>> = Deserialize::deserialize(de)?;
    Ok(values.map(|values| {
        values
            .into_iter()
            .map(|v| T::deserialize(v).unwrap_or_default())
            .collect()
    }))
}

/// Timeouts are specified as integer milliseconds, but some clients send them
/// stringified. Accept both.
pub fn maybe_stringified<'de, D>(de: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u32),
        String(String),
    }

    match Option::<NumOrString>::deserialize(de)? {
        Some(NumOrString::Num(n)) => Ok(Some(n)),
        Some(NumOrString::String(s)) => Ok(s.parse().ok()),
        None => Ok(None),
    }
}
