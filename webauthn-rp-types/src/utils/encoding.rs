//! Encoding helpers shared by the `webauthn-rp` crates.
//!
//! WebAuthn transports bytes as base64url without padding, but deployed
//! clients are sloppy about it, so decoding accepts base64url and standard
//! base64, padded or not. Emission is always unpadded base64url.

use data_encoding::{Specification, BASE64, BASE64URL, BASE64URL_NOPAD, BASE64_NOPAD};

/// Convert bytes to standard base64 without padding.
pub fn base64(data: &[u8]) -> String {
    BASE64_NOPAD.encode(data)
}

/// Convert bytes to base64url without padding.
pub fn base64url(data: &[u8]) -> String {
    BASE64URL_NOPAD.encode(data)
}

/// Try parsing from standard base64, with or without padding.
pub fn try_from_base64(input: &str) -> Option<Vec<u8>> {
    let padding = BASE64.specification().padding.unwrap();
    let sane_string = input.trim_end_matches(padding);
    BASE64_NOPAD.decode(sane_string.as_bytes()).ok()
}

/// Try parsing from base64url, with or without padding.
pub fn try_from_base64url(input: &str) -> Option<Vec<u8>> {
    let specs = BASE64URL.specification();
    let padding = specs.padding.unwrap();
    let specs = Specification {
        check_trailing_bits: false,
        padding: None,
        ..specs
    };
    let encoding = specs.encoding().unwrap();
    let sane_string = input.trim_end_matches(padding);
    encoding.decode(sane_string.as_bytes()).ok()
}

/// Decode from base64url or standard base64, padded or not.
pub fn try_from_any_base64(input: &str) -> Option<Vec<u8>> {
    try_from_base64url(input).or_else(|| try_from_base64(input))
}
