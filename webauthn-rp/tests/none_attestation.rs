//! Registration with `none` attestation, the common path for privacy-
//! preserving authenticators, against a locally assembled attestation object.

use ciborium::value::Value;
use coset::{iana, CborSerializable, CoseKeyBuilder};
use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use webauthn_rp::attestation::{AttestationType, TrustPath};
use webauthn_rp::types::encoding;
use webauthn_rp::types::webauthn::{
    AuthenticatorAttestationResponse, PublicKeyCredential, PublicKeyCredentialType,
    RegistrationPublicKeyCredential,
};
use webauthn_rp::{Error, Policy, RelyingParty, TrustAnchors};

const RP_ID: &str = "future.example.com";
const ORIGIN: &str = "https://future.example.com";
const CHALLENGE: &[u8] = b"sixteen-byte-chg";

fn none_attestation_credential() -> RegistrationPublicKeyCredential {
    let signing = SigningKey::random(&mut OsRng);
    let point = signing.verifying_key().to_encoded_point(false);
    let key = CoseKeyBuilder::new_ec2_pub_key(
        iana::EllipticCurve::P_256,
        point.x().unwrap().to_vec(),
        point.y().unwrap().to_vec(),
    )
    .algorithm(iana::Algorithm::ES256)
    .build();
    let credential_id = vec![0x42; 32];

    let mut auth_data = Vec::new();
    auth_data.extend_from_slice(&Sha256::digest(RP_ID.as_bytes()));
    auth_data.push(0x45); // UP | UV | AT
    auth_data.extend_from_slice(&1u32.to_be_bytes());
    auth_data.extend_from_slice(&[0; 16]); // zero AAGUID
    auth_data.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
    auth_data.extend_from_slice(&credential_id);
    auth_data.extend_from_slice(&key.to_vec().unwrap());

    let attestation_object = {
        let value = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();
        bytes
    };

    let client_data_json = format!(
        r#"{{"type":"webauthn.create","challenge":"{}","origin":"{ORIGIN}","crossOrigin":false}}"#,
        encoding::base64url(CHALLENGE)
    )
    .into_bytes();

    PublicKeyCredential {
        id: encoding::base64url(&credential_id),
        raw_id: credential_id.into(),
        ty: PublicKeyCredentialType::PublicKey,
        response: AuthenticatorAttestationResponse {
            client_data_json: client_data_json.into(),
            attestation_object: attestation_object.into(),
            transports: None,
        },
    }
}

fn rp() -> RelyingParty {
    RelyingParty::new(RP_ID, vec![ORIGIN.parse().unwrap()])
}

#[test]
fn none_attestation_registers() {
    let credential = none_attestation_credential();
    let registered = rp()
        .verify_registration(&credential, CHALLENGE, &TrustAnchors::new())
        .expect("registration should succeed");

    assert_eq!(registered.attestation_type, AttestationType::None);
    assert_eq!(registered.trust_path, TrustPath::Empty);
    assert_eq!(registered.sign_count, 1);
    assert!(registered.aaguid.is_empty());
    assert_eq!(registered.credential_id, vec![0x42; 32]);
}

#[test]
fn policy_can_reject_none_attestation() {
    let credential = none_attestation_credential();
    let rp = rp().with_policy(Policy {
        allow_none_attestation: false,
        ..Policy::default()
    });

    assert!(matches!(
        rp.verify_registration(&credential, CHALLENGE, &TrustAnchors::new()),
        Err(Error::AttestationPolicyRejected(_))
    ));
}

#[test]
fn registered_credential_round_trips_into_authentication_state() {
    let credential = none_attestation_credential();
    let registered = rp()
        .verify_registration(&credential, CHALLENGE, &TrustAnchors::new())
        .unwrap();

    // The COSE key bytes the registration result carries decode cleanly for
    // the authentication ceremony's use.
    let stored = webauthn_rp::StoredCredential {
        credential_id: registered.credential_id,
        public_key: registered.public_key,
        sign_count: registered.sign_count,
    };
    assert_eq!(stored.sign_count, 1);
    assert!(!stored.public_key.is_empty());
}
