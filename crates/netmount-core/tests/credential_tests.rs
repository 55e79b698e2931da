//! Credential codec integration tests: round trips and tamper detection.

use netmount_core::crypto::{CredentialCodec, CryptoError, KdfParams};
use proptest::prelude::*;
use secrecy::SecretString;

fn codec() -> CredentialCodec {
    CredentialCodec::with_params(
        SecretString::from("test-host-secret"),
        KdfParams::insecure_fast(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_credential_roundtrip(password in ".{0,64}") {
        let codec = codec();
        let token = codec.encrypt(&password).unwrap();
        let decrypted = codec.decrypt(&token).unwrap();
        prop_assert_eq!(password.as_str(), decrypted.as_str());
    }

    #[test]
    fn test_credential_tamper_detected(password in ".{1,64}", flip in any::<usize>()) {
        let codec = codec();
        let token = codec.encrypt(&password).unwrap();

        // Flip one hex digit anywhere in the token (delimiters excluded)
        let positions: Vec<usize> = token
            .char_indices()
            .filter(|(_, c)| *c != ':')
            .map(|(i, _)| i)
            .collect();
        let pos = positions[flip % positions.len()];
        let original = token.as_bytes()[pos];
        let replacement = if original == b'0' { '1' } else { '0' };
        let mut tampered = token.clone();
        tampered.replace_range(pos..=pos, &replacement.to_string());

        let result = codec.decrypt(&tampered);
        prop_assert!(
            matches!(result, Err(CryptoError::Decryption { .. })),
            "tampered token accepted"
        );
    }
}

#[test]
fn test_default_params_roundtrip() {
    let codec = CredentialCodec::new(SecretString::from("production-like-secret"));
    let token = codec.encrypt("p@ss,word=with;chars").unwrap();
    assert_eq!(codec.decrypt(&token).unwrap().as_str(), "p@ss,word=with;chars");
}

#[test]
fn test_truncated_token_rejected() {
    let codec = codec();
    let token = codec.encrypt("password").unwrap();
    let truncated = &token[..token.len() - 2];
    assert!(matches!(
        codec.decrypt(truncated),
        Err(CryptoError::Decryption { .. })
    ));
}
