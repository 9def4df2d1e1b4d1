use cm_crypto::{aead, fingerprint, CryptoError, KeyAgreement, KeyStore};

#[test]
fn two_parties_exchange_hello_bound_to_conversation() {
    let alice = KeyAgreement::default();
    let bob = KeyAgreement::default();

    let a_pub = alice.key_store().generate_identity("A").unwrap().export_public_key();
    let b_pub = bob.key_store().generate_identity("B").unwrap().export_public_key();

    let a_secret = alice.shared_secret("A", "B", &b_pub).unwrap();
    let b_secret = bob.shared_secret("B", "A", &a_pub).unwrap();

    let sealed = aead::encrypt("hello", &a_secret, "messaging:chan1:A->B").unwrap();

    let plaintext =
        aead::decrypt(&sealed.ciphertext, &sealed.iv, &b_secret, "messaging:chan1:A->B").unwrap();
    assert_eq!(plaintext, "hello");

    // Same envelope replayed into a different conversation.
    let replay = aead::decrypt(&sealed.ciphertext, &sealed.iv, &b_secret, "messaging:chan1:A->C");
    assert!(matches!(replay, Err(CryptoError::AuthenticationFailed)));
}

#[test]
fn third_party_cannot_decrypt() {
    let store = KeyStore::new();
    let agreement = KeyAgreement::default();
    agreement.key_store().generate_identity("A").unwrap();
    let b_pub = store.generate_identity("B").unwrap().export_public_key();

    let eve = KeyAgreement::default();
    eve.key_store().generate_identity("E").unwrap();

    let ab = agreement.shared_secret("A", "B", &b_pub).unwrap();
    let eb = eve.shared_secret("E", "B", &b_pub).unwrap();

    let sealed = aead::encrypt("for bob only", &ab, "messaging:dm:A->B").unwrap();
    assert!(aead::decrypt(&sealed.ciphertext, &sealed.iv, &eb, "messaging:dm:A->B").is_err());
}

#[test]
fn logout_makes_old_secret_unreachable_and_relogin_rederives() {
    let agreement = KeyAgreement::default();
    let peer = KeyStore::new().generate_identity("B").unwrap().export_public_key();

    agreement.key_store().generate_identity("A").unwrap();
    let before = agreement.shared_secret("A", "B", &peer).unwrap();

    agreement.clear("A");
    assert!(matches!(
        agreement.shared_secret("A", "B", &peer),
        Err(CryptoError::KeyNotFound(_))
    ));

    agreement.key_store().generate_identity("A").unwrap();
    let after = agreement.shared_secret("A", "B", &peer).unwrap();
    assert_ne!(before, after);
}

#[test]
fn fingerprints_differ_across_many_keys() {
    let store = KeyStore::new();
    let mut seen = std::collections::HashSet::new();
    for i in 0..64 {
        let blob = store.generate_identity(&format!("u{i}")).unwrap().export_public_key();
        assert!(seen.insert(fingerprint(&blob)));
    }
}
