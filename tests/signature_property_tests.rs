//! Property-based tests for Ed25519 signature round-tripping (C1), the
//! same invariant the canonical-signing helpers in
//! `model::TransactionBody` and `model::Vote` all build on.

use {federated_ledger::crypto::Keypair, proptest::prelude::*};

proptest! {
  /// Property: a signature produced over a message always verifies
  /// against that same message and the signing key's public half.
  #[test]
  fn prop_sign_then_verify_roundtrips(msg in prop::collection::vec(any::<u8>(), 0..256)) {
    let kp = Keypair::generate(&mut rand::thread_rng());
    let sig = kp.sign(&msg);
    prop_assert!(kp.public().verify(&msg, &sig));
  }

  /// Property: flipping any single byte of the signed message breaks
  /// verification against the original signature.
  #[test]
  fn prop_tampered_message_fails_verification(
    msg in prop::collection::vec(any::<u8>(), 1..256),
    flip_index in any::<usize>(),
    flip_mask in 1u8..=255,
  ) {
    let kp = Keypair::generate(&mut rand::thread_rng());
    let sig = kp.sign(&msg);

    let mut tampered = msg.clone();
    let i = flip_index % tampered.len();
    tampered[i] ^= flip_mask;

    prop_assert!(!kp.public().verify(&tampered, &sig));
  }

  /// Property: a signature never verifies against a different keypair's
  /// public key, even for the exact message it was produced for.
  #[test]
  fn prop_signature_does_not_verify_under_a_different_key(
    msg in prop::collection::vec(any::<u8>(), 0..256),
  ) {
    let signer = Keypair::generate(&mut rand::thread_rng());
    let other = Keypair::generate(&mut rand::thread_rng());
    let sig = signer.sign(&msg);
    prop_assert!(!other.public().verify(&msg, &sig));
  }
}
