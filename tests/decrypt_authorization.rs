use std::collections::BTreeMap;

use confidential_swap::{
    testing::{self, InMemoryCoprocessor, InMemoryDecryptionService, TestSigner},
    AttemptState, Balance, CiphertextHandle, ConfidentialLedger, DecryptAttempt,
    DecryptionAuthorizer, DecryptionService, Error, ErrorClass, ExchangeRate, HandleContractPair,
    StructuredSigner,
};
use rand::thread_rng;

const ONE_NATIVE_UNIT: u128 = 1_000_000_000_000_000_000;
const NOW: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

struct Harness {
    ledger: ConfidentialLedger<InMemoryCoprocessor>,
    service: InMemoryDecryptionService,
    signer: TestSigner,
}

/// One funded account with a registered signer and a pinned service clock.
fn funded_harness() -> Harness {
    let mut rng = thread_rng();
    let coprocessor = InMemoryCoprocessor::new();
    let ledger = ConfidentialLedger::new(
        testing::test_config(),
        ExchangeRate::default(),
        coprocessor.clone(),
    );
    let service = InMemoryDecryptionService::new(coprocessor);
    service.set_now(NOW);
    let signer = TestSigner::generate(&mut rng);
    service.register_signer(&signer);
    ledger
        .deposit(&signer.address(), ONE_NATIVE_UNIT)
        .expect("deposit accepted");
    Harness {
        ledger,
        service,
        signer,
    }
}

fn balance_pair(harness: &Harness) -> HandleContractPair {
    HandleContractPair {
        handle: harness.ledger.encrypted_balance_of(&harness.signer.address()),
        contract: harness.ledger.config().contract(),
    }
}

/// Drives a fresh attempt up to the signed state for the given window.
fn signed_attempt(harness: &Harness, valid_from: u64, duration_days: u64) -> DecryptAttempt {
    let mut rng = thread_rng();
    let mut attempt = DecryptAttempt::new(
        *harness.ledger.config(),
        harness.signer.address(),
        vec![balance_pair(harness)],
        &mut rng,
    );
    attempt.generate_keypair(&mut rng).expect("keypair");
    attempt
        .sign_message(&harness.signer, valid_from, duration_days)
        .expect("signed");
    attempt
}

#[test]
fn sentinel_decryption_is_a_local_no_op() {
    let harness = funded_harness();
    let authorizer = DecryptionAuthorizer::new(*harness.ledger.config(), &harness.service);

    let sentinel = HandleContractPair {
        handle: CiphertextHandle::zero(),
        contract: harness.ledger.config().contract(),
    };
    let plain = authorizer
        .request_decryption(&[sentinel], &harness.signer, &mut thread_rng())
        .expect("local result");

    assert_eq!(plain[&CiphertextHandle::zero()], 0);
    // No round trip happened.
    assert_eq!(harness.service.calls(), 0);
}

#[test]
fn in_window_attempt_resolves_plaintext() {
    let harness = funded_harness();
    let pair = balance_pair(&harness);

    let mut attempt = signed_attempt(&harness, NOW - 60, 10);
    let plain = attempt.submit(&harness.service).expect("resolved");

    assert_eq!(attempt.state(), AttemptState::Resolved);
    assert_eq!(plain[&pair.handle], 2_300_000_000);
}

#[test]
fn text_answers_normalize_without_floats() {
    let harness = funded_harness();
    harness.service.answer_in_text(true);
    let pair = balance_pair(&harness);

    let mut attempt = signed_attempt(&harness, NOW - 60, 10);
    let plain = attempt.submit(&harness.service).expect("resolved");
    assert_eq!(plain[&pair.handle], 2_300_000_000);
}

#[test]
fn expired_window_is_rejected() {
    let harness = funded_harness();

    // Signed eleven days ago with a ten day window.
    let valid_from = NOW - 11 * DAY;
    let mut attempt = signed_attempt(&harness, valid_from, 10);
    let err = attempt.submit(&harness.service).err().expect("rejected");

    assert_eq!(
        err,
        Error::AuthorizationExpired {
            expires_at: valid_from + 10 * DAY
        }
    );
    assert_eq!(err.class(), ErrorClass::Authorization);
    assert_eq!(attempt.state(), AttemptState::Rejected);
}

#[test]
fn future_window_is_rejected() {
    let harness = funded_harness();

    let valid_from = NOW + DAY;
    let mut attempt = signed_attempt(&harness, valid_from, 10);
    let err = attempt.submit(&harness.service).err().expect("rejected");

    assert_eq!(err, Error::AuthorizationNotYetValid { valid_from });
}

#[test]
fn signature_is_not_accepted_for_another_ephemeral_key() {
    let mut rng = thread_rng();
    let harness = funded_harness();

    let attempt = signed_attempt(&harness, NOW, 10);
    // Replay the signed message with a keypair the account never saw.
    let foreign = confidential_swap::EphemeralKeys::generate(&mut rng);
    let request = confidential_swap::UserDecryptRequest {
        pairs: vec![balance_pair(&harness)],
        public_key: *foreign.public(),
        account: harness.signer.address(),
        chain_id: harness.ledger.config().chain_id(),
        valid_from: NOW,
        duration_days: 10,
    };
    // Sign over the original attempt's message, then swap the key in.
    drop(attempt);
    let original = confidential_swap::UserDecryptRequest {
        public_key: [1u8; 32],
        ..request.clone()
    };
    let signature = harness
        .signer
        .sign_structured(&original.signing_digest())
        .expect("signed");

    let err = harness
        .service
        .user_decrypt(&request, &signature, &foreign)
        .err()
        .expect("rejected");
    assert_eq!(err, Error::SignatureRejected);
}

#[test]
fn signature_is_not_accepted_for_another_handle_set() {
    let mut rng = thread_rng();
    let harness = funded_harness();

    // A second funded handle under the same account.
    harness
        .ledger
        .deposit(&harness.signer.address(), ONE_NATIVE_UNIT)
        .expect("second deposit");

    let keys = confidential_swap::EphemeralKeys::generate(&mut rng);
    let signed_over = confidential_swap::UserDecryptRequest {
        pairs: vec![balance_pair(&harness)],
        public_key: *keys.public(),
        account: harness.signer.address(),
        chain_id: harness.ledger.config().chain_id(),
        valid_from: NOW,
        duration_days: 10,
    };
    let signature = harness
        .signer
        .sign_structured(&signed_over.signing_digest())
        .expect("signed");

    // Present the same signature over a different handle set.
    let mut tampered = signed_over.clone();
    tampered.pairs.push(HandleContractPair {
        handle: CiphertextHandle::from_bytes([0xee; 32]),
        contract: harness.ledger.config().contract(),
    });

    let err = harness
        .service
        .user_decrypt(&tampered, &signature, &keys)
        .err()
        .expect("rejected");
    assert_eq!(err, Error::SignatureRejected);
}

#[test]
fn foreign_handle_is_not_disclosed() {
    let mut rng = thread_rng();
    let harness = funded_harness();

    // Mallory is registered with the service but was never allowed on the
    // funded handle.
    let mallory = TestSigner::generate(&mut rng);
    harness.service.register_signer(&mallory);
    let pair = balance_pair(&harness);

    let mut attempt = DecryptAttempt::new(
        *harness.ledger.config(),
        mallory.address(),
        vec![pair],
        &mut rng,
    );
    attempt.generate_keypair(&mut rng).expect("keypair");
    attempt.sign_message(&mallory, NOW, 10).expect("signed");
    let err = attempt.submit(&harness.service).err().expect("rejected");

    assert_eq!(err, Error::HandleNotAuthorized { handle: pair.handle });
    assert_eq!(err.class(), ErrorClass::Authorization);
}

#[test]
fn unregistered_account_is_rejected() {
    let mut rng = thread_rng();
    let harness = funded_harness();
    let stranger = TestSigner::generate(&mut rng);

    let mut attempt = DecryptAttempt::new(
        *harness.ledger.config(),
        stranger.address(),
        vec![balance_pair(&harness)],
        &mut rng,
    );
    attempt.generate_keypair(&mut rng).expect("keypair");
    attempt.sign_message(&stranger, NOW, 10).expect("signed");

    assert_eq!(
        attempt.submit(&harness.service),
        Err(Error::SignatureRejected)
    );
}

#[test]
fn timeout_is_distinct_and_retryable_with_fresh_keys() {
    let harness = funded_harness();
    let pair = balance_pair(&harness);

    harness.service.time_out_next_call();
    let mut attempt = signed_attempt(&harness, NOW, 10);
    let err = attempt.submit(&harness.service).err().expect("timed out");
    assert_eq!(err, Error::ResponseTimeout);
    assert_eq!(err.class(), ErrorClass::Connectivity);
    assert_eq!(attempt.state(), AttemptState::TimedOut);

    // The timed out attempt is terminal; a fresh one succeeds.
    assert_eq!(
        attempt.submit(&harness.service),
        Err(Error::AttemptOutOfOrder {
            expected: AttemptState::MessageSigned,
            actual: AttemptState::TimedOut,
        })
    );
    let mut retry = signed_attempt(&harness, NOW, 10);
    let plain = retry.submit(&harness.service).expect("resolved");
    assert_eq!(plain[&pair.handle], 2_300_000_000);
}

#[test]
fn service_outage_is_a_connectivity_error() {
    let harness = funded_harness();

    harness.service.fail_next_call();
    let mut attempt = signed_attempt(&harness, NOW, 10);
    let err = attempt.submit(&harness.service).err().expect("failed");

    assert_eq!(err, Error::ServiceUnavailable);
    assert_eq!(err.class(), ErrorClass::Connectivity);
    assert_eq!(attempt.state(), AttemptState::Rejected);
}

#[test]
fn undecodable_answer_is_a_decoding_error() {
    let harness = funded_harness();

    harness.service.corrupt_next_value();
    let mut attempt = signed_attempt(&harness, NOW, 10);
    let err = attempt.submit(&harness.service).err().expect("rejected");

    assert_eq!(
        err,
        Error::PlaintextDecode {
            value: "not-a-number".into()
        }
    );
    assert_eq!(err.class(), ErrorClass::Decoding);
    assert_eq!(attempt.state(), AttemptState::Rejected);
}

#[test]
fn missing_answer_is_a_decoding_error() {
    let harness = funded_harness();
    let pair = balance_pair(&harness);

    harness.service.omit_next_value();
    let mut attempt = signed_attempt(&harness, NOW, 10);
    let err = attempt.submit(&harness.service).err().expect("rejected");

    assert_eq!(err, Error::MissingPlaintext { handle: pair.handle });
    assert_eq!(err.class(), ErrorClass::Decoding);
}

#[test]
fn attempt_refuses_out_of_order_transitions() {
    let mut rng = thread_rng();
    let harness = funded_harness();

    let mut attempt = DecryptAttempt::new(
        *harness.ledger.config(),
        harness.signer.address(),
        vec![balance_pair(&harness)],
        &mut rng,
    );
    assert_eq!(attempt.state(), AttemptState::Idle);

    // Signing before the keypair exists is refused.
    assert_eq!(
        attempt.sign_message(&harness.signer, NOW, 10),
        Err(Error::AttemptOutOfOrder {
            expected: AttemptState::KeypairGenerated,
            actual: AttemptState::Idle,
        })
    );
    // So is submitting before signing.
    assert_eq!(
        attempt.submit(&harness.service),
        Err(Error::AttemptOutOfOrder {
            expected: AttemptState::MessageSigned,
            actual: AttemptState::Idle,
        })
    );

    attempt.generate_keypair(&mut rng).expect("keypair");
    assert_eq!(
        attempt.generate_keypair(&mut rng),
        Err(Error::AttemptOutOfOrder {
            expected: AttemptState::Idle,
            actual: AttemptState::KeypairGenerated,
        })
    );
}

#[test]
fn concurrent_attempts_do_not_share_credentials() {
    let harness = funded_harness();

    let first = signed_attempt(&harness, NOW, 10);
    let second = signed_attempt(&harness, NOW, 10);
    // Both attempts are independently valid and carry distinct ids.
    assert_ne!(first.id(), second.id());

    let mut first = first;
    let mut second = second;
    let a: BTreeMap<CiphertextHandle, Balance> =
        first.submit(&harness.service).expect("first resolves");
    let b = second.submit(&harness.service).expect("second resolves");
    assert_eq!(a, b);
    assert_eq!(harness.service.calls(), 2);
}
