//! In-memory stand-ins for the external encryption co-processor, the
//! account signer and the decryption service. Used for testing and
//! benchmarking; none of this is a real encryption scheme.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rand_core::{CryptoRng, RngCore};
use sha3::{Digest, Keccak256};

use crate::authorize::{unix_now, EphemeralKeys, PlainValue, UserDecryptRequest};
use crate::errors::{Error, Result};
use crate::handle::{AccountAddress, CiphertextHandle};
use crate::ledger::LedgerConfig;
use crate::{
    AccessController, Balance, DecryptionService, Encryptor, HomomorphicAdder, StructuredSigner,
};

const TEST_CHAIN_ID: u64 = 31_337;

/// A ledger configuration with a fixed non-zero contract address.
pub fn test_config() -> LedgerConfig {
    LedgerConfig::new(AccountAddress::from_bytes([0x51; 20]), TEST_CHAIN_ID)
        .expect("non-zero contract address")
}

#[derive(Default)]
struct CoprocessorState {
    plaintexts: BTreeMap<CiphertextHandle, Balance>,
    acl: BTreeMap<CiphertextHandle, BTreeSet<AccountAddress>>,
    nonce: u64,
}

/// Trusted co-processor double.
///
/// It keeps the plaintext table a real scheme would keep encrypted and
/// derives a fresh opaque handle for every ciphertext it produces, so
/// handles behave like the real thing and carry no meaning without the
/// service.
#[derive(Clone, Default)]
pub struct InMemoryCoprocessor {
    state: Arc<RwLock<CoprocessorState>>,
    fail_next: Arc<AtomicBool>,
}

impl InMemoryCoprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next capability call fail, for atomicity tests.
    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Result<()> {
        ensure!(
            !self.fail_next.swap(false, Ordering::SeqCst),
            Error::CoprocessorUnavailable
        );
        Ok(())
    }

    fn fresh_handle(state: &mut CoprocessorState, amount: Balance) -> CiphertextHandle {
        state.nonce += 1;
        let mut hasher = Keccak256::new();
        hasher.update(b"confidential-swap-test-handle");
        hasher.update(state.nonce.to_le_bytes());
        hasher.update(amount.to_le_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        CiphertextHandle::from_bytes(bytes)
    }

    fn plaintext_of(state: &CoprocessorState, handle: &CiphertextHandle) -> Option<Balance> {
        if handle.is_zero() {
            return Some(0);
        }
        state.plaintexts.get(handle).copied()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CoprocessorState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CoprocessorState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Encryptor for InMemoryCoprocessor {
    fn encrypt(&self, amount: Balance) -> Result<CiphertextHandle> {
        self.take_failure()?;
        let mut state = self.write();
        let handle = Self::fresh_handle(&mut state, amount);
        state.plaintexts.insert(handle, amount);
        Ok(handle)
    }
}

impl HomomorphicAdder for InMemoryCoprocessor {
    fn add(&self, a: &CiphertextHandle, b: &CiphertextHandle) -> Result<CiphertextHandle> {
        self.take_failure()?;
        let mut state = self.write();
        let lhs = Self::plaintext_of(&state, a).ok_or(Error::CoprocessorUnavailable)?;
        let rhs = Self::plaintext_of(&state, b).ok_or(Error::CoprocessorUnavailable)?;
        let sum = lhs.checked_add(rhs).ok_or(Error::AmountOutOfRange {
            amount: lhs as u128 + rhs as u128,
        })?;
        let handle = Self::fresh_handle(&mut state, sum);
        state.plaintexts.insert(handle, sum);
        Ok(handle)
    }
}

impl AccessController for InMemoryCoprocessor {
    fn allow(&self, handle: &CiphertextHandle, account: &AccountAddress) -> Result<()> {
        self.take_failure()?;
        let mut state = self.write();
        ensure!(
            handle.is_zero() || state.plaintexts.contains_key(handle),
            Error::CoprocessorUnavailable
        );
        state.acl.entry(*handle).or_default().insert(*account);
        Ok(())
    }
}

/// Deterministic account signer for tests.
///
/// The scheme is keyed Keccak over the signing digest; the in-memory
/// service verifies with the shared secret. Test-only, not a signature.
#[derive(Clone)]
pub struct TestSigner {
    address: AccountAddress,
    secret: [u8; 32],
}

impl TestSigner {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut address = [0u8; 20];
        rng.fill_bytes(&mut address);
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Self {
            address: AccountAddress::from_bytes(address),
            secret,
        }
    }

    fn sign_digest(secret: &[u8; 32], digest: &[u8; 32]) -> Vec<u8> {
        let mut hasher = Keccak256::new();
        hasher.update(b"confidential-swap-test-signature");
        hasher.update(secret);
        hasher.update(digest);
        hasher.finalize().to_vec()
    }
}

impl StructuredSigner for TestSigner {
    fn address(&self) -> AccountAddress {
        self.address
    }

    fn sign_structured(&self, digest: &[u8; 32]) -> Result<Vec<u8>> {
        Ok(Self::sign_digest(&self.secret, digest))
    }
}

/// Decryption service double sharing the co-processor's state.
///
/// Verifies the signature against the recomputed transcript digest,
/// checks the validity window and the requester's rights on every handle
/// before disclosing anything.
pub struct InMemoryDecryptionService {
    coprocessor: InMemoryCoprocessor,
    verifiers: Mutex<BTreeMap<AccountAddress, [u8; 32]>>,
    now_override: AtomicU64,
    calls: AtomicU64,
    fail_next: AtomicBool,
    time_out_next: AtomicBool,
    omit_next: AtomicBool,
    corrupt_next: AtomicBool,
    answer_in_text: AtomicBool,
}

impl InMemoryDecryptionService {
    pub fn new(coprocessor: InMemoryCoprocessor) -> Self {
        Self {
            coprocessor,
            verifiers: Mutex::new(BTreeMap::new()),
            now_override: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            fail_next: AtomicBool::new(false),
            time_out_next: AtomicBool::new(false),
            omit_next: AtomicBool::new(false),
            corrupt_next: AtomicBool::new(false),
            answer_in_text: AtomicBool::new(false),
        }
    }

    /// Registers an account's verification secret with the service.
    pub fn register_signer(&self, signer: &TestSigner) {
        let mut verifiers = self.verifiers.lock().unwrap_or_else(PoisonError::into_inner);
        verifiers.insert(signer.address, signer.secret);
    }

    /// Number of decryption round trips served or refused so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Pins the service clock, in unix seconds. Zero restores wall clock.
    pub fn set_now(&self, now: u64) {
        self.now_override.store(now, Ordering::SeqCst);
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn time_out_next_call(&self) {
        self.time_out_next.store(true, Ordering::SeqCst);
    }

    /// Drops one handle from the next response.
    pub fn omit_next_value(&self) {
        self.omit_next.store(true, Ordering::SeqCst);
    }

    /// Answers the next request with an undecodable value.
    pub fn corrupt_next_value(&self) {
        self.corrupt_next.store(true, Ordering::SeqCst);
    }

    /// Answers with decimal strings instead of native integers.
    pub fn answer_in_text(&self, enabled: bool) {
        self.answer_in_text.store(enabled, Ordering::SeqCst);
    }

    fn now(&self) -> u64 {
        match self.now_override.load(Ordering::SeqCst) {
            0 => unix_now(),
            pinned => pinned,
        }
    }
}

impl DecryptionService for InMemoryDecryptionService {
    fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
        signature: &[u8],
        keys: &EphemeralKeys,
    ) -> Result<BTreeMap<CiphertextHandle, PlainValue>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ensure!(
            !self.fail_next.swap(false, Ordering::SeqCst),
            Error::ServiceUnavailable
        );
        ensure!(
            !self.time_out_next.swap(false, Ordering::SeqCst),
            Error::ResponseTimeout
        );

        // The keypair presented for decryption must be the one the
        // account signed off on.
        ensure!(
            request.public_key == *keys.public(),
            Error::SignatureRejected
        );

        request.check_window(self.now())?;

        {
            let verifiers = self.verifiers.lock().unwrap_or_else(PoisonError::into_inner);
            let secret = verifiers
                .get(&request.account)
                .ok_or(Error::SignatureRejected)?;
            let expected = TestSigner::sign_digest(secret, &request.signing_digest());
            ensure!(signature == expected.as_slice(), Error::SignatureRejected);
        }

        let omit = self.omit_next.swap(false, Ordering::SeqCst);
        let corrupt = self.corrupt_next.swap(false, Ordering::SeqCst);
        let text = self.answer_in_text.load(Ordering::SeqCst);

        let state = self.coprocessor.read();
        let mut values = BTreeMap::new();
        for pair in &request.pairs {
            let allowed = state
                .acl
                .get(&pair.handle)
                .map_or(false, |accounts| accounts.contains(&request.account));
            ensure!(allowed, Error::HandleNotAuthorized { handle: pair.handle });
            let value = InMemoryCoprocessor::plaintext_of(&state, &pair.handle)
                .ok_or(Error::HandleNotAuthorized { handle: pair.handle })?;

            if omit && values.is_empty() {
                continue;
            }
            let value = if corrupt {
                PlainValue::Text("not-a-number".into())
            } else if text {
                PlainValue::Text(value.to_string())
            } else {
                PlainValue::U64(value)
            };
            values.insert(pair.handle, value);
        }
        Ok(values)
    }
}
