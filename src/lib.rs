//! Core building blocks of a confidential token swap: a ledger of
//! encrypted balances and the user decryption authorization protocol.
//!
//! Balances never exist in plaintext on the ledger. Each account owns one
//! opaque [`CiphertextHandle`]; deposits are quoted at a fixed rate and
//! accumulated homomorphically by an external encryption co-processor, and
//! plaintext values are only disclosed off-chain through a signed,
//! time-bounded authorization verified by a decryption service.
//!
//! The homomorphic scheme itself is out of scope. Computing a ciphertext,
//! adding two ciphertexts and decrypting under an authorization are
//! capabilities injected through the [`Encryptor`], [`HomomorphicAdder`],
//! [`AccessController`] and [`DecryptionService`] traits, so the core stays
//! independent of any specific encryption backend.

use std::collections::BTreeMap;

#[macro_use]
pub(crate) mod macros;

pub mod errors;

pub mod authorize;
pub mod handle;
pub mod ledger;
pub mod rate;
pub mod testing;

pub use authorize::{
    AttemptState, DecryptAttempt, DecryptionAuthorizer, EphemeralKeys, HandleContractPair,
    PlainValue, UserDecryptRequest,
};
pub use errors::{Error, ErrorClass, Result};
pub use handle::{AccountAddress, CiphertextHandle};
pub use ledger::{ConfidentialLedger, LedgerConfig};
pub use rate::{ExchangeRate, NativeAmount};

/// The token balance value to keep confidential.
///
/// The co-processor encrypts balances as 64-bit integers, so the plaintext
/// domain is limited to 64 bits and quoting rejects anything larger.
pub type Balance = u64;
pub const BALANCE_RANGE: u32 = 64;

// -------------------------------------------------------------------------------------
// -                              Capability traits                                    -
// -------------------------------------------------------------------------------------

/// Computes the ciphertext of a plaintext token amount and returns the
/// handle referencing it.
pub trait Encryptor {
    fn encrypt(&self, amount: Balance) -> Result<CiphertextHandle>;
}

/// Combines two ciphertexts into one whose decryption equals the sum of
/// the two plaintexts, without decrypting either operand.
pub trait HomomorphicAdder {
    /// The sentinel handle is a valid operand and behaves as plaintext zero.
    fn add(&self, a: &CiphertextHandle, b: &CiphertextHandle) -> Result<CiphertextHandle>;
}

/// Grants an account the right to request decryption of a handle.
pub trait AccessController {
    fn allow(&self, handle: &CiphertextHandle, account: &AccountAddress) -> Result<()>;
}

/// Signs the domain-separated digest of a structured message with the
/// account's own signing authority.
///
/// This is the *authorization* key. The ephemeral keypair of a decrypt
/// attempt is the *decryption* key and must never be used here.
pub trait StructuredSigner {
    /// The account address this signer speaks for.
    fn address(&self) -> AccountAddress;

    fn sign_structured(&self, digest: &[u8; 32]) -> Result<Vec<u8>>;
}

/// Off-chain service that verifies an authorization and discloses the
/// plaintext value of each requested handle.
pub trait DecryptionService {
    /// Verifies `signature` over the structured `request`, checks the
    /// validity window and the requester's rights on every handle, and
    /// returns the plaintext values keyed by handle.
    fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
        signature: &[u8],
        keys: &EphemeralKeys,
    ) -> Result<BTreeMap<CiphertextHandle, PlainValue>>;
}

impl<T: DecryptionService + ?Sized> DecryptionService for &T {
    fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
        signature: &[u8],
        keys: &EphemeralKeys,
    ) -> Result<BTreeMap<CiphertextHandle, PlainValue>> {
        (**self).user_decrypt(request, signature, keys)
    }
}
