//! User decryption authorization.
//!
//! A client proves to the decryption service that the account holder
//! authorized disclosure of specific ciphertext handles. It generates an
//! ephemeral decryption keypair, binds the keypair, the handles, their
//! verifying contracts and a validity window into a domain-separated
//! structured message, and has the *account* key sign that message.
//!
//! The ephemeral key is the decryption credential; the account key is the
//! authorization credential. The two are distinct roles: conflating them
//! would let anyone who learns the ephemeral public key forge an
//! authorization.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use codec::{Decode, Encode};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use log::{debug, warn};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use scale_info::TypeInfo;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::handle::{AccountAddress, CiphertextHandle};
use crate::ledger::LedgerConfig;
use crate::{Balance, DecryptionService, StructuredSigner};

/// The domain label for user decryption authorization messages.
pub const USER_DECRYPT_REQUEST_LABEL: &[u8] = b"ConfidentialSwapUserDecryptRequest";

/// Validity window length granted to a fresh authorization.
pub const DEFAULT_VALIDITY_DAYS: u64 = 10;

const SECONDS_PER_DAY: u64 = 86_400;

/// A ciphertext handle paired with the contract it lives under.
#[derive(Copy, Clone, Debug, Encode, Decode, TypeInfo, PartialOrd, Ord, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HandleContractPair {
    pub handle: CiphertextHandle,
    pub contract: AccountAddress,
}

/// Ephemeral decryption keypair, generated fresh per decrypt attempt.
///
/// Never persisted, never pooled; the secret half is wiped on drop.
#[derive(Clone, Debug, Zeroize, ZeroizeOnDrop)]
pub struct EphemeralKeys {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: Scalar,
}

impl EphemeralKeys {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = Scalar::random(rng);
        let public = RistrettoPoint::mul_base(&secret).compress().to_bytes();
        Self { public, secret }
    }

    pub fn public(&self) -> &[u8; 32] {
        &self.public
    }

    /// The secret half is handed to the decryption service per protocol;
    /// the caller keeps no copy beyond the attempt.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

/// Structured, domain-separated authorization message.
///
/// The signing digest binds the ephemeral public key, every handle with
/// its verifying contract, the requesting account, the chain and the
/// validity window. A signature over it is useless for any other handle
/// set, ephemeral key or window.
#[derive(Clone, Debug, Encode, Decode, TypeInfo, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UserDecryptRequest {
    pub pairs: Vec<HandleContractPair>,
    pub public_key: [u8; 32],
    pub account: AccountAddress,
    pub chain_id: u64,
    pub valid_from: u64,
    pub duration_days: u64,
}

impl UserDecryptRequest {
    /// Wall-clock expiry of this authorization, in unix seconds.
    pub fn expires_at(&self) -> u64 {
        self.valid_from
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Checks the validity window against `now`, the way the service does
    /// on presentation.
    pub fn check_window(&self, now: u64) -> Result<()> {
        ensure!(
            now >= self.valid_from,
            Error::AuthorizationNotYetValid {
                valid_from: self.valid_from
            }
        );
        ensure!(
            now <= self.expires_at(),
            Error::AuthorizationExpired {
                expires_at: self.expires_at()
            }
        );
        Ok(())
    }

    /// The domain-separated digest the account key signs.
    ///
    /// The SCALE encoding of the whole request is the canonical byte
    /// representation fed into the transcript.
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut transcript = Transcript::new(USER_DECRYPT_REQUEST_LABEL);
        transcript.append_message(b"request", &self.encode());
        let mut digest = [0u8; 32];
        transcript.challenge_bytes(b"digest", &mut digest);
        digest
    }
}

/// Numeric plaintext as returned by the decryption service.
///
/// The service may answer with a native integer or a decimal string; both
/// normalize through 128-bit integer arithmetic, never through floating
/// point, since balances can exceed safe float precision.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum PlainValue {
    U64(u64),
    Text(String),
}

impl From<Balance> for PlainValue {
    fn from(value: Balance) -> Self {
        Self::U64(value)
    }
}

impl PlainValue {
    pub fn to_balance(&self) -> Result<Balance> {
        match self {
            PlainValue::U64(value) => Ok(*value),
            PlainValue::Text(text) => {
                let wide: u128 = text.trim().parse().map_err(|_| Error::PlaintextDecode {
                    value: text.clone(),
                })?;
                Balance::try_from(wide).map_err(|_| Error::PlaintextDecode {
                    value: text.clone(),
                })
            }
        }
    }
}

/// Progress of a single decrypt attempt.
///
/// `Resolved`, `Rejected` and `TimedOut` are terminal; retrying means a
/// fresh attempt with a fresh keypair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    KeypairGenerated,
    MessageSigned,
    Submitted,
    Resolved,
    Rejected,
    TimedOut,
}

/// One decryption attempt.
///
/// Keypair, message and signature are scoped to this attempt and
/// discarded with it, success or failure; none of them is ever reused
/// past its single verification.
pub struct DecryptAttempt {
    id: Uuid,
    config: LedgerConfig,
    pairs: Vec<HandleContractPair>,
    account: AccountAddress,
    state: AttemptState,
    keys: Option<EphemeralKeys>,
    request: Option<UserDecryptRequest>,
    signature: Option<Vec<u8>>,
}

impl DecryptAttempt {
    pub fn new<R: RngCore + CryptoRng>(
        config: LedgerConfig,
        account: AccountAddress,
        pairs: Vec<HandleContractPair>,
        rng: &mut R,
    ) -> Self {
        let mut id = [0u8; 16];
        rng.fill_bytes(&mut id);
        Self {
            id: uuid::Builder::from_random_bytes(id).into_uuid(),
            config,
            pairs,
            account,
            state: AttemptState::Idle,
            keys: None,
            request: None,
            signature: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    fn expect_state(&self, expected: AttemptState) -> Result<()> {
        ensure!(
            self.state == expected,
            Error::AttemptOutOfOrder {
                expected,
                actual: self.state
            }
        );
        Ok(())
    }

    /// Generates the attempt's ephemeral decryption keypair.
    pub fn generate_keypair<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<()> {
        self.expect_state(AttemptState::Idle)?;
        self.keys = Some(EphemeralKeys::generate(rng));
        self.state = AttemptState::KeypairGenerated;
        debug!("attempt {}: ephemeral keypair generated", self.id);
        Ok(())
    }

    /// Builds the structured message for the given validity window and
    /// signs it with the account's signing authority.
    pub fn sign_message<S: StructuredSigner>(
        &mut self,
        signer: &S,
        valid_from: u64,
        duration_days: u64,
    ) -> Result<()> {
        self.expect_state(AttemptState::KeypairGenerated)?;
        let public_key = match &self.keys {
            Some(keys) => *keys.public(),
            None => {
                return Err(Error::AttemptOutOfOrder {
                    expected: AttemptState::KeypairGenerated,
                    actual: self.state,
                })
            }
        };

        let request = UserDecryptRequest {
            pairs: self.pairs.clone(),
            public_key,
            account: self.account,
            chain_id: self.config.chain_id(),
            valid_from,
            duration_days,
        };
        let digest = request.signing_digest();
        let signature = signer.sign_structured(&digest)?;

        self.request = Some(request);
        self.signature = Some(signature);
        self.state = AttemptState::MessageSigned;
        debug!(
            "attempt {}: message signed, window of {duration_days}d from {valid_from}",
            self.id
        );
        Ok(())
    }

    /// Submits the signed package and resolves the plaintext values.
    ///
    /// Terminal either way. The keypair and signature are consumed here;
    /// a later response for an abandoned attempt is simply discarded by
    /// the caller.
    pub fn submit<D: DecryptionService>(
        &mut self,
        service: &D,
    ) -> Result<BTreeMap<CiphertextHandle, Balance>> {
        self.expect_state(AttemptState::MessageSigned)?;
        let missing = |actual| Error::AttemptOutOfOrder {
            expected: AttemptState::MessageSigned,
            actual,
        };
        let keys = self.keys.take().ok_or_else(|| missing(self.state))?;
        let request = self.request.take().ok_or_else(|| missing(self.state))?;
        let signature = self.signature.take().ok_or_else(|| missing(self.state))?;

        self.state = AttemptState::Submitted;
        debug!("attempt {}: submitted {} handle(s)", self.id, request.pairs.len());

        match service.user_decrypt(&request, &signature, &keys) {
            Ok(values) => match Self::collect_plaintext(&request, values) {
                Ok(plain) => {
                    self.state = AttemptState::Resolved;
                    debug!("attempt {}: resolved", self.id);
                    Ok(plain)
                }
                Err(err) => {
                    self.state = AttemptState::Rejected;
                    warn!("attempt {}: response rejected: {err}", self.id);
                    Err(err)
                }
            },
            Err(err) => {
                self.state = if matches!(err, Error::ResponseTimeout) {
                    AttemptState::TimedOut
                } else {
                    AttemptState::Rejected
                };
                warn!("attempt {}: {err}", self.id);
                Err(err)
            }
        }
    }

    fn collect_plaintext(
        request: &UserDecryptRequest,
        values: BTreeMap<CiphertextHandle, PlainValue>,
    ) -> Result<BTreeMap<CiphertextHandle, Balance>> {
        let mut plain = BTreeMap::new();
        for pair in &request.pairs {
            let value = values
                .get(&pair.handle)
                .ok_or(Error::MissingPlaintext { handle: pair.handle })?;
            plain.insert(pair.handle, value.to_balance()?);
        }
        Ok(plain)
    }
}

/// Client-side protocol object driving decrypt attempts against a
/// decryption service.
pub struct DecryptionAuthorizer<D> {
    config: LedgerConfig,
    service: D,
}

impl<D: DecryptionService> DecryptionAuthorizer<D> {
    pub fn new(config: LedgerConfig, service: D) -> Self {
        Self { config, service }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Resolves the plaintext value of every handle in `pairs` through one
    /// fresh attempt.
    ///
    /// Sentinel handles are defined as plaintext zero locally and are
    /// never sent to the service; an all-sentinel request performs no
    /// service round trip at all.
    pub fn request_decryption<S, R>(
        &self,
        pairs: &[HandleContractPair],
        signer: &S,
        rng: &mut R,
    ) -> Result<BTreeMap<CiphertextHandle, Balance>>
    where
        S: StructuredSigner,
        R: RngCore + CryptoRng,
    {
        let mut plain = BTreeMap::new();
        let mut remote = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if pair.handle.is_zero() {
                plain.insert(pair.handle, 0);
            } else {
                remote.push(*pair);
            }
        }
        if remote.is_empty() {
            return Ok(plain);
        }

        let mut attempt = DecryptAttempt::new(self.config, signer.address(), remote, rng);
        attempt.generate_keypair(rng)?;
        attempt.sign_message(signer, unix_now(), DEFAULT_VALIDITY_DAYS)?;
        plain.extend(attempt.submit(&self.service)?);
        Ok(plain)
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------
