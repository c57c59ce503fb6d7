//! The confidential balance ledger.
//!
//! Holds one encrypted balance handle per account. Deposits are quoted at
//! the ledger's fixed rate, encrypted by the co-processor and accumulated
//! under ciphertext addition; no plaintext balance ever exists here.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};

use log::debug;

use crate::errors::{Error, Result};
use crate::handle::{AccountAddress, CiphertextHandle};
use crate::rate::{ExchangeRate, NativeAmount};
use crate::{AccessController, Encryptor, HomomorphicAdder};

/// External configuration of one ledger deployment.
///
/// Constructed explicitly and passed into component constructors, never
/// held as ambient global state, so ledgers on different chains can
/// coexist in one process.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    contract: AccountAddress,
    chain_id: u64,
}

impl LedgerConfig {
    /// Validates the configuration before any capability call is made.
    pub fn new(contract: AccountAddress, chain_id: u64) -> Result<Self> {
        ensure!(!contract.is_zero(), Error::InvalidContractAddress);
        Ok(Self { contract, chain_id })
    }

    pub fn contract(&self) -> AccountAddress {
        self.contract
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Mapping from account to its encrypted balance handle.
///
/// Accounts never deposited to are implicitly mapped to the sentinel
/// handle; entries are created on first deposit, replaced on every
/// subsequent deposit and never deleted.
pub struct ConfidentialLedger<C> {
    config: LedgerConfig,
    rate: ExchangeRate,
    coprocessor: C,
    balances: RwLock<BTreeMap<AccountAddress, CiphertextHandle>>,
    // Serializes depositors; readers contend only on `balances`.
    write_order: Mutex<()>,
}

impl<C> ConfidentialLedger<C>
where
    C: Encryptor + HomomorphicAdder + AccessController,
{
    pub fn new(config: LedgerConfig, rate: ExchangeRate, coprocessor: C) -> Self {
        Self {
            config,
            rate,
            coprocessor,
            balances: RwLock::new(BTreeMap::new()),
            write_order: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn rate(&self) -> &ExchangeRate {
        &self.rate
    }

    /// Swaps `native` smallest units into the account's encrypted balance
    /// and returns the new balance handle.
    ///
    /// The quoted increment is encrypted, added to the current handle and
    /// granted to the depositor before the mapping is touched; a failing
    /// capability leaves the stored handle unchanged.
    pub fn deposit(
        &self,
        account: &AccountAddress,
        native: NativeAmount,
    ) -> Result<CiphertextHandle> {
        let amount = self.rate.quote(native)?;

        let _guard = self
            .write_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.encrypted_balance_of(account);
        let increment = self.coprocessor.encrypt(amount)?;
        let updated = self.coprocessor.add(&current, &increment)?;
        self.coprocessor.allow(&updated, account)?;

        let mut balances = self
            .balances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        balances.insert(*account, updated);
        debug!("credited {amount} token units to {account}, new handle {updated}");
        Ok(updated)
    }

    /// The latest committed balance handle of `account`.
    ///
    /// Pure lookup, safe to call concurrently with deposits; the sentinel
    /// handle is returned for untouched accounts.
    pub fn encrypted_balance_of(&self, account: &AccountAddress) -> CiphertextHandle {
        let balances = self
            .balances
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        balances.get(account).copied().unwrap_or_default()
    }
}
