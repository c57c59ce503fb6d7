//! Opaque ciphertext handles and account addresses.
//!
//! A handle is a fixed 32-byte reference to a ciphertext held by the
//! encryption co-processor. The handle carries no arithmetic of its own;
//! all arithmetic on the underlying values is delegated to the
//! co-processor capabilities.

use codec::{Decode, Encode, MaxEncodedLen};
use core::fmt;
use scale_info::TypeInfo;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A serialized ciphertext handle size.
pub const CIPHERTEXT_HANDLE_SIZE: usize = 32;

/// A serialized account address size.
pub const ACCOUNT_ADDRESS_SIZE: usize = 20;

/// Opaque reference to a ciphertext held by the co-processor.
///
/// The all-zero handle is the sentinel for "no ciphertext yet" and is
/// semantically equal to plaintext zero. Decrypting it is a local no-op,
/// never a service call.
#[derive(
    Copy, Clone, Default, Encode, Decode, MaxEncodedLen, TypeInfo, PartialOrd, Ord, PartialEq, Eq,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CiphertextHandle([u8; CIPHERTEXT_HANDLE_SIZE]);

impl CiphertextHandle {
    /// The sentinel handle.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: [u8; CIPHERTEXT_HANDLE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CIPHERTEXT_HANDLE_SIZE] {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; CIPHERTEXT_HANDLE_SIZE] {
        self.0
    }

    /// Whether this is the sentinel handle.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; CIPHERTEXT_HANDLE_SIZE]
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({self})")
    }
}

/// A fixed-size account address.
#[derive(
    Copy, Clone, Default, Encode, Decode, MaxEncodedLen, TypeInfo, PartialOrd, Ord, PartialEq, Eq,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccountAddress([u8; ACCOUNT_ADDRESS_SIZE]);

impl AccountAddress {
    /// The all-zero address. Valid as a map key, invalid as a configured
    /// ledger contract address.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: [u8; ACCOUNT_ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; ACCOUNT_ADDRESS_SIZE] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ACCOUNT_ADDRESS_SIZE]
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountAddress({self})")
    }
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------
