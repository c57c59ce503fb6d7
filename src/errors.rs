use thiserror::Error;

use crate::authorize::AttemptState;
use crate::handle::CiphertextHandle;

/// Broad failure classes used for reporting and retry decisions.
///
/// Connectivity failures may be retried as-is. Authorization failures mean
/// the request must be rebuilt from scratch with a fresh keypair and a
/// fresh validity window, not merely resent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Config,
    Connectivity,
    Authorization,
    Decoding,
}

/// Confidential swap error.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The configured ledger contract address is absent or the zero address.
    #[error("The ledger contract address is missing or invalid")]
    InvalidContractAddress,

    /// An exchange rate was constructed with a zero scale.
    #[error("The exchange rate scale cannot be zero")]
    InvalidExchangeRate,

    /// The quoted token amount does not fit the 64-bit balance range.
    #[error("Native amount {amount} quotes outside of the valid balance range")]
    AmountOutOfRange { amount: u128 },

    /// The encryption co-processor refused or failed a request.
    #[error("The encryption co-processor is unavailable")]
    CoprocessorUnavailable,

    /// The account signer declined to sign the authorization message.
    #[error("The signer declined the structured authorization message")]
    SigningRefused,

    /// The decryption service could not be reached.
    #[error("The decryption service is unavailable")]
    ServiceUnavailable,

    /// The decryption service did not answer within the bounded wait.
    #[error("The decryption service did not respond in time")]
    ResponseTimeout,

    /// The service rejected the authorization signature.
    #[error("The authorization signature was rejected")]
    SignatureRejected,

    /// The authorization validity window has expired.
    #[error("The authorization expired at {expires_at}")]
    AuthorizationExpired { expires_at: u64 },

    /// The authorization validity window has not started yet.
    #[error("The authorization is not valid before {valid_from}")]
    AuthorizationNotYetValid { valid_from: u64 },

    /// The claimed account holds no decryption rights on the handle.
    #[error("The account is not authorized to decrypt handle {handle}")]
    HandleNotAuthorized { handle: CiphertextHandle },

    /// The service returned a value that is not coercible to a balance.
    #[error("Failed to decode plaintext value {value:?}")]
    PlaintextDecode { value: String },

    /// The service response is missing a requested handle.
    #[error("The service response is missing handle {handle}")]
    MissingPlaintext { handle: CiphertextHandle },

    /// A decrypt attempt was driven out of state order.
    #[error("Decrypt attempt is in state {actual:?}, expected {expected:?}")]
    AttemptOutOfOrder {
        expected: AttemptState,
        actual: AttemptState,
    },
}

impl Error {
    /// The failure class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::InvalidContractAddress
            | Error::InvalidExchangeRate
            | Error::AmountOutOfRange { .. } => ErrorClass::Config,
            Error::CoprocessorUnavailable
            | Error::ServiceUnavailable
            | Error::ResponseTimeout => ErrorClass::Connectivity,
            Error::SigningRefused
            | Error::SignatureRejected
            | Error::AuthorizationExpired { .. }
            | Error::AuthorizationNotYetValid { .. }
            | Error::HandleNotAuthorized { .. }
            | Error::AttemptOutOfOrder { .. } => ErrorClass::Authorization,
            Error::PlaintextDecode { .. } | Error::MissingPlaintext { .. } => ErrorClass::Decoding,
        }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
