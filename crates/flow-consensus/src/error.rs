//! Validation status taxonomies.
//!
//! Two disjoint failure families: storage trouble ([`StorageError`],
//! transient, retryable) and consensus rejection (the `Invalid*` enums,
//! final for the offending item). [`ValidationError`] carries either so
//! validation code can use `?` on storage lookups while still returning a
//! precise rejection status.

use flow_storage::StorageError;
use flow_vm::VmError;
use thiserror::Error;

/// Header rejection statuses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidHeaderStatus {
    /// Timestamp outside the allowed skew window.
    #[error("Invalid timestamp")]
    InvalidTimeStamp,

    /// `hash > target`.
    #[error("Invalid work amount")]
    InvalidWorkAmount,

    /// Declared target disagrees with the retarget recomputation.
    #[error("Invalid work target")]
    InvalidWorkTarget,

    /// Parent hash not present in its chain.
    #[error("Missing parent")]
    MissingParent,

    /// One or more deps not present in the flow.
    #[error("Missing deps")]
    MissingDeps,

    /// Chain index not serviced by this broker.
    #[error("Invalid group")]
    InvalidGroup,
}

/// Block rejection statuses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidBlockStatus {
    /// The header was rejected.
    #[error("Invalid header: {0}")]
    Header(#[from] InvalidHeaderStatus),

    /// A block must carry at least its coinbase.
    #[error("Empty transaction list")]
    EmptyTransactionList,

    /// `transactions[0]` does not have coinbase shape.
    #[error("Invalid coinbase")]
    InvalidCoinbase,

    /// `txsHash` does not match the transactions.
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,

    /// Two inputs in the block reference the same output.
    #[error("Double spent")]
    DoubleSpent,

    /// A referenced output does not exist in the world state.
    #[error("Invalid coins")]
    InvalidCoins,

    /// A non-coinbase transaction was rejected.
    #[error("Invalid tx: {0}")]
    InvalidTx(#[from] InvalidTxStatus),
}

/// Transaction rejection statuses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidTxStatus {
    /// Network id does not match this node's network.
    #[error("Invalid network id")]
    InvalidNetworkId,

    /// A transaction must consume at least one input.
    #[error("No inputs")]
    NoInputs,

    /// Input count above the cap.
    #[error("Too many inputs")]
    TooManyInputs,

    /// Contract inputs on an inter-group transaction.
    #[error("Contract input for inter-group tx")]
    ContractInputForInterGroupTx,

    /// A transaction must produce at least one output.
    #[error("No outputs")]
    NoOutputs,

    /// Output count above the cap.
    #[error("Too many outputs")]
    TooManyOutputs,

    /// Generated outputs on an inter-group transaction.
    #[error("Generated output for inter-group tx")]
    GeneratedOutputForInterGroupTx,

    /// Gas budget outside `[minimalGas, maxGasPerTx]`.
    #[error("Invalid start gas")]
    InvalidStartGas,

    /// Gas price zero or above the ALF cap.
    #[error("Invalid gas price")]
    InvalidGasPrice,

    /// A balance sum exceeded 256 bits.
    #[error("Balance overflow")]
    BalanceOverFlow,

    /// Zero amounts, too many tokens, or an overflowing output sum.
    #[error("Invalid output stats")]
    InvalidOutputStats,

    /// An input's hint does not resolve to the chain's source group.
    #[error("Invalid input group index")]
    InvalidInputGroupIndex,

    /// An output's lockup resolves outside the permitted groups.
    #[error("Invalid output group index")]
    InvalidOutputGroupIndex,

    /// Two inputs of the transaction share an output reference.
    #[error("Tx double spending")]
    TxDoubleSpending,

    /// Output data above the size cap.
    #[error("Output data size exceeded")]
    OutputDataSizeExceeded,

    /// A referenced output does not exist.
    #[error("Non-existent input")]
    NonExistInput,

    /// A consumed output is still time-locked at the header timestamp.
    #[error("Time-locked tx")]
    TimeLockedTx,

    /// ALF inputs do not equal outputs plus the gas fee.
    #[error("Invalid alf balance")]
    InvalidAlfBalance,

    /// A token's inputs do not equal its outputs.
    #[error("Invalid token balance")]
    InvalidTokenBalance,

    /// Fewer signatures than distinct unlock conditions require.
    #[error("Not enough signatures")]
    NotEnoughSignature,

    /// More signatures than distinct unlock conditions require.
    #[error("Too many signatures")]
    TooManySignatures,

    /// A revealed key does not hash to the lockup's key hash.
    #[error("Invalid public key hash")]
    InvalidPublicKeyHash,

    /// A signature failed verification.
    #[error("Invalid signature")]
    InvalidSignature,

    /// A P2MPKH unlock reveals the wrong number of keys.
    #[error("Invalid number of public keys")]
    InvalidNumberOfPublicKey,

    /// P2MPKH key indices not strictly increasing or out of range.
    #[error("Invalid p2mpkh unlock script")]
    InvalidP2mpkhUnlockScript,

    /// A revealed script does not hash to the lockup's script hash.
    #[error("Invalid script hash")]
    InvalidScriptHash,

    /// The unlock script kind does not match the lockup kind.
    #[error("Invalid unlock script type")]
    InvalidUnlockScriptType,

    /// A P2SH unlock script halted with an error.
    #[error("Unlock script execution failed: {0}")]
    UnlockScriptExeFailed(VmError),

    /// The tx script halted with an error or its recorded effects do not
    /// match re-execution.
    #[error("Tx script execution failed: {0}")]
    TxScriptExeFailed(VmError),
}

/// Three-way validation outcome carrier.
///
/// `Invalid` is the final status of the item; `Io` bubbles unchanged so
/// the caller may retry. `From<StorageError>` lets `?` do the bubbling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError<S>
where
    S: std::error::Error,
{
    /// Consensus rejection.
    #[error("{0}")]
    Invalid(S),

    /// Storage failure during a lookup.
    #[error("I/O error: {0}")]
    Io(#[from] StorageError),
}

impl<S: std::error::Error> ValidationError<S> {
    /// The rejection status, if this is one.
    pub fn invalid_status(&self) -> Option<&S> {
        match self {
            ValidationError::Invalid(status) => Some(status),
            ValidationError::Io(_) => None,
        }
    }
}

/// Shorthand for failing a pipeline with a rejection status.
pub(crate) fn invalid<T, S: std::error::Error>(status: S) -> Result<T, ValidationError<S>> {
    Err(ValidationError::Invalid(status))
}
