// Copyright (C) 2021-2024 The Ember Developers.
// This file is part of the ember library.

// The ember library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The ember library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the ember library. If not, see <https://www.gnu.org/licenses/>.

use ember_objects::{
    AccountId, BlockId, ObjectError, ObjectId, TimePointSec, TransactionId, TxHash,
};
use ember_storage::StorageError;

use thiserror::Error;

/// Failures surfaced at the granularity of the enclosing atomic unit:
/// operation, transaction or block. Every failure path rolls back through
/// the owning undo session before this error propagates.
#[derive(Debug, Error)]
pub enum ConsensusError {
    // -- structural (block level) --
    #[error("block {0} does not link to any known block")]
    UnlinkableBlock(BlockId),

    #[error("block builds on {got} but the chain head is {expected}")]
    PreviousMismatch { expected: BlockId, got: BlockId },

    #[error("block timestamp {block} does not advance past head time {head}")]
    TimestampRegression { head: TimePointSec, block: TimePointSec },

    #[error("block transactions do not hash to the declared merkle root")]
    MerkleMismatch,

    #[error("block signature was not produced by the block witness")]
    BadWitnessSignature,

    #[error("witness produced a block outside its scheduled slot {slot}")]
    WitnessScheduleMismatch { slot: u32 },

    #[error("block {block_num} does not match checkpoint {expected}")]
    CheckpointMismatch { block_num: u32, expected: BlockId },

    #[error("no blocks to pop")]
    PopEmptyChain,

    #[error("no common ancestor within the fork window")]
    NoCommonAncestor,

    // -- transaction level --
    #[error("transaction size {size} exceeds the per-transaction limit {limit}")]
    OversizedTransaction { size: usize, limit: usize },

    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TransactionId),

    #[error("transaction references an unknown or superseded block (TaPoS)")]
    TaposMismatch,

    #[error("transaction expired at {expiration}, chain time is {now}")]
    TransactionExpired { expiration: TimePointSec, now: TimePointSec },

    #[error("transaction expiration {expiration} is too far past chain time {now}")]
    ExpirationTooFarInFuture { expiration: TimePointSec, now: TimePointSec },

    #[error("signatures do not satisfy the active authority of account {0}")]
    MissingActiveAuthority(AccountId),

    #[error("agreed task {0} is not executable")]
    AgreedTaskNotExecutable(ObjectId),

    #[error("transaction hash does not match agreed task {0}")]
    AgreedTaskHashMismatch(ObjectId),

    #[error("object {0} is not a proposal or crontab")]
    UnexpectedAgreedTaskKind(ObjectId),

    #[error("transaction {0} in block carries no operation results")]
    EmptyOperationResults(TxHash),

    #[error("operation {op_in_trx} of transaction {trx_in_block} produced a result differing from the block record")]
    OperationResultMismatch { trx_in_block: u32, op_in_trx: u32 },

    #[error("execution time {runtime_us}us exceeds the block-interval budget {budget_us}us")]
    RuntimeBudgetExceeded { runtime_us: u64, budget_us: u64 },

    #[error("pending queue high-water mark {size} exceeds the cache limit {limit}")]
    PendingQueueFull { size: u64, limit: u64 },

    // -- block production --
    #[error("production time falls in slot 0")]
    InvalidProductionSlot,

    #[error("witness is not scheduled for the production slot")]
    NotScheduledWitness,

    #[error("signing key does not match the witness signing key")]
    WrongSigningKey,

    // -- operation level --
    #[error("account {account} balance {available} is below required {required}")]
    InsufficientBalance { account: AccountId, required: i64, available: i64 },

    #[error("withdraw exceeds the vested amount allowed at this time")]
    ExceedsAllowedWithdraw,

    #[error("evaluator failure: {0}")]
    EvaluatorFailure(String),

    // -- internal --
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Object(#[from] ObjectError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ConsensusError {
    /// Stable numeric code recorded into captured error results.
    pub fn code(&self) -> u32 {
        match self {
            ConsensusError::UnlinkableBlock(_) => 3001,
            ConsensusError::PreviousMismatch { .. } => 3002,
            ConsensusError::TimestampRegression { .. } => 3003,
            ConsensusError::MerkleMismatch => 3004,
            ConsensusError::BadWitnessSignature => 3005,
            ConsensusError::WitnessScheduleMismatch { .. } => 3006,
            ConsensusError::CheckpointMismatch { .. } => 3007,
            ConsensusError::PopEmptyChain => 3008,
            ConsensusError::NoCommonAncestor => 3009,
            ConsensusError::OversizedTransaction { .. } => 3101,
            ConsensusError::DuplicateTransaction(_) => 3102,
            ConsensusError::TaposMismatch => 3103,
            ConsensusError::TransactionExpired { .. } => 3104,
            ConsensusError::ExpirationTooFarInFuture { .. } => 3105,
            ConsensusError::MissingActiveAuthority(_) => 3106,
            ConsensusError::AgreedTaskNotExecutable(_) => 3107,
            ConsensusError::AgreedTaskHashMismatch(_) => 3108,
            ConsensusError::UnexpectedAgreedTaskKind(_) => 3109,
            ConsensusError::EmptyOperationResults(_) => 3110,
            ConsensusError::OperationResultMismatch { .. } => 3111,
            ConsensusError::RuntimeBudgetExceeded { .. } => 3112,
            ConsensusError::PendingQueueFull { .. } => 3113,
            ConsensusError::InvalidProductionSlot => 3201,
            ConsensusError::NotScheduledWitness => 3202,
            ConsensusError::WrongSigningKey => 3203,
            ConsensusError::InsufficientBalance { .. } => 3301,
            ConsensusError::ExceedsAllowedWithdraw => 3302,
            ConsensusError::EvaluatorFailure(_) => 3303,
            ConsensusError::InternalInvariant(_) => 3901,
            ConsensusError::Storage(_) => 3902,
            ConsensusError::Object(_) => 3903,
            ConsensusError::Other(_) => 3999,
        }
    }
}
