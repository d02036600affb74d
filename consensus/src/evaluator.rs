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

use crate::error::ConsensusError;

use ember_objects::{
    ContractResult, Operation, OperationResult, PublicKey, TimePointSec,
};
use ember_storage::{Account, Store, VestingBalance};

/// How a transaction entered the applier; several checks and the runtime
/// budget depend on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionApplyMode {
    /// User-submitted through this node.
    Push,
    /// Received from a peer; a dry validation run.
    ValidateTransaction,
    /// Throwaway trial application.
    JustTry,
    /// Inside block application.
    ApplyBlock,
    /// Building a new block.
    ProductionBlock,
    /// Contract-internal re-entry after a call produced persistent values.
    Invoke,
}

/// State an evaluator may consult while applying one operation.
pub struct EvalContext<'a> {
    pub store: &'a mut Store,
    pub run_mode: TransactionApplyMode,
    pub is_agreed_task: bool,
    pub sig_keys: &'a [PublicKey],
    /// The head block time at transaction admission.
    pub block_time: TimePointSec,
}

/// Per-operation business logic, dispatched by operation tag. Evaluators
/// mutate the store inside the operation's nested undo session; a returned
/// error rolls that session back.
pub trait OperationEvaluator: Send + Sync {
    fn evaluate(
        &self,
        ctx: &mut EvalContext<'_>,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, ConsensusError>;
}

/// The evaluator table indexed by operation tag.
pub type EvaluatorRegistry = Vec<Option<Box<dyn OperationEvaluator>>>;

/// Builds the registry with the built-in evaluators at their tags.
pub fn default_evaluators() -> EvaluatorRegistry {
    let mut registry: EvaluatorRegistry = Vec::with_capacity(Operation::COUNT);
    registry.push(Some(Box::new(TransferEvaluator)));
    registry.push(Some(Box::new(CallContractFunctionEvaluator)));
    registry.push(Some(Box::new(VestingBalanceWithdrawEvaluator)));
    registry.push(Some(Box::new(ContractShareFeeEvaluator)));
    registry.push(Some(Box::new(WitnessBlockRewardEvaluator)));
    registry
}

fn unexpected_operation(op: &Operation) -> ConsensusError {
    ConsensusError::InternalInvariant(format!(
        "evaluator dispatched with mismatched operation tag {}",
        op.tag()
    ))
}

/// Moves core-asset or gas balances between accounts.
pub struct TransferEvaluator;

impl OperationEvaluator for TransferEvaluator {
    fn evaluate(
        &self,
        ctx: &mut EvalContext<'_>,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, ConsensusError> {
        let Operation::Transfer(op) = op else {
            return Err(unexpected_operation(op));
        };

        let from = ctx.store.get::<Account>(op.from)?;
        let available = from.balance(op.amount.asset_id);
        if available < op.amount.amount {
            return Err(ConsensusError::InsufficientBalance {
                account: op.from,
                required: op.amount.amount,
                available,
            });
        }
        ctx.store.get::<Account>(op.to)?;

        if apply {
            ctx.store.modify::<Account>(op.from, |account| {
                account.adjust_balance(op.amount.asset_id, -op.amount.amount);
            })?;
            ctx.store.modify::<Account>(op.to, |account| {
                account.adjust_balance(op.amount.asset_id, op.amount.amount);
            })?;
        }
        Ok(OperationResult::Void)
    }
}

/// Stub contract runtime: validates the caller and reports an empty contract
/// result. Nodes with a VM replace this evaluator at registration time.
pub struct CallContractFunctionEvaluator;

impl OperationEvaluator for CallContractFunctionEvaluator {
    fn evaluate(
        &self,
        ctx: &mut EvalContext<'_>,
        op: &Operation,
        _apply: bool,
    ) -> Result<OperationResult, ConsensusError> {
        let Operation::CallContractFunction(op) = op else {
            return Err(unexpected_operation(op));
        };

        ctx.store.get::<Account>(op.caller)?;
        Ok(OperationResult::Contract(ContractResult {
            existed_pv: false,
            real_running_time_us: 0,
        }))
    }
}

/// Releases vested balance to its owner, bounded by the policy.
pub struct VestingBalanceWithdrawEvaluator;

impl OperationEvaluator for VestingBalanceWithdrawEvaluator {
    fn evaluate(
        &self,
        ctx: &mut EvalContext<'_>,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, ConsensusError> {
        let Operation::VestingBalanceWithdraw(op) = op else {
            return Err(unexpected_operation(op));
        };

        let vesting = ctx.store.get::<VestingBalance>(op.vesting_balance)?;
        if vesting.owner != op.owner {
            return Err(ConsensusError::MissingActiveAuthority(op.owner));
        }
        let allowed = vesting.allowed_withdraw(ctx.block_time);
        if op.amount.asset_id != allowed.asset_id || op.amount.amount > allowed.amount {
            return Err(ConsensusError::ExceedsAllowedWithdraw);
        }

        if apply {
            ctx.store.modify::<VestingBalance>(op.vesting_balance, |vesting| {
                vesting.balance.amount -= op.amount.amount;
            })?;
            ctx.store.modify::<Account>(op.owner, |account| {
                account.adjust_balance(op.amount.asset_id, op.amount.amount);
            })?;
        }
        Ok(OperationResult::Void)
    }
}

/// Credits collected contract fees to the beneficiary.
pub struct ContractShareFeeEvaluator;

impl OperationEvaluator for ContractShareFeeEvaluator {
    fn evaluate(
        &self,
        ctx: &mut EvalContext<'_>,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, ConsensusError> {
        let Operation::ContractShareFee(op) = op else {
            return Err(unexpected_operation(op));
        };

        ctx.store.get::<Account>(op.beneficiary)?;
        if apply {
            ctx.store.modify::<Account>(op.beneficiary, |account| {
                account.adjust_balance(op.amount.asset_id, op.amount.amount);
            })?;
        }
        Ok(OperationResult::Void)
    }
}

/// Credits a witness account for a produced block; emitted as a virtual
/// operation by node-side reward policies.
pub struct WitnessBlockRewardEvaluator;

impl OperationEvaluator for WitnessBlockRewardEvaluator {
    fn evaluate(
        &self,
        ctx: &mut EvalContext<'_>,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, ConsensusError> {
        let Operation::WitnessBlockReward(op) = op else {
            return Err(unexpected_operation(op));
        };

        ctx.store.get::<Account>(op.witness_account)?;
        if apply {
            ctx.store.modify::<Account>(op.witness_account, |account| {
                account.adjust_balance(op.amount.asset_id, op.amount.amount);
            })?;
        }
        Ok(OperationResult::Void)
    }
}
