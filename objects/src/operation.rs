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

use crate::{
    asset::Asset,
    error::ObjectError,
    ids::{AccountId, ContractId, VestingBalanceId},
};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Asset,
    pub memo: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallContractFunctionOperation {
    pub caller: AccountId,
    pub contract: ContractId,
    pub function: String,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VestingBalanceWithdrawOperation {
    pub vesting_balance: VestingBalanceId,
    pub owner: AccountId,
    pub amount: Asset,
}

/// System-internal distribution of collected contract fees. Always the lead
/// operation of its transaction and exempt from signature and TaPoS checks.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractShareFeeOperation {
    pub sharer: AccountId,
    pub beneficiary: AccountId,
    pub amount: Asset,
}

/// Virtual operation crediting a witness for a produced block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WitnessBlockRewardOperation {
    pub witness_account: AccountId,
    pub amount: Asset,
}

/// The closed set of chain operations. Evaluator registration is a table
/// keyed by [`Operation::tag`]; the tag values are stable.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Transfer(TransferOperation),
    CallContractFunction(CallContractFunctionOperation),
    VestingBalanceWithdraw(VestingBalanceWithdrawOperation),
    ContractShareFee(ContractShareFeeOperation),
    WitnessBlockReward(WitnessBlockRewardOperation),
}

impl Operation {
    /// The number of registered operation kinds.
    pub const COUNT: usize = 5;

    pub const fn tag(&self) -> usize {
        match self {
            Operation::Transfer(_) => 0,
            Operation::CallContractFunction(_) => 1,
            Operation::VestingBalanceWithdraw(_) => 2,
            Operation::ContractShareFee(_) => 3,
            Operation::WitnessBlockReward(_) => 4,
        }
    }

    pub const fn is_contract_share_fee(&self) -> bool {
        matches!(self, Operation::ContractShareFee(_))
    }

    /// Collects the accounts whose active authority must sign for this
    /// operation. System-internal operations require none.
    pub fn required_active_authorities(&self, out: &mut Vec<AccountId>) {
        match self {
            Operation::Transfer(op) => out.push(op.from),
            Operation::CallContractFunction(op) => out.push(op.caller),
            Operation::VestingBalanceWithdraw(op) => out.push(op.owner),
            Operation::ContractShareFee(_) => (),
            Operation::WitnessBlockReward(_) => (),
        }
    }

    /// Structural validation, independent of chain state.
    pub fn validate(&self) -> Result<(), ObjectError> {
        match self {
            Operation::Transfer(op) => {
                if op.amount.amount <= 0 {
                    return Err(ObjectError::MalformedOperation(
                        "transfer amount must be positive".into(),
                    ));
                }
                if op.from == op.to {
                    return Err(ObjectError::MalformedOperation(
                        "transfer to self".into(),
                    ));
                }
            }
            Operation::CallContractFunction(op) => {
                if op.function.is_empty() {
                    return Err(ObjectError::MalformedOperation(
                        "contract function name is empty".into(),
                    ));
                }
            }
            Operation::VestingBalanceWithdraw(op) => {
                if op.amount.amount <= 0 {
                    return Err(ObjectError::MalformedOperation(
                        "withdraw amount must be positive".into(),
                    ));
                }
            }
            Operation::ContractShareFee(op) => {
                if op.amount.amount < 0 {
                    return Err(ObjectError::MalformedOperation(
                        "fee share amount must not be negative".into(),
                    ));
                }
            }
            Operation::WitnessBlockReward(op) => {
                if op.amount.amount < 0 {
                    return Err(ObjectError::MalformedOperation(
                        "block reward must not be negative".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Result of running a contract operation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractResult {
    /// Whether the call produced persistent values that re-enter the applier
    /// in invoke mode.
    pub existed_pv: bool,
    pub real_running_time_us: u64,
}

/// A captured evaluator failure for agreed-task transactions.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub code: u32,
    pub message: String,
    pub real_running_time_us: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OperationResult {
    Void,
    Contract(ContractResult),
    Error(ErrorResult),
}

impl Default for OperationResult {
    fn default() -> Self {
        OperationResult::Void
    }
}

impl OperationResult {
    /// The evaluator runtime this result accounts for, in microseconds.
    pub fn runtime_us(&self) -> u64 {
        match self {
            OperationResult::Void => 0,
            OperationResult::Contract(result) => result.real_running_time_us,
            OperationResult::Error(result) => result.real_running_time_us,
        }
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, OperationResult::Error(_))
    }

    pub const fn is_contract(&self) -> bool {
        matches!(self, OperationResult::Contract(_))
    }
}
