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

use super::Chain;
use crate::{
    error::ConsensusError,
    evaluator::{EvalContext, TransactionApplyMode},
    parameters::{
        AUTO_GAS_HARDFORK_TIME, AUTO_GAS_MIN_WITHDRAW, FULL_PROPORTION, MAX_AGREED_TASK_SLACK,
        RUNTIME_BUDGET_PERCENT,
    },
    skip::SkipFlags,
};

use ember_objects::{
    AccountId, AgreedTask, BlockSummaryId, CrontabId, ErrorResult, ObjectType, Operation,
    OperationResult, ProcessedTransaction, ProposalId, PublicKey, SignedTransaction, TimePointSec,
    TxHash, VestingBalanceWithdrawOperation, GAS_ASSET,
};
use ember_storage::{
    Account, BlockSummary, ChainParameters, Crontab, Proposal, TransactionInBlock,
    TransactionObject, VestingBalance,
};

use indexmap::IndexSet;
use tracing::{debug, error, info, warn};

/// How a transaction reached the pending queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionPushState {
    /// Submitted through this node's own API.
    FromMe,
    /// Relayed by a peer; validated before queueing.
    FromPeer,
    /// Replayed from the popped/pending queues after a block or fork switch;
    /// already processed, only TaPoS and expiration are re-checked.
    RePush,
}

/// Per-transaction evaluation state threaded through the operation loop.
pub(crate) struct TxEvalState {
    pub run_mode: TransactionApplyMode,
    pub is_agreed_task: bool,
    pub sig_keys: Vec<PublicKey>,
    pub operation_results: Vec<OperationResult>,
    pub block_time: TimePointSec,
}

#[derive(Clone, Copy)]
enum AuthorityClass {
    Active,
    Owner,
}

impl Chain {
    /// Queues a transaction for inclusion in the next produced block.
    ///
    /// For locally generated transactions include `skip_block_size_check` in
    /// `skip` so the transaction stays queued even when peers' queues are
    /// full; it will propagate once a block flushes them.
    pub fn push_transaction(
        &mut self,
        trx: &SignedTransaction,
        skip: SkipFlags,
        push_state: TransactionPushState,
    ) -> Result<ProcessedTransaction, ConsensusError> {
        self.with_skip_flags(skip, |chain| {
            chain._push_transaction(ProcessedTransaction::new(trx.clone()), push_state)
        })
    }

    pub(crate) fn _push_transaction(
        &mut self,
        trx: ProcessedTransaction,
        push_state: TransactionPushState,
    ) -> Result<ProcessedTransaction, ConsensusError> {
        // The first push after a block starts the base pending session, so a
        // freshly arrived block can rewind to clean head state in one undo.
        if self.pending_session.is_none() {
            let session = self.store.start_undo_session();
            self.pending_session = Some(session);
        }

        // A child session holds this transaction's changes until they either
        // merge into the pending session or get discarded.
        let temp_session = self.store.start_undo_session();
        let mut mode = TransactionApplyMode::Push;
        let processed = match self.stage_push_transaction(trx, push_state, &mut mode) {
            Ok(processed) => processed,
            Err(e) => {
                if let Err(undo_err) = self.store.undo_session(temp_session) {
                    return Err(ConsensusError::InternalInvariant(format!(
                        "rollback failed after `{e}`: {undo_err}"
                    )));
                }
                return Err(e);
            }
        };

        self.pending_tx.push(processed.clone());

        if push_state == TransactionPushState::RePush || mode == TransactionApplyMode::Invoke {
            // The authoritative state change came from the actual on-chain
            // apply; only the transaction record is kept.
            self.store.undo_session(temp_session)?;
            let (trx_hash, trx_id) = Self::transaction_hash_pair(&processed)?;
            let record = processed.clone();
            if let Err(e) = self
                .store
                .create::<TransactionObject>(|id| TransactionObject { id, trx_id, trx_hash, trx: record })
            {
                debug!("pending transaction record not inserted: {e}");
            }
        } else {
            self.store.merge_session(temp_session)?;
        }

        for observer in &self.observers {
            observer.on_pending_transaction(&processed);
        }
        Ok(processed)
    }

    fn stage_push_transaction(
        &mut self,
        trx: ProcessedTransaction,
        push_state: TransactionPushState,
        mode: &mut TransactionApplyMode,
    ) -> Result<ProcessedTransaction, ConsensusError> {
        match push_state {
            TransactionPushState::FromMe => {
                self.pending_size = self.pending_size.max(self.pending_tx.len() as u64);
                let limit = self.options.message_cache_size_limit as u64;
                if limit != 0 && self.pending_size > limit {
                    return Err(ConsensusError::PendingQueueFull {
                        size: self.pending_size,
                        limit,
                    });
                }
                *mode = TransactionApplyMode::Push;
                self._apply_transaction(&trx.trx, None, mode, false)
            }
            TransactionPushState::FromPeer => {
                *mode = TransactionApplyMode::ValidateTransaction;
                let only_try_permissions = !self.options.deduce_in_verification_mode;
                self._apply_transaction(&trx.trx, None, mode, only_try_permissions)
            }
            TransactionPushState::RePush => {
                let mut skip = self.current_skip;
                if trx.trx.leads_with_fee_share() && skip != SkipFlags::FEE_SHARE {
                    skip = SkipFlags::FEE_SHARE;
                }
                if self.head_block_num()? > 0 {
                    let params = self.chain_parameters()?;
                    let now = self.head_block_time()?;
                    if !skip.contains(SkipFlags::TAPOS_CHECK) && !trx.trx.is_agreed_task() {
                        self.check_tapos(&trx.trx)?;
                    }
                    self.check_expiration(&trx.trx, now, &params)?;
                }
                Ok(trx)
            }
        }
    }

    /// Dry-runs a transaction against head state, discarding all changes.
    pub fn validate_transaction(
        &mut self,
        trx: &SignedTransaction,
    ) -> Result<ProcessedTransaction, ConsensusError> {
        let session = self.store.start_undo_session();
        let mut mode = TransactionApplyMode::JustTry;
        let result = self._apply_transaction(trx, None, &mut mode, false);
        if let Err(undo_err) = self.store.undo_session(session) {
            return Err(ConsensusError::InternalInvariant(format!(
                "rollback failed after validation: {undo_err}"
            )));
        }
        result
    }

    /// Executes a proposal's embedded operations as an agreed task and
    /// removes the proposal. On failure the applied-ops buffer is truncated
    /// to its pre-call length and all state changes are rolled back.
    pub fn push_proposal(
        &mut self,
        proposal_id: ProposalId,
    ) -> Result<ProcessedTransaction, ConsensusError> {
        let proposal = self.store.get::<Proposal>(proposal_id)?.clone();
        let mut ptrx = ProcessedTransaction::new(proposal.proposed_transaction.clone());
        let old_applied_len = self.applied_ops.len();

        let mut state = TxEvalState {
            run_mode: TransactionApplyMode::Push,
            is_agreed_task: true,
            sig_keys: Vec::new(),
            operation_results: Vec::with_capacity(proposal.proposed_transaction.operations.len()),
            block_time: self.head_block_time()?,
        };

        let session = self.store.start_undo_session();
        let mut failure: Option<ConsensusError> = None;
        for op in &proposal.proposed_transaction.operations {
            match self.apply_operation(&mut state, op, false) {
                Ok(result) => state.operation_results.push(result),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if failure.is_none() {
            if let Err(e) = self.store.remove::<Proposal>(proposal_id) {
                failure = Some(e.into());
            }
        }

        match failure {
            None => {
                self.store.merge_session(session)?;
                ptrx.operation_results = state.operation_results;
                Ok(ptrx)
            }
            Some(e) => {
                self.applied_ops.truncate(old_applied_len);
                error!("proposal execution failed: {e}");
                self.store.undo_session(session)?;
                Err(e)
            }
        }
    }

    /// Applies a transaction under the given skip flags; see
    /// [`Chain::_apply_transaction`] for the pipeline.
    pub fn apply_transaction(
        &mut self,
        trx: &SignedTransaction,
        skip: SkipFlags,
        mode: &mut TransactionApplyMode,
    ) -> Result<ProcessedTransaction, ConsensusError> {
        self.with_skip_flags(skip, |chain| chain._apply_transaction(trx, None, mode, false))
    }

    /// The deterministic per-transaction pipeline: size and structural
    /// checks, duplicate rejection, agreed-task admission or authority
    /// verification, TaPoS and expiration, record persistence, then
    /// per-operation dispatch with runtime accounting, auto-gas and the
    /// crontab failure post-pass.
    pub(crate) fn _apply_transaction(
        &mut self,
        trx: &SignedTransaction,
        recorded_results: Option<&[OperationResult]>,
        run_mode: &mut TransactionApplyMode,
        only_try_permissions: bool,
    ) -> Result<ProcessedTransaction, ConsensusError> {
        let mut skip = self.current_skip;
        // System fee-share transactions force their own skip set.
        if trx.leads_with_fee_share() && skip != SkipFlags::FEE_SHARE {
            skip = SkipFlags::FEE_SHARE;
        }
        let params = self.chain_parameters()?;

        let percent = if self.options.op_maxsize_proportion_percent <= FULL_PROPORTION {
            self.options.op_maxsize_proportion_percent
        } else {
            1
        };
        let limit =
            (params.maximum_block_size as u64 * percent as u64 / FULL_PROPORTION as u64) as usize;
        let size = trx.packed_size()?;
        if size >= limit {
            return Err(ConsensusError::OversizedTransaction { size, limit });
        }

        if !skip.contains(SkipFlags::VALIDATE) {
            trx.validate()?;
        }

        let now = self.head_block_time()?;
        let trx_hash = trx.hash()?;
        let trx_id = trx.id()?;

        if !trx.leads_with_fee_share()
            && !skip.contains(SkipFlags::TRANSACTION_DUPE_CHECK)
            && self.store.is_known_transaction(&trx_id)
        {
            return Err(ConsensusError::DuplicateTransaction(trx_id));
        }

        let mut state = TxEvalState {
            run_mode: *run_mode,
            is_agreed_task: false,
            sig_keys: Vec::new(),
            operation_results: Vec::with_capacity(trx.operations.len()),
            block_time: now,
        };
        let mut crontab_ref: Option<CrontabId> = None;

        if !skip.intersects(SkipFlags::TRANSACTION_SIGNATURES | SkipFlags::AUTHORITY_CHECK)
            || trx.is_agreed_task()
        {
            if let Some(task) = trx.agreed_task {
                crontab_ref = self.admit_agreed_task(&task, &trx_hash, now, &params)?;
                state.is_agreed_task = true;
            } else {
                state.sig_keys = trx.signature_keys(&self.chain_id)?;
                self.verify_authority(trx, &state.sig_keys)?;
            }
        }

        if self.head_block_num()? > 0 && !state.is_agreed_task {
            if !skip.contains(SkipFlags::TAPOS_CHECK) {
                self.check_tapos(trx)?;
            }
            self.check_expiration(trx, now, &params)?;
        }

        if matches!(*run_mode, TransactionApplyMode::ApplyBlock | TransactionApplyMode::ProductionBlock)
        {
            let block_num = self.current_block_num;
            let trx_in_block = self.current_trx_in_block;
            self.store.create::<TransactionInBlock>(|id| TransactionInBlock {
                id,
                trx_hash,
                block_num,
                trx_in_block,
            })?;
        }

        if !skip.contains(SkipFlags::TRANSACTION_DUPE_CHECK) || trx.leads_with_fee_share() {
            let record = ProcessedTransaction::new(trx.clone());
            if let Err(e) = self
                .store
                .create::<TransactionObject>(|id| TransactionObject { id, trx_id, trx_hash, trx: record })
            {
                info!("transaction record not inserted: {e}");
            }
        }

        let mut ptrx = ProcessedTransaction::new(trx.clone());
        if only_try_permissions {
            return Ok(ptrx);
        }

        self.current_op_in_trx = 0;
        self.current_virtual_op = 0;
        let mut real_run_time: u64 = 0;
        let mut result_contains_error = false;
        let mut last_from: Option<AccountId> = None;
        let budget_us =
            params.block_interval as u64 * 1_000_000 * RUNTIME_BUDGET_PERCENT / 100;

        let operations = ptrx.trx.operations.clone();
        for op in &operations {
            state.run_mode = *run_mode;
            let agreed = state.is_agreed_task;
            let op_result = self.apply_operation(&mut state, op, agreed)?;

            real_run_time += op_result.runtime_us();
            if *run_mode != TransactionApplyMode::ApplyBlock && real_run_time >= budget_us {
                return Err(ConsensusError::RuntimeBudgetExceeded {
                    runtime_us: real_run_time,
                    budget_us,
                });
            }
            if *run_mode == TransactionApplyMode::ApplyBlock && state.is_agreed_task {
                let recorded = recorded_results
                    .and_then(|results| results.get(self.current_op_in_trx as usize))
                    .ok_or(ConsensusError::OperationResultMismatch {
                        trx_in_block: self.current_trx_in_block,
                        op_in_trx: self.current_op_in_trx,
                    })?;
                if op_result != *recorded {
                    return Err(ConsensusError::OperationResultMismatch {
                        trx_in_block: self.current_trx_in_block,
                        op_in_trx: self.current_op_in_trx,
                    });
                }
            }

            state.operation_results.push(op_result.clone());
            if let OperationResult::Contract(contract) = &op_result {
                if contract.existed_pv {
                    // Contract produced persistent values: the rest of the
                    // transaction re-enters in invoke mode.
                    *run_mode = TransactionApplyMode::Invoke;
                }
            }
            self.current_op_in_trx += 1;
            if op_result.is_error() {
                result_contains_error = true;
            }

            if now > AUTO_GAS_HARDFORK_TIME {
                let op_from = match (op, &op_result) {
                    (Operation::CallContractFunction(call), OperationResult::Contract(_)) => {
                        Some(call.caller)
                    }
                    (Operation::Transfer(transfer), OperationResult::Void) => Some(transfer.from),
                    _ => None,
                };
                if let Some(op_from) = op_from {
                    if last_from != Some(op_from) {
                        self.auto_gas(&mut state, op_from, now);
                        last_from = Some(op_from);
                    }
                }
            }
        }

        // A crontab that keeps failing is suspended; unless its schedule is
        // already complete, in which case the sweep deletes it instead.
        if let Some(crontab_id) = crontab_ref {
            let crontab = self.store.get::<Crontab>(crontab_id)?.clone();
            if crontab.already_execute_times < crontab.scheduled_execute_times {
                if result_contains_error {
                    let threshold = params.crontab_suspend_threshold;
                    let suspend_expiration = params.crontab_suspend_expiration;
                    self.store.modify::<Crontab>(crontab_id, |c| {
                        c.continuous_failure_times += 1;
                        if c.continuous_failure_times == threshold {
                            c.next_execute_time = TimePointSec::maximum();
                            c.is_suspended = true;
                            c.expiration_time = now.saturating_add(suspend_expiration);
                        }
                    })?;
                } else if crontab.continuous_failure_times != 0 {
                    self.store.modify::<Crontab>(crontab_id, |c| c.continuous_failure_times = 0)?;
                }
            }
        }

        ptrx.operation_results = state.operation_results;
        Ok(ptrx)
    }

    /// Admits a pre-approved proposal or crontab for execution, updating its
    /// schedule so the task cannot run twice. Returns the crontab id for the
    /// failure post-pass.
    fn admit_agreed_task(
        &mut self,
        task: &AgreedTask,
        trx_hash: &TxHash,
        now: TimePointSec,
        params: &ChainParameters,
    ) -> Result<Option<CrontabId>, ConsensusError> {
        match task.id.object_type {
            ObjectType::Proposal => {
                let id = ProposalId(task.id.instance);
                let proposal = self.store.get::<Proposal>(id)?;
                if proposal.proposed_transaction.hash()? != *trx_hash {
                    return Err(ConsensusError::AgreedTaskHashMismatch(task.id));
                }
                if !proposal.is_executable(now) {
                    return Err(ConsensusError::AgreedTaskNotExecutable(task.id));
                }
                self.store.modify::<Proposal>(id, |p| p.allow_execution = false)?;
                Ok(None)
            }
            ObjectType::Crontab => {
                let id = CrontabId(task.id.instance);
                let crontab = self.store.get::<Crontab>(id)?;
                if crontab.timed_transaction.hash()? != *trx_hash {
                    return Err(ConsensusError::AgreedTaskHashMismatch(task.id));
                }
                if !crontab.is_executable(now) {
                    return Err(ConsensusError::AgreedTaskNotExecutable(task.id));
                }
                let slack = params.assigned_task_life_cycle.min(MAX_AGREED_TASK_SLACK);
                self.store.modify::<Crontab>(id, |c| {
                    c.last_execute_time = now;
                    c.next_execute_time = now.saturating_add(c.execute_interval);
                    let remaining = c.scheduled_execute_times.saturating_sub(c.already_execute_times);
                    let extent =
                        (remaining * c.execute_interval as u64).min(u32::MAX as u64) as u32;
                    c.expiration_time = now.saturating_add(extent);
                    c.already_execute_times += 1;
                    c.timed_transaction.expiration = c.next_execute_time.saturating_add(slack);
                })?;
                Ok(Some(id))
            }
            _ => Err(ConsensusError::UnexpectedAgreedTaskKind(task.id)),
        }
    }

    fn check_tapos(&self, trx: &SignedTransaction) -> Result<(), ConsensusError> {
        let summary = self.store.get::<BlockSummary>(BlockSummaryId(trx.ref_block_num as u64))?;
        if trx.ref_block_prefix != summary.block_id.prefix_word() {
            return Err(ConsensusError::TaposMismatch);
        }
        Ok(())
    }

    fn check_expiration(
        &self,
        trx: &SignedTransaction,
        now: TimePointSec,
        params: &ChainParameters,
    ) -> Result<(), ConsensusError> {
        let latest = now.saturating_add(params.maximum_time_until_expiration);
        if trx.expiration > latest {
            return Err(ConsensusError::ExpirationTooFarInFuture {
                expiration: trx.expiration,
                now,
            });
        }
        if now > trx.expiration {
            return Err(ConsensusError::TransactionExpired { expiration: trx.expiration, now });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Authority verification
    // ------------------------------------------------------------------

    /// Checks that the signature keys cover every account authority the
    /// transaction's operations require, up to the configured delegation
    /// depth. Owner satisfies where active falls short.
    fn verify_authority(
        &self,
        trx: &SignedTransaction,
        sig_keys: &[PublicKey],
    ) -> Result<(), ConsensusError> {
        let max_depth = self.chain_parameters()?.max_authority_depth;
        let mut collected = Vec::new();
        for op in &trx.operations {
            op.required_active_authorities(&mut collected);
        }
        let required: IndexSet<AccountId> = collected.into_iter().collect();

        for account in required {
            if !self.authority_satisfied(account, sig_keys, max_depth, AuthorityClass::Active)?
                && !self.authority_satisfied(account, sig_keys, max_depth, AuthorityClass::Owner)?
            {
                return Err(ConsensusError::MissingActiveAuthority(account));
            }
        }
        Ok(())
    }

    fn authority_satisfied(
        &self,
        account: AccountId,
        sig_keys: &[PublicKey],
        depth: u8,
        class: AuthorityClass,
    ) -> Result<bool, ConsensusError> {
        let record = self.store.get::<Account>(account)?;
        let mut authority = match class {
            AuthorityClass::Active => record.active.clone(),
            AuthorityClass::Owner => record.owner.clone(),
        };
        // Temporary keys extend the active authority until they expire.
        if matches!(class, AuthorityClass::Active) {
            if let Some(temporary) = self.store.temporary_authority_of(account) {
                for (key, weight) in &temporary.temporary_active {
                    authority.key_auths.insert(*key, *weight);
                }
            }
        }

        let mut total = authority.key_weight(sig_keys);
        if total >= authority.threshold {
            return Ok(true);
        }
        if depth > 0 {
            for (delegate, weight) in &authority.account_auths {
                if self.authority_satisfied(*delegate, sig_keys, depth - 1, AuthorityClass::Active)? {
                    total += weight;
                    if total >= authority.threshold {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(total >= authority.threshold)
    }

    // ------------------------------------------------------------------
    // Operation dispatch
    // ------------------------------------------------------------------

    /// Dispatches one operation to its evaluator under a nested undo
    /// session. Agreed tasks capture evaluator failures as error results and
    /// roll back only the operation's session; anything else propagates.
    pub(crate) fn apply_operation(
        &mut self,
        state: &mut TxEvalState,
        op: &Operation,
        is_agreed_task: bool,
    ) -> Result<OperationResult, ConsensusError> {
        let undo_was_enabled = self.store.undo_enabled();
        self.store.enable_undo();
        let result = self.apply_operation_guarded(state, op, is_agreed_task);
        if undo_was_enabled {
            self.store.enable_undo();
        } else {
            self.store.disable_undo();
        }
        result
    }

    fn apply_operation_guarded(
        &mut self,
        state: &mut TxEvalState,
        op: &Operation,
        is_agreed_task: bool,
    ) -> Result<OperationResult, ConsensusError> {
        let op_session = self.store.start_undo_session();

        let evaluation = match self.evaluators.get(op.tag()).and_then(|slot| slot.as_deref()) {
            Some(evaluator) => {
                let mut ctx = EvalContext {
                    store: &mut self.store,
                    run_mode: state.run_mode,
                    is_agreed_task,
                    sig_keys: &state.sig_keys,
                    block_time: state.block_time,
                };
                evaluator.evaluate(&mut ctx, op, true)
            }
            None => Err(ConsensusError::InternalInvariant(format!(
                "no registered evaluator for operation tag {}",
                op.tag()
            ))),
        };

        match evaluation {
            Ok(result) => {
                let op_index = self.push_applied_operation(op.clone());
                self.set_applied_operation_result(op_index, result.clone());
                self.store.merge_session(op_session)?;
                Ok(result)
            }
            Err(e) if is_agreed_task => {
                let result = OperationResult::Error(ErrorResult {
                    code: e.code(),
                    message: e.to_string(),
                    real_running_time_us: 0,
                });
                self.store.undo_session(op_session)?;
                let op_index = self.push_applied_operation(op.clone());
                self.set_applied_operation_result(op_index, result.clone());
                Ok(result)
            }
            Err(e) => {
                self.store.undo_session(op_session)?;
                Err(e)
            }
        }
    }

    /// Synthesizes a vesting-balance withdrawal funding gas for the acting
    /// account. Best-effort: failures are logged and swallowed.
    fn auto_gas(&mut self, state: &mut TxEvalState, from: AccountId, now: TimePointSec) {
        let Some(first) = self.store.vesting_balances_of(from).into_iter().next() else {
            return;
        };
        let Some(vesting) = self.store.find::<VestingBalance>(first) else {
            return;
        };
        let vesting = vesting.clone();

        let amount = vesting.allowed_withdraw(now);
        if amount.asset_id != GAS_ASSET || amount.amount <= AUTO_GAS_MIN_WITHDRAW {
            return;
        }

        let op = Operation::VestingBalanceWithdraw(VestingBalanceWithdrawOperation {
            vesting_balance: vesting.id,
            owner: vesting.owner,
            amount,
        });
        match self.apply_operation(state, &op, false) {
            Ok(result) if !result.is_error() => state.operation_results.push(result),
            Ok(_) => warn!("auto gas withdrawal produced an error result"),
            Err(e) => warn!("auto gas withdrawal failed: {e}"),
        }
    }
}
