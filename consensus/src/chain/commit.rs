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

use super::{Chain, TransactionPushState};
use crate::{
    error::ConsensusError, evaluator::TransactionApplyMode, fork::ForkItem, skip::SkipFlags,
};

use ember_objects::{BlockId, SignedBlock, WitnessId};
use ember_storage::Witness;

use anyhow::anyhow;
use std::sync::Arc;
use tracing::{debug, error, warn};

impl Chain {
    /// Ingests a candidate block, switching forks when it extends a heavier
    /// branch. Returns whether a fork switch happened.
    ///
    /// Runs with the pending queue temporarily cleared; on exit every popped
    /// and pending transaction is re-pushed best-effort.
    pub fn push_block(
        &mut self,
        new_block: &SignedBlock,
        skip: SkipFlags,
    ) -> Result<bool, ConsensusError> {
        self.with_skip_flags(skip, |chain| {
            chain.without_pending_transactions(|chain| chain._push_block(new_block))
        })
    }

    /// Drains the pending queue around `f`, then re-pushes popped and former
    /// pending transactions; ones that no longer validate are dropped.
    fn without_pending_transactions<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, ConsensusError>,
    ) -> Result<R, ConsensusError> {
        let pending = std::mem::take(&mut self.pending_tx);
        self.clear_pending()?;

        let result = f(self);

        let requeue: Vec<_> = self.popped_tx.drain(..).chain(pending).collect();
        for trx in requeue {
            if let Err(e) = self._push_transaction(trx, TransactionPushState::RePush) {
                debug!("dropping transaction during pending-queue restore: {e}");
            }
        }
        result
    }

    pub(crate) fn _push_block(&mut self, new_block: &SignedBlock) -> Result<bool, ConsensusError> {
        let skip = self.current_skip;
        let new_id = new_block.id()?;

        if !skip.contains(SkipFlags::FORK_DB) {
            let new_head = self.fork_db.push_block(new_block.clone())?;
            // If the longest known chain no longer builds off our head, we
            // either switch forks or ignore the block.
            if new_head.block.header.previous != self.head_block_id()? {
                if new_head.num > self.head_block_num()? {
                    return self.switch_forks(new_head);
                }
                return Ok(false);
            }
        }

        if let Err(e) = self.apply_and_store(new_block, new_id, skip) {
            error!("failed to push new block: {e}");
            self.fork_db.remove(&new_id);
            return Err(e);
        }
        Ok(false)
    }

    /// Applies a block under a fresh session and commits it together with
    /// the block-log write; rolls back on failure.
    fn apply_and_store(
        &mut self,
        block: &SignedBlock,
        id: BlockId,
        skip: SkipFlags,
    ) -> Result<(), ConsensusError> {
        let session = self.store.start_undo_session();
        match self.apply_block(block, skip) {
            Ok(()) => {
                self.block_store.store(id, block);
                self.store.commit_session(session)?;
                Ok(())
            }
            Err(e) => {
                if let Err(undo_err) = self.store.undo_session(session) {
                    return Err(ConsensusError::InternalInvariant(format!(
                        "rollback failed after `{e}`: {undo_err}"
                    )));
                }
                Err(e)
            }
        }
    }

    /// Abandons the current tip for a heavier branch. Atomic: if any block
    /// of the new branch fails to apply, the invalid remainder is dropped
    /// from the fork database, the original chain is restored, and the
    /// failure is re-raised.
    fn switch_forks(&mut self, new_head: Arc<ForkItem>) -> Result<bool, ConsensusError> {
        let skip = self.current_skip;
        warn!("switching to fork: {}", new_head.id);

        let original_head_id = self.head_block_id()?;
        let (new_branch, old_branch) =
            self.fork_db.fetch_branch_from(new_head.id, original_head_id)?;
        let ancestor_prev = new_branch
            .last()
            .map(|item| item.previous)
            .ok_or_else(|| anyhow!("fork switch with an empty new branch"))?;

        // Pop back to the common ancestor.
        while self.head_block_id()? != ancestor_prev {
            self.pop_block()?;
        }

        // Apply the new branch oldest-first.
        for item in new_branch.iter().rev() {
            debug!("pushing block from fork {} {}", item.num, item.id);
            if let Err(except) = self.apply_and_store(&item.block, item.id, skip) {
                warn!("exception thrown while switching forks: {except}");

                // The whole branch is abandoned: the failed block and its
                // descendants are invalid, and the blocks beneath it are
                // about to be popped.
                for bad in &new_branch {
                    self.fork_db.remove(&bad.id);
                }
                match old_branch.first() {
                    Some(old_tip) => self.fork_db.set_head(old_tip.clone()),
                    None => {
                        if let Some(item) = self.fork_db.fetch_block(&original_head_id) {
                            self.fork_db.set_head(item);
                        }
                    }
                }

                // Pop whatever part of the new branch made it in.
                while self.head_block_id()? != ancestor_prev {
                    self.pop_block()?;
                }

                // Restore the original chain, storing each block under its
                // own id.
                for item in old_branch.iter().rev() {
                    self.apply_and_store(&item.block, item.id, skip)?;
                }
                if let Some(old_tip) = old_branch.first() {
                    self.fork_db.set_head(old_tip.clone());
                }
                return Err(except);
            }
        }
        Ok(true)
    }

    /// Removes the head block, reverting its state changes and queueing its
    /// transactions for re-push.
    pub fn pop_block(&mut self) -> Result<(), ConsensusError> {
        self.reset_pending_session()?;
        let head_id = self.head_block_id()?;
        let head_block = self.fetch_block_by_id(&head_id).ok_or(ConsensusError::PopEmptyChain)?;

        self.fork_db.pop_block()?;
        self.store.pop_undo()?;
        self.popped_tx.extend(head_block.transactions.into_iter().map(|(_, trx)| trx));
        Ok(())
    }

    /// Applies a block to the head state. Beneath the highest checkpoint all
    /// validation is skipped; a block at a checkpointed height must match
    /// the checkpoint id.
    pub fn apply_block(
        &mut self,
        block: &SignedBlock,
        skip: SkipFlags,
    ) -> Result<(), ConsensusError> {
        let block_num = block.block_num();
        let mut skip = skip;
        if let Some((&last_checkpoint, _)) = self.checkpoints.iter().next_back() {
            if let Some(expected) = self.checkpoints.get(&block_num) {
                if block.id()? != *expected {
                    return Err(ConsensusError::CheckpointMismatch {
                        block_num,
                        expected: *expected,
                    });
                }
            }
            if last_checkpoint >= block_num {
                skip = SkipFlags::ALL;
            }
        }
        self.with_skip_flags(skip, |chain| chain._apply_block(block))
    }

    pub(crate) fn _apply_block(&mut self, block: &SignedBlock) -> Result<(), ConsensusError> {
        let skip = self.current_skip;
        let block_num = block.block_num();
        self.applied_ops.clear();

        if !skip.contains(SkipFlags::MERKLE_CHECK)
            && block.header.transaction_merkle_root != block.calculate_merkle_root()
        {
            return Err(ConsensusError::MerkleMismatch);
        }
        let signing_witness = self.validate_block_header(skip, block)?;
        let maintenance_needed =
            self.dynamic_global_property()?.next_maintenance_time <= block.header.timestamp;

        self.current_block_num = block_num;
        self.current_trx_in_block = 0;

        for (trx_hash, trx) in &block.transactions {
            // Transactions in a block either all apply or the whole block
            // fails; per-transaction undo state is only needed when pushing
            // or producing.
            if trx.operation_results.is_empty() {
                return Err(ConsensusError::EmptyOperationResults(*trx_hash));
            }
            let mut mode = TransactionApplyMode::ApplyBlock;
            self.with_skip_flags(skip | SkipFlags::AUTHORITY_CHECK, |chain| {
                chain._apply_transaction(&trx.trx, Some(&trx.operation_results), &mut mode, false)
            })?;
            self.current_trx_in_block += 1;
        }

        self.update_global_dynamic_data(block)?;
        self.update_signing_witness(signing_witness, block)?;
        self.update_last_irreversible_block()?;
        if maintenance_needed {
            self.maintenance.perform_chain_maintenance(&mut self.store, block)?;
        }
        self.create_block_summary(block)?;
        self.clear_expired_transactions()?;
        self.clear_expired_proposals()?;
        self.clear_expired_timed_tasks()?;
        self.clear_expired_temporary_authorities()?;
        self.update_maintenance_flag(maintenance_needed)?;
        self.update_witness_schedule()?;

        for observer in &self.observers {
            observer.applied_block(block);
        }
        self.applied_ops.clear();
        for observer in &self.observers {
            observer.notify_changed_objects();
        }
        Ok(())
    }

    /// Header validation against the current head: linkage, time advance,
    /// witness signature and production schedule.
    pub(crate) fn validate_block_header(
        &self,
        skip: SkipFlags,
        block: &SignedBlock,
    ) -> Result<WitnessId, ConsensusError> {
        let head_id = self.head_block_id()?;
        if head_id != block.header.previous {
            return Err(ConsensusError::PreviousMismatch {
                expected: head_id,
                got: block.header.previous,
            });
        }
        let head_time = self.head_block_time()?;
        if head_time >= block.header.timestamp {
            return Err(ConsensusError::TimestampRegression {
                head: head_time,
                block: block.header.timestamp,
            });
        }

        let witness = self.store.get::<Witness>(block.header.witness)?;
        if !skip.contains(SkipFlags::WITNESS_SIGNATURE)
            && !block.validate_signee(&witness.signing_key, &self.chain_id)
        {
            return Err(ConsensusError::BadWitnessSignature);
        }

        if !skip.contains(SkipFlags::WITNESS_SCHEDULE_CHECK) {
            let slot_num = self.get_slot_at_time(block.header.timestamp)?;
            if slot_num == 0 {
                return Err(ConsensusError::WitnessScheduleMismatch { slot: 0 });
            }
            let scheduled = self.get_scheduled_witness(slot_num)?;
            if block.header.witness != scheduled {
                return Err(ConsensusError::WitnessScheduleMismatch { slot: slot_num });
            }
        }

        Ok(witness.id)
    }
}
