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

mod commit;
mod housekeeping;
mod produce;
mod transaction;

pub use transaction::TransactionPushState;

use crate::{
    error::ConsensusError,
    evaluator::{default_evaluators, EvaluatorRegistry, OperationEvaluator},
    fork::ForkDatabase,
    genesis::{apply_genesis, GenesisConfig},
    observer::{ChainObserver, DefaultMaintenance, MaintenanceHook},
    parameters::NodeOptions,
    skip::SkipFlags,
};

use ember_objects::{
    BlockId, Digest, DynamicGlobalPropertyId, GlobalPropertyId, ObjectError, Operation,
    OperationResult, ProcessedTransaction, SignedBlock, TimePointSec, TransactionId, TxHash,
};
use ember_storage::{
    BlockStore, ChainParameters, DynamicGlobalProperty, GlobalProperty, Store, TransactionInBlock,
    TransactionObject, UndoSession,
};

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};
use tracing::error;

/// One applied (explicit or virtual) operation, with its position within the
/// current block.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationHistory {
    pub op: Operation,
    pub result: OperationResult,
    pub block_num: u32,
    pub trx_in_block: u32,
    pub op_in_trx: u32,
    pub virtual_op: u32,
}

/// The block-and-transaction processing core: a single object owning the
/// object store, undo stack, fork database and pending queue. Strictly
/// single-writer; all mutation flows through one `&mut self` at a time.
pub struct Chain {
    pub(crate) store: Store,
    pub(crate) fork_db: ForkDatabase,
    pub(crate) block_store: Arc<dyn BlockStore>,
    pub(crate) evaluators: EvaluatorRegistry,
    pub(crate) observers: Vec<Arc<dyn ChainObserver>>,
    pub(crate) maintenance: Box<dyn MaintenanceHook>,
    pub(crate) options: NodeOptions,
    pub(crate) chain_id: Digest,
    pub(crate) checkpoints: BTreeMap<u32, BlockId>,

    pub(crate) pending_tx: Vec<ProcessedTransaction>,
    pub(crate) pending_session: Option<UndoSession>,
    pub(crate) popped_tx: VecDeque<ProcessedTransaction>,
    /// High-water mark of the pending queue, bounded by the message cache
    /// limit; reset only through [`Chain::log_pending_size`].
    pub(crate) pending_size: u64,

    pub(crate) applied_ops: Vec<Option<OperationHistory>>,
    pub(crate) current_block_num: u32,
    pub(crate) current_trx_in_block: u32,
    pub(crate) current_op_in_trx: u32,
    pub(crate) current_virtual_op: u32,
    pub(crate) current_skip: SkipFlags,
}

impl Chain {
    /// Brings up a chain from genesis with the built-in evaluators.
    pub fn new(
        genesis: GenesisConfig,
        block_store: Arc<dyn BlockStore>,
        options: NodeOptions,
    ) -> Result<Self, ConsensusError> {
        let chain_id = genesis.chain_id()?;
        let mut store = Store::new();
        apply_genesis(&mut store, &genesis)?;

        Ok(Self {
            store,
            fork_db: ForkDatabase::new(),
            block_store,
            evaluators: default_evaluators(),
            observers: Vec::new(),
            maintenance: Box::new(DefaultMaintenance),
            options,
            chain_id,
            checkpoints: BTreeMap::new(),
            pending_tx: Vec::new(),
            pending_session: None,
            popped_tx: VecDeque::new(),
            pending_size: 0,
            applied_ops: Vec::new(),
            current_block_num: 0,
            current_trx_in_block: 0,
            current_op_in_trx: 0,
            current_virtual_op: 0,
            current_skip: SkipFlags::NOTHING,
        })
    }

    // ------------------------------------------------------------------
    // Collaborator registration
    // ------------------------------------------------------------------

    /// Replaces the evaluator at the given operation tag.
    pub fn register_evaluator(&mut self, tag: usize, evaluator: Box<dyn OperationEvaluator>) {
        if self.evaluators.len() <= tag {
            self.evaluators.resize_with(tag + 1, || None);
        }
        self.evaluators[tag] = Some(evaluator);
    }

    pub fn register_observer(&mut self, observer: Arc<dyn ChainObserver>) {
        self.observers.push(observer);
    }

    pub fn set_maintenance_hook(&mut self, hook: Box<dyn MaintenanceHook>) {
        self.maintenance = hook;
    }

    // ------------------------------------------------------------------
    // State accessors
    // ------------------------------------------------------------------

    pub fn chain_id(&self) -> &Digest {
        &self.chain_id
    }

    pub fn fork_database(&self) -> &ForkDatabase {
        &self.fork_db
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Direct mutable store access, for node bootstrap and tests. Mutations
    /// are captured by whatever undo session is active.
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn dynamic_global_property(&self) -> Result<&DynamicGlobalProperty, ConsensusError> {
        Ok(self.store.get::<DynamicGlobalProperty>(DynamicGlobalPropertyId(0))?)
    }

    pub fn global_property(&self) -> Result<&GlobalProperty, ConsensusError> {
        Ok(self.store.get::<GlobalProperty>(GlobalPropertyId(0))?)
    }

    pub fn chain_parameters(&self) -> Result<ChainParameters, ConsensusError> {
        Ok(self.global_property()?.parameters.clone())
    }

    pub fn head_block_id(&self) -> Result<BlockId, ConsensusError> {
        Ok(self.dynamic_global_property()?.head_block_id)
    }

    pub fn head_block_num(&self) -> Result<u32, ConsensusError> {
        Ok(self.dynamic_global_property()?.head_block_number)
    }

    pub fn head_block_time(&self) -> Result<TimePointSec, ConsensusError> {
        Ok(self.dynamic_global_property()?.time)
    }

    pub fn block_interval(&self) -> Result<u8, ConsensusError> {
        Ok(self.global_property()?.parameters.block_interval)
    }

    // ------------------------------------------------------------------
    // Block and transaction queries
    // ------------------------------------------------------------------

    pub fn is_known_block(&self, id: &BlockId) -> bool {
        self.fork_db.is_known_block(id) || self.block_store.contains(id)
    }

    /// Only true while the transaction has neither expired nor been swept;
    /// anything older must be located through its block.
    pub fn is_known_transaction(&self, trx_id: &TransactionId) -> bool {
        self.store.is_known_transaction(trx_id)
    }

    pub fn fetch_block_by_id(&self, id: &BlockId) -> Option<SignedBlock> {
        match self.fork_db.fetch_block(id) {
            Some(item) => Some(item.block.clone()),
            None => self.block_store.fetch_optional(id),
        }
    }

    pub fn fetch_block_by_number(&self, num: u32) -> Option<SignedBlock> {
        let candidates = self.fork_db.fetch_block_by_number(num);
        if candidates.len() == 1 {
            return Some(candidates[0].block.clone());
        }
        self.block_store.fetch_by_number(num)
    }

    pub fn get_block_id_for_num(&self, num: u32) -> Option<BlockId> {
        self.block_store.fetch_block_id(num)
    }

    pub fn get_recent_transaction(&self, trx_hash: &TxHash) -> Option<TransactionObject> {
        self.store.find_transaction_by_hash(trx_hash).cloned()
    }

    pub fn get_transaction_in_block_info(&self, trx_hash: &TxHash) -> Option<TransactionInBlock> {
        self.store.find_in_block_by_hash(trx_hash).cloned()
    }

    /// Ids of the blocks on the given fork, tip-first, terminated by the
    /// common ancestor shared with the current chain.
    pub fn get_block_ids_on_fork(
        &self,
        head_of_fork: BlockId,
    ) -> Result<Vec<BlockId>, ConsensusError> {
        let head_id = self.head_block_id()?;
        let (current_branch, fork_branch) = self.fork_db.fetch_branch_from(head_id, head_of_fork)?;

        let ancestor = current_branch
            .last()
            .map(|item| item.previous)
            .or_else(|| fork_branch.last().map(|item| item.previous))
            .unwrap_or(head_id);

        let mut result: Vec<BlockId> = fork_branch.iter().map(|item| item.id).collect();
        result.push(ancestor);
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Checkpoints and node options
    // ------------------------------------------------------------------

    pub fn add_checkpoints(&mut self, checkpoints: impl IntoIterator<Item = (u32, BlockId)>) {
        self.checkpoints.extend(checkpoints);
    }

    pub fn before_last_checkpoint(&self) -> bool {
        match (self.checkpoints.keys().next_back(), self.head_block_num()) {
            (Some(&last), Ok(head)) => last >= head,
            _ => false,
        }
    }

    /// Limits the pending queue at from-me push time; `0` disables the
    /// bound, anything else must be at least 3000.
    pub fn set_message_cache_size_limit(&mut self, limit: u16) -> Result<(), ConsensusError> {
        if limit != 0 && limit < 3000 {
            return Err(ConsensusError::InternalInvariant(format!(
                "message cache size limit {limit} below the 3000 floor"
            )));
        }
        self.options.message_cache_size_limit = limit;
        Ok(())
    }

    /// Resets the pending-queue high-water mark to the current queue size.
    pub fn log_pending_size(&mut self) {
        self.pending_size = self.pending_tx.len() as u64;
    }

    pub fn pending_transactions(&self) -> &[ProcessedTransaction] {
        &self.pending_tx
    }

    // ------------------------------------------------------------------
    // Applied-operations buffer
    // ------------------------------------------------------------------

    /// Appends an applied (or virtual) operation at the current block
    /// position and returns its buffer index.
    pub(crate) fn push_applied_operation(&mut self, op: Operation) -> usize {
        self.applied_ops.push(Some(OperationHistory {
            op,
            result: OperationResult::Void,
            block_num: self.current_block_num,
            trx_in_block: self.current_trx_in_block,
            op_in_trx: self.current_op_in_trx,
            virtual_op: self.current_virtual_op,
        }));
        self.current_virtual_op += 1;
        self.applied_ops.len() - 1
    }

    pub(crate) fn set_applied_operation_result(&mut self, index: usize, result: OperationResult) {
        match self.applied_ops.get_mut(index) {
            Some(Some(history)) => history.result = result,
            _ => error!(
                "could not set operation result (head_block_num={})",
                self.head_block_num().unwrap_or(0)
            ),
        }
    }

    pub fn get_applied_operations(&self) -> &[Option<OperationHistory>] {
        &self.applied_ops
    }

    // ------------------------------------------------------------------
    // Skip-flag overlay and pending session plumbing
    // ------------------------------------------------------------------

    /// Runs `f` with the given skip flags in effect, restoring the previous
    /// overlay on every exit path.
    pub(crate) fn with_skip_flags<R>(
        &mut self,
        skip: SkipFlags,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = self.current_skip;
        self.current_skip = skip;
        let result = f(self);
        self.current_skip = previous;
        result
    }

    /// Undoes and drops the pending session, if one is open.
    pub(crate) fn reset_pending_session(&mut self) -> Result<(), ConsensusError> {
        if let Some(session) = self.pending_session.take() {
            self.store.undo_session(session)?;
        }
        Ok(())
    }

    /// Drops all queued transactions along with their session.
    pub fn clear_pending(&mut self) -> Result<(), ConsensusError> {
        debug_assert!(self.pending_tx.is_empty() || self.pending_session.is_some());
        self.pending_tx.clear();
        self.reset_pending_session()
    }

    pub(crate) fn transaction_hash_pair(
        trx: &ProcessedTransaction,
    ) -> Result<(TxHash, TransactionId), ObjectError> {
        Ok((trx.hash()?, trx.id()?))
    }
}
