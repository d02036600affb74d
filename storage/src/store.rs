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
    error::StorageError,
    objects::{ChainObject, Object, TemporaryAuthority, TransactionInBlock, TransactionObject},
    undo::{UndoLayer, UndoSession, UndoStack},
};

use ember_objects::{
    AccountId, CrontabId, ObjectId, ObjectType, ProposalId, TemporaryAuthorityId, TimePointSec,
    TransactionId, TransactionInBlockId, TransactionObjectId, TxHash, VestingBalanceId,
};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Secondary indexes, kept consistent synchronously with every mutation.
#[derive(Debug, Default)]
struct Indexes {
    transaction_by_id: HashMap<TransactionId, TransactionObjectId>,
    transaction_by_hash: HashMap<TxHash, TransactionObjectId>,
    transaction_by_expiration: BTreeSet<(TimePointSec, TransactionObjectId)>,
    in_block_by_hash: BTreeMap<TxHash, Vec<TransactionInBlockId>>,
    vesting_by_account: BTreeSet<(AccountId, VestingBalanceId)>,
    temporary_authority_by_account: HashMap<AccountId, TemporaryAuthorityId>,
    temporary_authority_by_expiration: BTreeSet<(TimePointSec, TemporaryAuthorityId)>,
    proposal_by_expiration: BTreeSet<(TimePointSec, ProposalId)>,
    crontab_by_expiration: BTreeSet<(TimePointSec, CrontabId)>,
}

/// The typed, indexed in-memory object store. Every create/modify/remove is
/// captured by the active undo session unless capture is disabled.
#[derive(Debug)]
pub struct Store {
    objects: BTreeMap<ObjectId, Object>,
    next_instance: BTreeMap<ObjectType, u64>,
    indexes: Indexes,
    undo: UndoStack,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_instance: BTreeMap::new(),
            indexes: Indexes::default(),
            undo: UndoStack::new(),
        }
    }

    // ------------------------------------------------------------------
    // Typed object surface
    // ------------------------------------------------------------------

    /// Creates a new object of kind `T`, assigning the next instance number.
    /// The builder receives the assigned id and must store it on the record.
    pub fn create<T: ChainObject>(
        &mut self,
        build: impl FnOnce(T::Id) -> T,
    ) -> Result<T, StorageError> {
        self.undo.ensure_capture_ready()?;
        let object_type = T::OBJECT_TYPE;
        let prior_next = self.next_instance.get(&object_type).copied().unwrap_or(0);
        let id = T::Id::from(prior_next);
        let record = build(id);
        let object = record.clone().into_object();
        let object_id = object.object_id();
        let assigned: ObjectId = id.into();
        if object_id != assigned {
            return Err(StorageError::UndoStackDesync(format!(
                "builder replaced the assigned id of {object_id}"
            )));
        }

        self.raw_insert(object)?;
        self.next_instance.insert(object_type, prior_next + 1);
        self.undo.on_create(object_id, prior_next)?;
        Ok(record)
    }

    pub fn get<T: ChainObject>(&self, id: T::Id) -> Result<&T, StorageError> {
        let object_id: ObjectId = id.into();
        let object =
            self.objects.get(&object_id).ok_or(StorageError::ObjectNotFound(object_id))?;
        T::from_object(object).ok_or(StorageError::WrongObjectType(object_id))
    }

    pub fn find<T: ChainObject>(&self, id: T::Id) -> Option<&T> {
        let object_id: ObjectId = id.into();
        self.objects.get(&object_id).and_then(T::from_object)
    }

    /// Applies `f` to the object, re-indexing it and recording the prior
    /// value in the active undo session.
    pub fn modify<T: ChainObject>(
        &mut self,
        id: T::Id,
        f: impl FnOnce(&mut T),
    ) -> Result<(), StorageError> {
        self.undo.ensure_capture_ready()?;
        let object_id: ObjectId = id.into();
        let current =
            self.objects.get(&object_id).ok_or(StorageError::ObjectNotFound(object_id))?;
        let mut record = T::from_object(current)
            .ok_or(StorageError::WrongObjectType(object_id))?
            .clone();
        f(&mut record);
        let updated = record.into_object();
        if updated.object_id() != object_id {
            return Err(StorageError::UndoStackDesync(format!(
                "modify changed the id of {object_id}"
            )));
        }

        let old = self.raw_replace(updated)?;
        self.undo.on_modify(object_id, old)?;
        Ok(())
    }

    /// Removes the object, returning the removed record.
    pub fn remove<T: ChainObject>(&mut self, id: T::Id) -> Result<T, StorageError> {
        self.undo.ensure_capture_ready()?;
        let object_id: ObjectId = id.into();
        let old = self.raw_remove(object_id)?;
        self.undo.on_remove(object_id, old.clone())?;
        T::from_object(&old)
            .cloned()
            .ok_or(StorageError::WrongObjectType(object_id))
    }

    // ------------------------------------------------------------------
    // Undo surface
    // ------------------------------------------------------------------

    pub fn start_undo_session(&mut self) -> UndoSession {
        self.undo.start_session()
    }

    /// Makes the session's deltas permanent at this level; the layer remains
    /// available to [`Store::pop_undo`] at block granularity.
    pub fn commit_session(&mut self, session: UndoSession) -> Result<(), StorageError> {
        self.undo.commit(session)
    }

    /// Restores the state from before the session was opened.
    pub fn undo_session(&mut self, session: UndoSession) -> Result<(), StorageError> {
        let layer = self.undo.take_for_undo(session)?;
        self.revert_layer(layer)
    }

    /// Folds the session's deltas into its parent session.
    pub fn merge_session(&mut self, session: UndoSession) -> Result<(), StorageError> {
        self.undo.merge(session)
    }

    /// Reverts the most recent committed (block-level) undo state.
    pub fn pop_undo(&mut self) -> Result<(), StorageError> {
        let layer = self.undo.take_committed_for_undo()?;
        debug!(
            "reverting committed undo state ({} creates, {} modifies, {} removes)",
            layer.new_ids.len(),
            layer.old_values.len(),
            layer.removed.len()
        );
        self.revert_layer(layer)
    }

    pub fn undo_enabled(&self) -> bool {
        self.undo.enabled()
    }

    pub fn enable_undo(&mut self) {
        self.undo.enable();
    }

    pub fn disable_undo(&mut self) {
        self.undo.disable();
    }

    pub fn set_max_undo_depth(&mut self, max_depth: usize) {
        self.undo.set_max_depth(max_depth);
    }

    /// The number of in-progress (uncommitted) sessions.
    pub fn open_sessions(&self) -> usize {
        self.undo.open_sessions()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.depth()
    }

    fn revert_layer(&mut self, layer: UndoLayer) -> Result<(), StorageError> {
        // Capture must not observe its own reversal.
        let was_enabled = self.undo.enabled();
        self.undo.disable();
        let result = self.apply_reversal(layer);
        if was_enabled {
            self.undo.enable();
        }
        result
    }

    fn apply_reversal(&mut self, layer: UndoLayer) -> Result<(), StorageError> {
        for (_, old) in layer.old_values.iter().rev() {
            self.raw_replace(old.clone())
                .map_err(|e| StorageError::UndoStackDesync(format!("restore failed: {e}")))?;
        }
        for id in layer.new_ids.iter().rev() {
            self.raw_remove(*id)
                .map_err(|e| StorageError::UndoStackDesync(format!("erase failed: {e}")))?;
        }
        for (_, old) in layer.removed.iter().rev() {
            self.raw_insert(old.clone())
                .map_err(|e| StorageError::UndoStackDesync(format!("reinsert failed: {e}")))?;
        }
        for (object_type, next) in layer.old_next_instance {
            self.next_instance.insert(object_type, next);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Secondary-index queries
    // ------------------------------------------------------------------

    pub fn find_transaction_by_id(&self, trx_id: &TransactionId) -> Option<&TransactionObject> {
        let id = *self.indexes.transaction_by_id.get(trx_id)?;
        self.find::<TransactionObject>(id)
    }

    pub fn find_transaction_by_hash(&self, trx_hash: &TxHash) -> Option<&TransactionObject> {
        let id = *self.indexes.transaction_by_hash.get(trx_hash)?;
        self.find::<TransactionObject>(id)
    }

    pub fn is_known_transaction(&self, trx_id: &TransactionId) -> bool {
        self.indexes.transaction_by_id.contains_key(trx_id)
    }

    /// The most recent in-block record for the given transaction hash.
    pub fn find_in_block_by_hash(&self, trx_hash: &TxHash) -> Option<&TransactionInBlock> {
        let id = *self.indexes.in_block_by_hash.get(trx_hash)?.last()?;
        self.find::<TransactionInBlock>(id)
    }

    /// Vesting balance ids of an account, in creation order.
    pub fn vesting_balances_of(&self, account: AccountId) -> Vec<VestingBalanceId> {
        self.indexes
            .vesting_by_account
            .range((account, VestingBalanceId(0))..=(account, VestingBalanceId(u64::MAX)))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn temporary_authority_of(&self, account: AccountId) -> Option<&TemporaryAuthority> {
        let id = *self.indexes.temporary_authority_by_account.get(&account)?;
        self.find::<TemporaryAuthority>(id)
    }

    /// Transactions whose expiration precedes `cutoff`.
    pub fn transactions_expiring_before(&self, cutoff: TimePointSec) -> Vec<TransactionObjectId> {
        self.indexes
            .transaction_by_expiration
            .range(..(cutoff, TransactionObjectId(0)))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn proposals_expiring_before(&self, cutoff: TimePointSec) -> Vec<ProposalId> {
        self.indexes
            .proposal_by_expiration
            .range(..(cutoff, ProposalId(0)))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn crontabs_expiring_before(&self, cutoff: TimePointSec) -> Vec<CrontabId> {
        self.indexes
            .crontab_by_expiration
            .range(..(cutoff, CrontabId(0)))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn temporary_authorities_expiring_before(
        &self,
        cutoff: TimePointSec,
    ) -> Vec<TemporaryAuthorityId> {
        self.indexes
            .temporary_authority_by_expiration
            .range(..(cutoff, TemporaryAuthorityId(0)))
            .map(|(_, id)| *id)
            .collect()
    }

    /// A copy of the full object map, for state comparisons in tests.
    pub fn snapshot(&self) -> BTreeMap<ObjectId, Object> {
        self.objects.clone()
    }

    // ------------------------------------------------------------------
    // Raw mutation: object map plus synchronous index maintenance. These
    // bypass undo capture and are shared with layer reversal.
    // ------------------------------------------------------------------

    fn raw_insert(&mut self, object: Object) -> Result<(), StorageError> {
        let object_id = object.object_id();
        if self.objects.contains_key(&object_id) {
            return Err(StorageError::DuplicateKey(format!("object id {object_id}")));
        }
        self.check_index_constraints(&object)?;
        self.index_insert(&object);
        self.objects.insert(object_id, object);
        Ok(())
    }

    fn raw_replace(&mut self, updated: Object) -> Result<Object, StorageError> {
        let object_id = updated.object_id();
        let old = self
            .objects
            .get(&object_id)
            .cloned()
            .ok_or(StorageError::ObjectNotFound(object_id))?;
        self.index_remove(&old);
        if let Err(e) = self.check_index_constraints(&updated) {
            self.index_insert(&old);
            return Err(e);
        }
        self.index_insert(&updated);
        self.objects.insert(object_id, updated);
        Ok(old)
    }

    fn raw_remove(&mut self, object_id: ObjectId) -> Result<Object, StorageError> {
        let old = self
            .objects
            .remove(&object_id)
            .ok_or(StorageError::ObjectNotFound(object_id))?;
        self.index_remove(&old);
        Ok(old)
    }

    fn check_index_constraints(&self, object: &Object) -> Result<(), StorageError> {
        match object {
            Object::Transaction(trx) => {
                if self.indexes.transaction_by_id.contains_key(&trx.trx_id) {
                    return Err(StorageError::DuplicateKey(format!(
                        "transaction id {}",
                        trx.trx_id
                    )));
                }
                if self.indexes.transaction_by_hash.contains_key(&trx.trx_hash) {
                    return Err(StorageError::DuplicateKey(format!(
                        "transaction hash {}",
                        trx.trx_hash
                    )));
                }
            }
            Object::TemporaryAuthority(auth) => {
                if self.indexes.temporary_authority_by_account.contains_key(&auth.account) {
                    return Err(StorageError::DuplicateKey(format!(
                        "temporary authority for account {}",
                        auth.account
                    )));
                }
            }
            _ => (),
        }
        Ok(())
    }

    fn index_insert(&mut self, object: &Object) {
        match object {
            Object::Transaction(trx) => {
                self.indexes.transaction_by_id.insert(trx.trx_id, trx.id);
                self.indexes.transaction_by_hash.insert(trx.trx_hash, trx.id);
                self.indexes.transaction_by_expiration.insert((trx.expiration(), trx.id));
            }
            Object::TransactionInBlock(info) => {
                self.indexes.in_block_by_hash.entry(info.trx_hash).or_default().push(info.id);
            }
            Object::VestingBalance(vb) => {
                self.indexes.vesting_by_account.insert((vb.owner, vb.id));
            }
            Object::TemporaryAuthority(auth) => {
                self.indexes.temporary_authority_by_account.insert(auth.account, auth.id);
                self.indexes
                    .temporary_authority_by_expiration
                    .insert((auth.expiration_time, auth.id));
            }
            Object::Proposal(proposal) => {
                self.indexes.proposal_by_expiration.insert((proposal.expiration_time, proposal.id));
            }
            Object::Crontab(crontab) => {
                self.indexes.crontab_by_expiration.insert((crontab.expiration_time, crontab.id));
            }
            _ => (),
        }
    }

    fn index_remove(&mut self, object: &Object) {
        match object {
            Object::Transaction(trx) => {
                self.indexes.transaction_by_id.remove(&trx.trx_id);
                self.indexes.transaction_by_hash.remove(&trx.trx_hash);
                self.indexes.transaction_by_expiration.remove(&(trx.expiration(), trx.id));
            }
            Object::TransactionInBlock(info) => {
                if let Some(ids) = self.indexes.in_block_by_hash.get_mut(&info.trx_hash) {
                    ids.retain(|id| *id != info.id);
                    if ids.is_empty() {
                        self.indexes.in_block_by_hash.remove(&info.trx_hash);
                    }
                }
            }
            Object::VestingBalance(vb) => {
                self.indexes.vesting_by_account.remove(&(vb.owner, vb.id));
            }
            Object::TemporaryAuthority(auth) => {
                self.indexes.temporary_authority_by_account.remove(&auth.account);
                self.indexes
                    .temporary_authority_by_expiration
                    .remove(&(auth.expiration_time, auth.id));
            }
            Object::Proposal(proposal) => {
                self.indexes.proposal_by_expiration.remove(&(proposal.expiration_time, proposal.id));
            }
            Object::Crontab(crontab) => {
                self.indexes.crontab_by_expiration.remove(&(crontab.expiration_time, crontab.id));
            }
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Account, Authority};

    fn new_account(store: &mut Store, name: &str, balance: i64) -> AccountId {
        let account = store
            .create::<Account>(|id| Account {
                id,
                name: name.to_string(),
                active: Authority::default(),
                owner: Authority::default(),
                balances: [(ember_objects::CORE_ASSET, balance)].into_iter().collect(),
            })
            .unwrap();
        account.id
    }

    #[test]
    fn create_assigns_sequential_instances() {
        let mut store = Store::new();
        store.disable_undo();
        let a = new_account(&mut store, "alice", 0);
        let b = new_account(&mut store, "bob", 0);
        assert_eq!(a, AccountId(0));
        assert_eq!(b, AccountId(1));
    }

    #[test]
    fn undo_round_trips_create_modify_remove() {
        let mut store = Store::new();
        store.disable_undo();
        let alice = new_account(&mut store, "alice", 100);
        let bob = new_account(&mut store, "bob", 50);
        store.enable_undo();

        let before = store.snapshot();
        let session = store.start_undo_session();

        store
            .modify::<Account>(alice, |a| a.adjust_balance(ember_objects::CORE_ASSET, -10))
            .unwrap();
        store.remove::<Account>(bob).unwrap();
        new_account(&mut store, "carol", 1);

        store.undo_session(session).unwrap();
        assert_eq!(store.snapshot(), before);
        // The instance counter rolled back too.
        store.disable_undo();
        assert_eq!(new_account(&mut store, "carol", 1), AccountId(2));
    }

    #[test]
    fn merge_folds_deltas_into_parent() {
        let mut store = Store::new();
        store.disable_undo();
        let alice = new_account(&mut store, "alice", 100);
        store.enable_undo();

        let before = store.snapshot();
        let parent = store.start_undo_session();
        let child = store.start_undo_session();
        store
            .modify::<Account>(alice, |a| a.adjust_balance(ember_objects::CORE_ASSET, -40))
            .unwrap();
        store.merge_session(child).unwrap();

        // The child's delta now undoes with the parent.
        store.undo_session(parent).unwrap();
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn committed_layer_pops_at_block_granularity() {
        let mut store = Store::new();
        store.disable_undo();
        let alice = new_account(&mut store, "alice", 100);
        store.enable_undo();

        let before = store.snapshot();
        let session = store.start_undo_session();
        store
            .modify::<Account>(alice, |a| a.adjust_balance(ember_objects::CORE_ASSET, 11))
            .unwrap();
        store.commit_session(session).unwrap();

        assert_ne!(store.snapshot(), before);
        store.pop_undo().unwrap();
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn sessions_are_strictly_lifo() {
        let mut store = Store::new();
        let outer = store.start_undo_session();
        let _inner = store.start_undo_session();
        assert!(matches!(store.undo_session(outer), Err(StorageError::SessionNotOnTop)));
    }

    #[test]
    fn mutation_without_session_fails_when_enabled() {
        let mut store = Store::new();
        let result = store.create::<Account>(|id| Account { id, ..Default::default() });
        assert!(matches!(result, Err(StorageError::NoActiveSession)));
    }
}
