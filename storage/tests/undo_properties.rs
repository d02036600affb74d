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
    hash_bytes, AccountId, Asset, ProcessedTransaction, SignedTransaction, TimePointSec,
    CORE_ASSET, GAS_ASSET,
};
use ember_storage::{
    Account, Authority, LinearVestingPolicy, Store, TransactionObject, VestingBalance,
};

fn seeded_store() -> Store {
    let mut store = Store::new();
    store.disable_undo();
    for (name, balance) in [("alice", 100), ("bob", 250)] {
        store
            .create::<Account>(|id| Account {
                id,
                name: name.to_string(),
                active: Authority::default(),
                owner: Authority::default(),
                balances: [(CORE_ASSET, balance)].into_iter().collect(),
            })
            .unwrap();
    }
    store.enable_undo();
    store
}

fn record_transaction(store: &mut Store, nonce: u32, expiration: u32) -> TransactionObject {
    let trx = SignedTransaction {
        ref_block_num: nonce as u16,
        ref_block_prefix: nonce,
        expiration: TimePointSec::new(expiration),
        ..Default::default()
    };
    let trx_id = hash_bytes(&nonce.to_le_bytes());
    let trx_hash = hash_bytes(&nonce.to_be_bytes());
    store
        .create::<TransactionObject>(|id| TransactionObject {
            id,
            trx_id,
            trx_hash,
            trx: ProcessedTransaction::new(trx),
        })
        .unwrap()
}

/// Mixed creates, modifies and removes across object kinds.
fn mutate(store: &mut Store) {
    store
        .modify::<Account>(AccountId(0), |account| account.adjust_balance(CORE_ASSET, -30))
        .unwrap();
    store.remove::<Account>(AccountId(1)).unwrap();
    record_transaction(store, 7, 1_000);
    store
        .create::<VestingBalance>(|id| VestingBalance {
            id,
            owner: AccountId(0),
            balance: Asset::new(500, GAS_ASSET),
            policy: LinearVestingPolicy::default(),
        })
        .unwrap();
}

#[test]
fn undo_restores_objects_and_indexes() {
    let mut store = seeded_store();
    let before = store.snapshot();

    let session = store.start_undo_session();
    let record = record_transaction(&mut store, 1, 500);
    assert!(store.is_known_transaction(&record.trx_id));

    store.undo_session(session).unwrap();
    assert_eq!(store.snapshot(), before);
    // Secondary indexes rolled back with the objects.
    assert!(!store.is_known_transaction(&record.trx_id));
    assert!(store.find_transaction_by_hash(&record.trx_hash).is_none());
    assert!(store.transactions_expiring_before(TimePointSec::maximum()).is_empty());
}

#[test]
fn undo_round_trips_arbitrary_mutation_mix() {
    let mut store = seeded_store();
    let before = store.snapshot();

    let session = store.start_undo_session();
    mutate(&mut store);
    store.undo_session(session).unwrap();

    assert_eq!(store.snapshot(), before);
    assert!(store.vesting_balances_of(AccountId(0)).is_empty());
}

#[test]
fn merge_is_equivalent_to_applying_in_parent() {
    // Apply in a child session, merge up, commit the parent...
    let mut merged = seeded_store();
    let parent = merged.start_undo_session();
    let child = merged.start_undo_session();
    mutate(&mut merged);
    merged.merge_session(child).unwrap();
    merged.commit_session(parent).unwrap();

    // ...versus applying directly in the parent.
    let mut direct = seeded_store();
    let parent = direct.start_undo_session();
    mutate(&mut direct);
    direct.commit_session(parent).unwrap();

    assert_eq!(merged.snapshot(), direct.snapshot());

    // Both committed layers revert to the same seed state.
    merged.pop_undo().unwrap();
    direct.pop_undo().unwrap();
    assert_eq!(merged.snapshot(), direct.snapshot());
}

#[test]
fn merged_removal_of_child_created_object_annihilates() {
    let mut store = seeded_store();
    let before = store.snapshot();

    let parent = store.start_undo_session();
    let child = store.start_undo_session();
    let record = record_transaction(&mut store, 9, 900);
    store.remove::<TransactionObject>(record.id).unwrap();
    store.merge_session(child).unwrap();
    store.undo_session(parent).unwrap();

    assert_eq!(store.snapshot(), before);
}
