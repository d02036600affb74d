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

use ember_consensus::{
    Chain, ConsensusError, GenesisAccount, GenesisConfig, GenesisWitness, NodeOptions, SkipFlags,
    TransactionPushState,
};
use ember_objects::{
    AccountId, AgreedTask, AgreedTaskKind, Asset, BlockSummaryId, Operation, OperationResult,
    PrivateKey, SignedBlock, SignedTransaction, TimePointSec, TransferOperation, WitnessId,
    CORE_ASSET, GAS_ASSET,
};
use ember_storage::{
    Account, BlockSummary, ChainParameters, Crontab, LinearVestingPolicy, MemBlockStore, Proposal,
    TemporaryAuthority, VestingBalance,
};

use std::sync::Arc;

const GENESIS_TIME: u32 = 1_600_000_000;

fn key(seed: u8) -> PrivateKey {
    PrivateKey::from_seed([seed; 32])
}

/// A chain with three witnesses and three funded user accounts. Two nets
/// built from the same fixture share a genesis, so blocks produced on one
/// are valid on the other.
struct TestNet {
    chain: Chain,
    account_keys: Vec<PrivateKey>,
    witness_keys: Vec<PrivateKey>,
}

const ALICE: AccountId = AccountId(0);
const BOB: AccountId = AccountId(1);
const CAROL: AccountId = AccountId(2);

impl TestNet {
    fn new() -> Self {
        let account_keys: Vec<PrivateKey> = (1u8..=6).map(key).collect();
        let user = |index: usize, name: &str| GenesisAccount {
            name: name.to_string(),
            key: account_keys[index].public_key(),
            core_balance: 1_000,
            gas_balance: 0,
        };
        let producer = |index: usize, name: &str| GenesisAccount {
            name: name.to_string(),
            key: account_keys[index].public_key(),
            core_balance: 0,
            gas_balance: 0,
        };

        let config = GenesisConfig {
            initial_timestamp: TimePointSec::new(GENESIS_TIME),
            parameters: ChainParameters::default(),
            accounts: vec![
                user(0, "alice"),
                user(1, "bob"),
                user(2, "carol"),
                producer(3, "w0"),
                producer(4, "w1"),
                producer(5, "w2"),
            ],
            witnesses: vec![
                GenesisWitness { account_name: "w0".into(), signing_key: account_keys[3].public_key() },
                GenesisWitness { account_name: "w1".into(), signing_key: account_keys[4].public_key() },
                GenesisWitness { account_name: "w2".into(), signing_key: account_keys[5].public_key() },
            ],
        };

        let chain =
            Chain::new(config, Arc::new(MemBlockStore::new()), NodeOptions::default()).unwrap();
        let witness_keys = account_keys[3..6].to_vec();
        Self { chain, account_keys, witness_keys }
    }

    fn witness_key(&self, witness: WitnessId) -> &PrivateKey {
        &self.witness_keys[witness.0 as usize]
    }

    /// Generates a block at `slot` (relative to the current head) without
    /// pushing it.
    fn make_block(&mut self, slot: u32) -> SignedBlock {
        let when = self.chain.get_slot_time(slot).unwrap();
        let witness = self.chain.get_scheduled_witness(slot).unwrap();
        let signing_key = self.witness_key(witness).clone();
        self.chain.generate_block(when, witness, &signing_key, SkipFlags::NOTHING).unwrap()
    }

    fn produce(&mut self, slot: u32) -> SignedBlock {
        let block = self.make_block(slot);
        self.chain.push_block(&block, SkipFlags::NOTHING).unwrap();
        block
    }

    fn transfer_op(from: AccountId, to: AccountId, amount: i64) -> Operation {
        Operation::Transfer(TransferOperation {
            from,
            to,
            amount: Asset::core(amount),
            memo: None,
        })
    }

    /// A signed transfer referencing the current head for TaPoS.
    fn transfer_tx(
        &self,
        signer: usize,
        from: AccountId,
        to: AccountId,
        amount: i64,
        expiration: u32,
    ) -> SignedTransaction {
        let head_num = self.chain.head_block_num().unwrap();
        let head_id = self.chain.head_block_id().unwrap();
        let mut trx = SignedTransaction {
            ref_block_num: (head_num & 0xFFFF) as u16,
            ref_block_prefix: head_id.prefix_word(),
            expiration: TimePointSec::new(expiration),
            operations: vec![Self::transfer_op(from, to, amount)],
            signatures: Vec::new(),
            agreed_task: None,
        };
        trx.sign(&self.account_keys[signer], self.chain.chain_id()).unwrap();
        trx
    }

    fn balance(&self, account: AccountId) -> i64 {
        self.chain.store().get::<Account>(account).unwrap().balance(CORE_ASSET)
    }
}

#[test]
fn s1_linear_push() {
    let mut net = TestNet::new();

    let trx = net.transfer_tx(0, ALICE, BOB, 10, GENESIS_TIME + 30);
    net.chain.push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe).unwrap();

    let block = net.make_block(1);
    let switched = net.chain.push_block(&block, SkipFlags::NOTHING).unwrap();

    assert!(!switched);
    assert_eq!(net.chain.head_block_num().unwrap(), 1);
    assert_eq!(net.chain.head_block_id().unwrap(), block.id().unwrap());
    assert_eq!(net.chain.fetch_block_by_id(&block.id().unwrap()).unwrap(), block);
    assert!(net.chain.is_known_transaction(&trx.id().unwrap()));
    assert_eq!(net.balance(ALICE), 990);
    assert_eq!(net.balance(BOB), 1_010);
}

#[test]
fn s2_expired_transaction_rejected() {
    let mut net = TestNet::new();
    net.produce(1);

    let now = net.chain.head_block_time().unwrap();
    let trx = net.transfer_tx(0, ALICE, BOB, 10, now.secs() - 1);
    let err = net
        .chain
        .push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe)
        .unwrap_err();

    assert!(matches!(err, ConsensusError::TransactionExpired { .. }));
    assert!(!net.chain.is_known_transaction(&trx.id().unwrap()));
}

#[test]
fn s3_fork_switch_happy_path() {
    let mut net = TestNet::new();
    let mut rival = TestNet::new();

    let trx = net.transfer_tx(0, ALICE, BOB, 10, GENESIS_TIME + 120);
    net.chain.push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe).unwrap();
    net.produce(1);
    net.produce(1);

    // The rival builds a longer branch at later slots so its block ids
    // differ from ours.
    let b1 = rival.produce(2);
    let b2 = rival.produce(1);
    let b3 = rival.produce(1);

    assert!(!net.chain.push_block(&b1, SkipFlags::NOTHING).unwrap());
    // Same height as our head: no switch yet.
    assert!(!net.chain.push_block(&b2, SkipFlags::NOTHING).unwrap());
    assert!(net.chain.push_block(&b3, SkipFlags::NOTHING).unwrap());

    assert_eq!(net.chain.head_block_id().unwrap(), b3.id().unwrap());
    assert_eq!(net.chain.head_block_num().unwrap(), 3);
    // The abandoned branch's transfer went back to pending (not applied on
    // the new branch yet).
    assert!(net
        .chain
        .pending_transactions()
        .iter()
        .any(|pending| pending.id().unwrap() == trx.id().unwrap()));
    assert_eq!(net.balance(ALICE), 1_000);
}

#[test]
fn s4_fork_switch_with_bad_block() {
    let mut net = TestNet::new();
    let mut rival = TestNet::new();

    net.produce(1);
    let a2 = net.produce(1);

    let b1 = rival.produce(2);
    let b2 = rival.produce(1);
    let mut b3 = rival.make_block(1);
    // Corrupt the witness signature; the id (a header digest) is unchanged.
    b3.witness_signature.signature[0] ^= 0x01;

    let before = net.chain.store().snapshot();
    assert!(!net.chain.push_block(&b1, SkipFlags::NOTHING).unwrap());
    assert!(!net.chain.push_block(&b2, SkipFlags::NOTHING).unwrap());

    let err = net.chain.push_block(&b3, SkipFlags::NOTHING).unwrap_err();
    assert!(matches!(err, ConsensusError::BadWitnessSignature));

    // The original chain is restored and the bad branch is gone.
    assert_eq!(net.chain.head_block_id().unwrap(), a2.id().unwrap());
    for id in [b1.id().unwrap(), b2.id().unwrap(), b3.id().unwrap()] {
        assert!(!net.chain.fork_database().is_known_block(&id));
    }
    assert_eq!(net.chain.store().snapshot(), before);
}

#[test]
fn s5_crontab_auto_suspend() {
    let mut net = TestNet::new();
    net.produce(1);
    let now = net.chain.head_block_time().unwrap();
    let params = net.chain.chain_parameters().unwrap();

    // The embedded transfer always fails: alice holds 1_000 core.
    let timed = SignedTransaction {
        ref_block_num: 0,
        ref_block_prefix: 0,
        expiration: now.saturating_add(60),
        operations: vec![TestNet::transfer_op(ALICE, BOB, 1_000_000)],
        signatures: Vec::new(),
        agreed_task: None,
    };

    let store = net.chain.store_mut();
    store.disable_undo();
    let crontab = store
        .create::<Crontab>(|id| {
            let mut timed_transaction = timed.clone();
            timed_transaction.agreed_task =
                Some(AgreedTask { kind: AgreedTaskKind::Crontab, id: id.object_id() });
            Crontab {
                id,
                task_owner: ALICE,
                timed_transaction,
                execute_interval: 5,
                scheduled_execute_times: 10,
                already_execute_times: 0,
                last_execute_time: TimePointSec::default(),
                next_execute_time: now,
                expiration_time: now.saturating_add(3_600),
                continuous_failure_times: 0,
                is_suspended: false,
                allow_execution: true,
            }
        })
        .unwrap();
    store.enable_undo();

    let mut last_execution_time = now;
    for _ in 0..3 {
        let trx =
            net.chain.store().get::<Crontab>(crontab.id).unwrap().timed_transaction.clone();
        last_execution_time = net.chain.head_block_time().unwrap();
        net.chain
            .push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe)
            .unwrap();
        let block = net.make_block(1);
        net.chain.push_block(&block, SkipFlags::NOTHING).unwrap();
    }

    let suspended = net.chain.store().get::<Crontab>(crontab.id).unwrap();
    assert!(suspended.is_suspended);
    assert_eq!(suspended.continuous_failure_times, 3);
    assert_eq!(suspended.next_execute_time, TimePointSec::maximum());
    assert_eq!(
        suspended.expiration_time,
        last_execution_time.saturating_add(params.crontab_suspend_expiration)
    );
}

#[test]
fn s6_pop_restores_state() {
    let mut net = TestNet::new();
    let genesis_state = net.chain.store().snapshot();

    let b1 = net.produce(1);
    let after_b1 = net.chain.store().snapshot();
    let b2 = net.produce(1);

    net.chain.pop_block().unwrap();
    assert_eq!(net.chain.head_block_num().unwrap(), 1);
    assert_eq!(net.chain.store().snapshot(), after_b1);

    net.chain.pop_block().unwrap();
    assert_eq!(net.chain.head_block_num().unwrap(), 0);
    assert_eq!(net.chain.store().snapshot(), genesis_state);

    // Re-pushing the same blocks reproduces the same state.
    net.chain.push_block(&b1, SkipFlags::NOTHING).unwrap();
    net.chain.push_block(&b2, SkipFlags::NOTHING).unwrap();
    assert_eq!(net.chain.head_block_id().unwrap(), b2.id().unwrap());
}

#[test]
fn tapos_binds_transactions_to_chain_history() {
    let mut net = TestNet::new();
    let b1 = net.produce(1);
    let now = net.chain.head_block_time().unwrap();

    // The ring slot for block 1 now holds its id.
    let summary = net.chain.store().get::<BlockSummary>(BlockSummaryId(1)).unwrap();
    assert_eq!(summary.block_id, b1.id().unwrap());

    let good = net.transfer_tx(0, ALICE, BOB, 10, now.secs() + 30);
    assert_eq!(good.ref_block_prefix, b1.id().unwrap().prefix_word());
    net.chain.push_transaction(&good, SkipFlags::NOTHING, TransactionPushState::FromMe).unwrap();

    // A transaction bound to a different history is rejected.
    let mut bad = SignedTransaction {
        ref_block_num: 1,
        ref_block_prefix: b1.id().unwrap().prefix_word() ^ 1,
        expiration: TimePointSec::new(now.secs() + 30),
        operations: vec![TestNet::transfer_op(ALICE, CAROL, 10)],
        signatures: Vec::new(),
        agreed_task: None,
    };
    bad.sign(&net.account_keys[0], net.chain.chain_id()).unwrap();
    let err = net
        .chain
        .push_transaction(&bad, SkipFlags::NOTHING, TransactionPushState::FromMe)
        .unwrap_err();
    assert!(matches!(err, ConsensusError::TaposMismatch));
}

#[test]
fn duplicate_transaction_rejected() {
    let mut net = TestNet::new();
    net.produce(1);
    let now = net.chain.head_block_time().unwrap();

    let trx = net.transfer_tx(0, ALICE, BOB, 10, now.secs() + 30);
    net.chain.push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe).unwrap();
    let err = net
        .chain
        .push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe)
        .unwrap_err();

    assert!(matches!(err, ConsensusError::DuplicateTransaction(_)));
    assert!(net.chain.store().find_transaction_by_id(&trx.id().unwrap()).is_some());
}

#[test]
fn auto_gas_fires_once_per_sender() {
    let mut net = TestNet::new();
    net.produce(1);
    let now = net.chain.head_block_time().unwrap();

    let store = net.chain.store_mut();
    store.disable_undo();
    store
        .create::<VestingBalance>(|id| VestingBalance {
            id,
            owner: ALICE,
            balance: Asset::new(500_000, GAS_ASSET),
            policy: LinearVestingPolicy {
                begin_timestamp: TimePointSec::new(GENESIS_TIME),
                vesting_cliff_seconds: 0,
                vesting_duration_seconds: 0,
                begin_balance: 500_000,
            },
        })
        .unwrap();
    store.enable_undo();

    // Two transfers from the same sender: auto-gas fires after the first
    // only.
    let mut trx = SignedTransaction {
        ref_block_num: 1,
        ref_block_prefix: net.chain.head_block_id().unwrap().prefix_word(),
        expiration: TimePointSec::new(now.secs() + 30),
        operations: vec![
            TestNet::transfer_op(ALICE, BOB, 10),
            TestNet::transfer_op(ALICE, CAROL, 10),
        ],
        signatures: Vec::new(),
        agreed_task: None,
    };
    trx.sign(&net.account_keys[0], net.chain.chain_id()).unwrap();

    let processed = net
        .chain
        .push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe)
        .unwrap();

    assert_eq!(processed.operation_results.len(), 3);
    assert_eq!(
        net.chain.store().get::<Account>(ALICE).unwrap().balance(GAS_ASSET),
        500_000
    );
    let drained = net.chain.store().vesting_balances_of(ALICE);
    let vesting = net.chain.store().find::<VestingBalance>(drained[0]).unwrap();
    assert_eq!(vesting.balance.amount, 0);
}

#[test]
fn generation_omits_invalid_transactions() {
    let mut net = TestNet::new();
    net.produce(1);
    let now = net.chain.head_block_time().unwrap();

    let good = net.transfer_tx(0, ALICE, BOB, 10, now.secs() + 30);
    net.chain.push_transaction(&good, SkipFlags::NOTHING, TransactionPushState::FromMe).unwrap();

    // Force an unapplied, insolvent transaction into the queue; production
    // re-validates and must drop it.
    let bad = net.transfer_tx(1, BOB, CAROL, 1_000_000, now.secs() + 30);
    net.chain.push_transaction(&bad, SkipFlags::NOTHING, TransactionPushState::RePush).unwrap();
    assert_eq!(net.chain.pending_transactions().len(), 2);

    let block = net.make_block(1);
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(block.transactions[0].1.id().unwrap(), good.id().unwrap());
}

#[test]
fn apply_block_is_deterministic() {
    let mut net = TestNet::new();
    let mut peer = TestNet::new();

    let trx = net.transfer_tx(0, ALICE, BOB, 25, GENESIS_TIME + 60);
    net.chain.push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe).unwrap();
    let block = net.make_block(1);

    net.chain.push_block(&block, SkipFlags::NOTHING).unwrap();
    peer.chain.push_block(&block, SkipFlags::NOTHING).unwrap();

    assert_eq!(net.chain.store().snapshot(), peer.chain.store().snapshot());
}

#[test]
fn proposal_agreed_task_runs_once() {
    let mut net = TestNet::new();
    net.produce(1);
    let now = net.chain.head_block_time().unwrap();

    let embedded = SignedTransaction {
        ref_block_num: 0,
        ref_block_prefix: 0,
        expiration: now.saturating_add(3_600),
        operations: vec![TestNet::transfer_op(ALICE, BOB, 40)],
        signatures: Vec::new(),
        agreed_task: None,
    };

    let store = net.chain.store_mut();
    store.disable_undo();
    let proposal = store
        .create::<Proposal>(|id| {
            let mut proposed_transaction = embedded.clone();
            proposed_transaction.agreed_task =
                Some(AgreedTask { kind: AgreedTaskKind::Proposal, id: id.object_id() });
            Proposal {
                id,
                proposed_transaction,
                expiration_time: now,
                allow_execution: true,
            }
        })
        .unwrap();
    store.enable_undo();

    let trx = net
        .chain
        .store()
        .get::<Proposal>(proposal.id)
        .unwrap()
        .proposed_transaction
        .clone();
    let processed = net
        .chain
        .push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe)
        .unwrap();
    assert_eq!(processed.operation_results, vec![OperationResult::Void]);
    assert_eq!(net.balance(BOB), 1_040);

    // The task cannot be admitted a second time.
    let err = net
        .chain
        .push_transaction(
            &trx,
            SkipFlags::TRANSACTION_DUPE_CHECK,
            TransactionPushState::FromMe,
        )
        .unwrap_err();
    assert!(matches!(err, ConsensusError::AgreedTaskNotExecutable(_)));
}

#[test]
fn temporary_authority_extends_active_until_swept() {
    let mut net = TestNet::new();
    net.produce(1);
    let now = net.chain.head_block_time().unwrap();
    let temp_key = key(9);

    let store = net.chain.store_mut();
    store.disable_undo();
    store
        .create::<TemporaryAuthority>(|id| TemporaryAuthority {
            id,
            account: ALICE,
            temporary_active: [(temp_key.public_key(), 1)].into_iter().collect(),
            expiration_time: now.saturating_add(60),
        })
        .unwrap();
    store.enable_undo();

    // A transfer signed only by the temporary key satisfies alice's active
    // authority.
    let mut trx = SignedTransaction {
        ref_block_num: 1,
        ref_block_prefix: net.chain.head_block_id().unwrap().prefix_word(),
        expiration: TimePointSec::new(now.secs() + 30),
        operations: vec![TestNet::transfer_op(ALICE, BOB, 5)],
        signatures: Vec::new(),
        agreed_task: None,
    };
    trx.sign(&temp_key, net.chain.chain_id()).unwrap();
    net.chain.push_transaction(&trx, SkipFlags::NOTHING, TransactionPushState::FromMe).unwrap();

    // Jump far past the grant's expiration; the sweep removes it.
    net.produce(30);
    assert!(net.chain.store().temporary_authority_of(ALICE).is_none());

    let later = net.chain.head_block_time().unwrap();
    let mut stale = SignedTransaction {
        ref_block_num: (net.chain.head_block_num().unwrap() & 0xFFFF) as u16,
        ref_block_prefix: net.chain.head_block_id().unwrap().prefix_word(),
        expiration: TimePointSec::new(later.secs() + 30),
        operations: vec![TestNet::transfer_op(ALICE, BOB, 5)],
        signatures: Vec::new(),
        agreed_task: None,
    };
    stale.sign(&temp_key, net.chain.chain_id()).unwrap();
    let err = net
        .chain
        .push_transaction(&stale, SkipFlags::NOTHING, TransactionPushState::FromMe)
        .unwrap_err();
    assert!(matches!(err, ConsensusError::MissingActiveAuthority(_)));
}
