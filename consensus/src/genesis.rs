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
    hash_bytes, AccountId, Digest, PublicKey, TimePointSec, CORE_ASSET, GAS_ASSET,
};
use ember_storage::{
    Account, Authority, BlockSummary, ChainParameters, DynamicGlobalProperty, GlobalProperty,
    Store, Witness, BLOCK_SUMMARY_SLOTS,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub name: String,
    pub key: PublicKey,
    pub core_balance: i64,
    pub gas_balance: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisWitness {
    pub account_name: String,
    pub signing_key: PublicKey,
}

/// Everything needed to bring up a fresh chain state. The digest of this
/// config is the chain id, domain-separating all signatures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub initial_timestamp: TimePointSec,
    pub parameters: ChainParameters,
    pub accounts: Vec<GenesisAccount>,
    pub witnesses: Vec<GenesisWitness>,
}

impl GenesisConfig {
    pub fn chain_id(&self) -> Result<Digest, ConsensusError> {
        let bytes = bincode::serialize(self)
            .map_err(|e| ConsensusError::InternalInvariant(format!("genesis encoding: {e}")))?;
        Ok(hash_bytes(&bytes))
    }
}

/// Populates an empty store from the genesis config. Runs with undo capture
/// disabled; genesis state is the floor every undo bottoms out on.
pub(crate) fn apply_genesis(store: &mut Store, config: &GenesisConfig) -> Result<(), ConsensusError> {
    store.disable_undo();
    let result = initialize(store, config);
    store.enable_undo();
    result
}

fn initialize(store: &mut Store, config: &GenesisConfig) -> Result<(), ConsensusError> {
    let mut accounts_by_name: HashMap<&str, AccountId> = HashMap::new();
    for genesis_account in &config.accounts {
        let account = store.create::<Account>(|id| Account {
            id,
            name: genesis_account.name.clone(),
            active: Authority::single_key(genesis_account.key),
            owner: Authority::single_key(genesis_account.key),
            balances: [
                (CORE_ASSET, genesis_account.core_balance),
                (GAS_ASSET, genesis_account.gas_balance),
            ]
            .into_iter()
            .filter(|(_, amount)| *amount != 0)
            .collect(),
        })?;
        accounts_by_name.insert(genesis_account.name.as_str(), account.id);
    }

    let mut active_witnesses = Vec::with_capacity(config.witnesses.len());
    for genesis_witness in &config.witnesses {
        let account_id = *accounts_by_name
            .get(genesis_witness.account_name.as_str())
            .ok_or_else(|| {
                ConsensusError::InternalInvariant(format!(
                    "genesis witness references unknown account {}",
                    genesis_witness.account_name
                ))
            })?;
        let witness = store.create::<Witness>(|id| Witness {
            id,
            witness_account: account_id,
            signing_key: genesis_witness.signing_key,
            last_aslot: 0,
            last_confirmed_block_num: 0,
            total_missed: 0,
        })?;
        active_witnesses.push(witness.id);
    }

    store.create::<GlobalProperty>(|id| GlobalProperty {
        id,
        parameters: config.parameters.clone(),
        active_witnesses: active_witnesses.clone(),
        current_shuffled_witnesses: active_witnesses.clone(),
    })?;

    store.create::<DynamicGlobalProperty>(|id| DynamicGlobalProperty {
        id,
        head_block_number: 0,
        head_block_id: Default::default(),
        time: config.initial_timestamp,
        current_witness: Default::default(),
        next_maintenance_time: config
            .initial_timestamp
            .saturating_add(config.parameters.maintenance_interval),
        current_aslot: 0,
        recently_missed_count: 0,
        last_irreversible_block_num: 0,
        maintenance_flag: false,
    })?;

    for _ in 0..BLOCK_SUMMARY_SLOTS {
        store.create::<BlockSummary>(|id| BlockSummary { id, block_id: Default::default() })?;
    }

    Ok(())
}
