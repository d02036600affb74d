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

//! Per-block bookkeeping: slot math, dynamic state updates, irreversibility,
//! the witness schedule and the expiration sweeps. Everything here runs
//! inside the block's undo session.

use super::Chain;
use crate::error::ConsensusError;

use ember_objects::{
    BlockSummaryId, DynamicGlobalPropertyId, GlobalPropertyId, SignedBlock, TimePointSec,
    WitnessId,
};
use ember_storage::{
    BlockSummary, Crontab, DynamicGlobalProperty, GlobalProperty, Proposal, TemporaryAuthority,
    TransactionObject, Witness,
};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::debug;

impl Chain {
    // ------------------------------------------------------------------
    // Witness slot math
    // ------------------------------------------------------------------

    /// The opening time of the given future slot; slot 0 is never a valid
    /// production time.
    pub fn get_slot_time(&self, slot_num: u32) -> Result<TimePointSec, ConsensusError> {
        if slot_num == 0 {
            return Ok(TimePointSec::default());
        }
        let interval = self.block_interval()? as u32;
        let dgp = self.dynamic_global_property()?;
        if dgp.head_block_number == 0 {
            // On an empty chain the first slot opens one interval after the
            // genesis timestamp.
            return Ok(dgp.time.saturating_add(slot_num * interval));
        }
        let head_slot_time = TimePointSec::new(dgp.time.secs() / interval * interval);
        Ok(head_slot_time.saturating_add(slot_num * interval))
    }

    /// The slot containing `when`, counted from the head block; 0 when the
    /// time precedes the first open slot.
    pub fn get_slot_at_time(&self, when: TimePointSec) -> Result<u32, ConsensusError> {
        let first_slot_time = self.get_slot_time(1)?;
        if when < first_slot_time {
            return Ok(0);
        }
        let interval = self.block_interval()? as u32;
        Ok((when.secs() - first_slot_time.secs()) / interval + 1)
    }

    /// The witness scheduled to produce in the given future slot.
    pub fn get_scheduled_witness(&self, slot_num: u32) -> Result<WitnessId, ConsensusError> {
        let dgp = self.dynamic_global_property()?;
        let gpo = self.global_property()?;
        let witnesses = &gpo.current_shuffled_witnesses;
        if witnesses.is_empty() {
            return Err(ConsensusError::InternalInvariant("empty witness schedule".into()));
        }
        let current_aslot = dgp.current_aslot + slot_num as u64;
        Ok(witnesses[(current_aslot % witnesses.len() as u64) as usize])
    }

    // ------------------------------------------------------------------
    // Post-apply updates
    // ------------------------------------------------------------------

    pub(crate) fn update_global_dynamic_data(
        &mut self,
        block: &SignedBlock,
    ) -> Result<(), ConsensusError> {
        let block_num = block.block_num();
        let block_id = block.id()?;
        let slot_num = self.get_slot_at_time(block.header.timestamp)?;
        if slot_num == 0 {
            return Err(ConsensusError::InternalInvariant(
                "applied block timestamp precedes the first open slot".into(),
            ));
        }

        // Attribute skipped slots to the witnesses that missed them, against
        // the schedule as it stood before this block.
        let missed = slot_num - 1;
        for slot in 1..slot_num {
            let scheduled = self.get_scheduled_witness(slot)?;
            if scheduled != block.header.witness {
                self.store.modify::<Witness>(scheduled, |witness| witness.total_missed += 1)?;
            }
        }

        self.store.modify::<DynamicGlobalProperty>(DynamicGlobalPropertyId(0), |dgp| {
            dgp.head_block_number = block_num;
            dgp.head_block_id = block_id;
            dgp.time = block.header.timestamp;
            dgp.current_witness = block.header.witness;
            dgp.current_aslot += slot_num as u64;
            if missed > 0 {
                dgp.recently_missed_count += missed;
            } else {
                dgp.recently_missed_count = dgp.recently_missed_count.saturating_sub(1);
            }
        })?;
        Ok(())
    }

    pub(crate) fn update_signing_witness(
        &mut self,
        witness_id: WitnessId,
        block: &SignedBlock,
    ) -> Result<(), ConsensusError> {
        let current_aslot = self.dynamic_global_property()?.current_aslot;
        let block_num = block.block_num();
        self.store.modify::<Witness>(witness_id, |witness| {
            witness.last_aslot = current_aslot;
            witness.last_confirmed_block_num = block_num;
        })?;
        Ok(())
    }

    /// A block is irreversible once two thirds of the active witnesses have
    /// confirmed a block at or past it.
    pub(crate) fn update_last_irreversible_block(&mut self) -> Result<(), ConsensusError> {
        let active = self.global_property()?.active_witnesses.clone();
        if active.is_empty() {
            return Ok(());
        }

        let mut confirmations = Vec::with_capacity(active.len());
        for witness_id in &active {
            confirmations.push(self.store.get::<Witness>(*witness_id)?.last_confirmed_block_num);
        }
        confirmations.sort_unstable();
        let new_lib = confirmations[(confirmations.len() - 1) / 3];

        if new_lib > self.dynamic_global_property()?.last_irreversible_block_num {
            self.store.modify::<DynamicGlobalProperty>(DynamicGlobalPropertyId(0), |dgp| {
                dgp.last_irreversible_block_num = new_lib;
            })?;
        }
        Ok(())
    }

    pub(crate) fn create_block_summary(&mut self, block: &SignedBlock) -> Result<(), ConsensusError> {
        let slot = BlockSummaryId((block.block_num() & 0xFFFF) as u64);
        let block_id = block.id()?;
        self.store.modify::<BlockSummary>(slot, |summary| summary.block_id = block_id)?;
        Ok(())
    }

    pub(crate) fn update_maintenance_flag(
        &mut self,
        maintenance_performed: bool,
    ) -> Result<(), ConsensusError> {
        self.store.modify::<DynamicGlobalProperty>(DynamicGlobalPropertyId(0), |dgp| {
            dgp.maintenance_flag = maintenance_performed;
        })?;
        Ok(())
    }

    /// Reshuffles the production order once per round, seeded by the head
    /// block id so every node derives the same order.
    pub(crate) fn update_witness_schedule(&mut self) -> Result<(), ConsensusError> {
        let dgp = self.dynamic_global_property()?;
        let head_block_number = dgp.head_block_number;
        let seed = dgp.head_block_id.0 .0;
        let active = self.global_property()?.active_witnesses.clone();
        if active.is_empty() || head_block_number % active.len() as u32 != 0 {
            return Ok(());
        }

        let mut shuffled = active;
        let mut rng = StdRng::from_seed(seed);
        shuffled.shuffle(&mut rng);
        self.store.modify::<GlobalProperty>(GlobalPropertyId(0), |gpo| {
            gpo.current_shuffled_witnesses = shuffled;
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expiration sweeps
    // ------------------------------------------------------------------

    pub(crate) fn clear_expired_transactions(&mut self) -> Result<(), ConsensusError> {
        let now = self.head_block_time()?;
        for id in self.store.transactions_expiring_before(now) {
            self.store.remove::<TransactionObject>(id)?;
        }
        Ok(())
    }

    /// Sweeps proposals that already executed, plus any that outlived their
    /// execution window without running.
    pub(crate) fn clear_expired_proposals(&mut self) -> Result<(), ConsensusError> {
        let now = self.head_block_time()?;
        for id in self.store.proposals_expiring_before(now) {
            let proposal = self.store.get::<Proposal>(id)?;
            if !proposal.allow_execution {
                self.store.remove::<Proposal>(id)?;
                debug!("removed executed proposal {id}");
            }
        }

        let life_cycle = self.chain_parameters()?.assigned_task_life_cycle;
        let stale_cutoff = TimePointSec::new(now.secs().saturating_sub(life_cycle));
        for id in self.store.proposals_expiring_before(stale_cutoff) {
            if self.store.find::<Proposal>(id).is_some() {
                self.store.remove::<Proposal>(id)?;
                debug!("removed stale proposal {id}");
            }
        }
        Ok(())
    }

    /// Sweeps crontabs whose lifetime ended: completed schedules and
    /// suspended tasks whose grace period ran out.
    pub(crate) fn clear_expired_timed_tasks(&mut self) -> Result<(), ConsensusError> {
        let now = self.head_block_time()?;
        for id in self.store.crontabs_expiring_before(now) {
            self.store.remove::<Crontab>(id)?;
            debug!("removed expired crontab {id}");
        }
        Ok(())
    }

    pub(crate) fn clear_expired_temporary_authorities(&mut self) -> Result<(), ConsensusError> {
        let now = self.head_block_time()?;
        for id in self.store.temporary_authorities_expiring_before(now) {
            self.store.remove::<TemporaryAuthority>(id)?;
        }
        Ok(())
    }
}
