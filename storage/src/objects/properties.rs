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
    BlockId, DynamicGlobalPropertyId, GlobalPropertyId, TimePointSec, WitnessId,
};

use serde::{Deserialize, Serialize};

/// Governance-controlled consensus parameters, stored in the global property
/// object so that parameter changes flow through the same undo machinery as
/// every other mutation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChainParameters {
    /// Seconds between production slots.
    pub block_interval: u8,
    /// Seconds between maintenance intervals.
    pub maintenance_interval: u32,
    pub maximum_block_size: u32,
    pub maximum_time_until_expiration: u32,
    pub max_authority_depth: u8,
    /// Consecutive error results after which a crontab is suspended.
    pub crontab_suspend_threshold: u32,
    /// Seconds a suspended crontab lingers before it is swept.
    pub crontab_suspend_expiration: u32,
    /// Upper bound, in seconds, on the expiration slack granted to agreed
    /// tasks when a crontab execution is rescheduled.
    pub assigned_task_life_cycle: u32,
}

impl Default for ChainParameters {
    fn default() -> Self {
        Self {
            block_interval: 5,
            maintenance_interval: 86_400,
            maximum_block_size: 2_000_000,
            maximum_time_until_expiration: 86_400,
            max_authority_depth: 2,
            crontab_suspend_threshold: 3,
            crontab_suspend_expiration: 3 * 86_400,
            assigned_task_life_cycle: 7_200,
        }
    }
}

/// Chain-wide slow-moving state: parameters and the witness sets.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GlobalProperty {
    pub id: GlobalPropertyId,
    pub parameters: ChainParameters,
    pub active_witnesses: Vec<WitnessId>,
    /// Witness production order for the current round, reshuffled once per
    /// round by `update_witness_schedule`.
    pub current_shuffled_witnesses: Vec<WitnessId>,
}

/// Fast-moving per-block state.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DynamicGlobalProperty {
    pub id: DynamicGlobalPropertyId,
    pub head_block_number: u32,
    pub head_block_id: BlockId,
    pub time: TimePointSec,
    pub current_witness: WitnessId,
    pub next_maintenance_time: TimePointSec,
    /// Absolute slot number of the head block since genesis.
    pub current_aslot: u64,
    pub recently_missed_count: u32,
    pub last_irreversible_block_num: u32,
    pub maintenance_flag: bool,
}
