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

use ember_objects::{AccountId, CrontabId, SignedTransaction, TimePointSec};

use serde::{Deserialize, Serialize};

/// A scheduled, recurring on-chain task: a pre-approved transaction executed
/// every `execute_interval` seconds up to `scheduled_execute_times` times.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Crontab {
    pub id: CrontabId,
    pub task_owner: AccountId,
    pub timed_transaction: SignedTransaction,
    pub execute_interval: u32,
    pub scheduled_execute_times: u64,
    pub already_execute_times: u64,
    pub last_execute_time: TimePointSec,
    pub next_execute_time: TimePointSec,
    pub expiration_time: TimePointSec,
    /// Consecutive executions that produced an error result. Reaching the
    /// configured threshold suspends the task.
    pub continuous_failure_times: u32,
    pub is_suspended: bool,
    pub allow_execution: bool,
}

impl Crontab {
    /// Whether the task may be admitted for execution at `now`.
    pub fn is_executable(&self, now: TimePointSec) -> bool {
        self.allow_execution && !self.is_suspended && self.next_execute_time <= now
    }

    pub fn is_finished(&self) -> bool {
        self.already_execute_times >= self.scheduled_execute_times
    }
}
