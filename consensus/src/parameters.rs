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

use ember_objects::TimePointSec;

pub use ember_storage::ChainParameters;

/// Percent base for the per-transaction size proportion.
pub const FULL_PROPORTION: u32 = 100;

/// Hardfork activation of automatic gas withdrawal (2020-01-01T00:00:00Z).
pub const AUTO_GAS_HARDFORK_TIME: TimePointSec = TimePointSec::new(1_577_836_800);

/// Minimum vested gas amount worth an automatic withdrawal.
pub const AUTO_GAS_MIN_WITHDRAW: i64 = 100_000;

/// Upper bound on the expiration slack granted to rescheduled crontab
/// transactions, in seconds.
pub const MAX_AGREED_TASK_SLACK: u32 = 7_200;

/// Extension string stamped into the first block of a new chain.
pub const GENESIS_EXTENSION: &str = "ignition";

/// Share of the block interval a single transaction may consume outside
/// block application, in hundredths.
pub const RUNTIME_BUDGET_PERCENT: u64 = 75;

/// Node-local configuration. Only these options affect core correctness;
/// everything else about a node (endpoints, storage paths) lives outside
/// this crate.
#[derive(Clone, Debug)]
pub struct NodeOptions {
    /// Max fraction of `maximum_block_size` a single transaction may occupy,
    /// in hundredths. Out-of-range values fall back to the default.
    pub op_maxsize_proportion_percent: u32,
    /// Maximum pending queue size enforced at from-me push time; 0 disables
    /// the bound. Non-zero values must be at least 3000.
    pub message_cache_size_limit: u16,
    /// When false, authority verification is skipped while producing blocks
    /// and while validating peer transactions.
    pub deduce_in_verification_mode: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            op_maxsize_proportion_percent: 1,
            message_cache_size_limit: 0,
            deduce_in_verification_mode: true,
        }
    }
}
