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

use ember_objects::{BlockId, BlockSummaryId};

use serde::{Deserialize, Serialize};

/// One slot of the 65536-entry block id ring referenced by TaPoS checks.
/// Slot `n` holds the id of the most recent block whose number satisfies
/// `num & 0xFFFF == n`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub id: BlockSummaryId,
    pub block_id: BlockId,
}

/// The number of block summary ring slots.
pub const BLOCK_SUMMARY_SLOTS: u64 = 0x10000;
