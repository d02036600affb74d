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

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct AssetId(pub u64);

/// The core chain asset.
pub const CORE_ASSET: AssetId = AssetId(0);

/// The gas asset, withdrawn automatically from vesting balances to fund
/// transfers and contract calls.
pub const GAS_ASSET: AssetId = AssetId(1);

/// A signed amount of a single asset.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub amount: i64,
    pub asset_id: AssetId,
}

impl Asset {
    pub const fn new(amount: i64, asset_id: AssetId) -> Self {
        Self { amount, asset_id }
    }

    pub const fn core(amount: i64) -> Self {
        Self::new(amount, CORE_ASSET)
    }

    pub const fn is_negative(&self) -> bool {
        self.amount < 0
    }
}

impl Display for Asset {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} of asset {}", self.amount, self.asset_id.0)
    }
}
