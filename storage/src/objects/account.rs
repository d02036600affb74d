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

use crate::objects::Authority;

use ember_objects::{AccountId, AssetId};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub active: Authority,
    pub owner: Authority,
    pub balances: BTreeMap<AssetId, i64>,
}

impl Account {
    pub fn balance(&self, asset_id: AssetId) -> i64 {
        self.balances.get(&asset_id).copied().unwrap_or(0)
    }

    pub fn adjust_balance(&mut self, asset_id: AssetId, delta: i64) {
        *self.balances.entry(asset_id).or_insert(0) += delta;
    }
}
