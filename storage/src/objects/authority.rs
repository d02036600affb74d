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

use ember_objects::{AccountId, PublicKey};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A weighted-threshold authority over keys and delegated accounts.
///
/// The authority is satisfied when the summed weights of provided keys plus
/// recursively satisfied delegate accounts reach `threshold`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Authority {
    pub threshold: u32,
    pub key_auths: BTreeMap<PublicKey, u32>,
    pub account_auths: BTreeMap<AccountId, u32>,
}

impl Authority {
    /// A single-key authority with threshold 1.
    pub fn single_key(key: PublicKey) -> Self {
        let mut key_auths = BTreeMap::new();
        key_auths.insert(key, 1);
        Self { threshold: 1, key_auths, account_auths: BTreeMap::new() }
    }

    /// The weight the given key set contributes directly, before delegation.
    pub fn key_weight(&self, keys: &[PublicKey]) -> u32 {
        self.key_auths
            .iter()
            .filter(|(key, _)| keys.contains(key))
            .map(|(_, weight)| *weight)
            .sum()
    }
}
