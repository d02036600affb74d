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

use ember_objects::{AccountId, Asset, TimePointSec, VestingBalanceId};

use serde::{Deserialize, Serialize};

/// Linear release schedule: nothing before the cliff, then proportional to
/// elapsed time until the full begin balance has vested.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LinearVestingPolicy {
    pub begin_timestamp: TimePointSec,
    pub vesting_cliff_seconds: u32,
    pub vesting_duration_seconds: u32,
    pub begin_balance: i64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VestingBalance {
    pub id: VestingBalanceId,
    pub owner: AccountId,
    pub balance: Asset,
    pub policy: LinearVestingPolicy,
}

impl VestingBalance {
    /// The amount withdrawable at `now` under the linear policy, bounded by
    /// the remaining balance.
    pub fn allowed_withdraw(&self, now: TimePointSec) -> Asset {
        let policy = &self.policy;
        let cliff = policy.begin_timestamp.saturating_add(policy.vesting_cliff_seconds);
        if now < cliff || policy.begin_balance <= 0 {
            return Asset::new(0, self.balance.asset_id);
        }

        let elapsed = now.saturating_sub(policy.begin_timestamp) as i64;
        let vested = if policy.vesting_duration_seconds == 0
            || elapsed >= policy.vesting_duration_seconds as i64
        {
            policy.begin_balance
        } else {
            policy.begin_balance * elapsed / policy.vesting_duration_seconds as i64
        };

        let withdrawn = policy.begin_balance - self.balance.amount;
        let allowed = (vested - withdrawn).clamp(0, self.balance.amount);
        Asset::new(allowed, self.balance.asset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_objects::GAS_ASSET;

    fn vesting(begin: u32, cliff: u32, duration: u32, begin_balance: i64) -> VestingBalance {
        VestingBalance {
            id: VestingBalanceId(1),
            owner: AccountId(1),
            balance: Asset::new(begin_balance, GAS_ASSET),
            policy: LinearVestingPolicy {
                begin_timestamp: TimePointSec::new(begin),
                vesting_cliff_seconds: cliff,
                vesting_duration_seconds: duration,
                begin_balance,
            },
        }
    }

    #[test]
    fn nothing_vests_before_the_cliff() {
        let vb = vesting(100, 50, 200, 1000);
        assert_eq!(vb.allowed_withdraw(TimePointSec::new(149)).amount, 0);
    }

    #[test]
    fn vesting_is_proportional_after_the_cliff() {
        let vb = vesting(100, 0, 200, 1000);
        assert_eq!(vb.allowed_withdraw(TimePointSec::new(200)).amount, 500);
        assert_eq!(vb.allowed_withdraw(TimePointSec::new(300)).amount, 1000);
        assert_eq!(vb.allowed_withdraw(TimePointSec::new(400)).amount, 1000);
    }

    #[test]
    fn allowed_accounts_for_prior_withdrawals() {
        let mut vb = vesting(100, 0, 200, 1000);
        vb.balance.amount = 700; // 300 already withdrawn
        assert_eq!(vb.allowed_withdraw(TimePointSec::new(200)).amount, 200);
    }
}
