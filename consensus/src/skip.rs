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

use std::ops::{BitOr, BitOrAssign};

/// Validation steps to bypass during block or transaction application. The
/// bit values are stable; replay tooling persists them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SkipFlags(pub u32);

impl SkipFlags {
    pub const NOTHING: SkipFlags = SkipFlags(0);
    pub const WITNESS_SIGNATURE: SkipFlags = SkipFlags(1 << 0);
    pub const TRANSACTION_SIGNATURES: SkipFlags = SkipFlags(1 << 1);
    pub const TRANSACTION_DUPE_CHECK: SkipFlags = SkipFlags(1 << 2);
    pub const FORK_DB: SkipFlags = SkipFlags(1 << 3);
    pub const BLOCK_SIZE_CHECK: SkipFlags = SkipFlags(1 << 4);
    pub const TAPOS_CHECK: SkipFlags = SkipFlags(1 << 5);
    pub const AUTHORITY_CHECK: SkipFlags = SkipFlags(1 << 6);
    pub const MERKLE_CHECK: SkipFlags = SkipFlags(1 << 7);
    pub const WITNESS_SCHEDULE_CHECK: SkipFlags = SkipFlags(1 << 8);
    pub const VALIDATE: SkipFlags = SkipFlags(1 << 9);
    /// Everything; reserved for replay beneath the highest checkpoint.
    pub const ALL: SkipFlags = SkipFlags(!0);

    /// The override applied to system fee-share transactions.
    pub const FEE_SHARE: SkipFlags =
        SkipFlags(Self::TRANSACTION_SIGNATURES.0 | Self::TAPOS_CHECK.0);

    pub const fn contains(&self, other: SkipFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(&self, other: SkipFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for SkipFlags {
    type Output = SkipFlags;

    fn bitor(self, rhs: SkipFlags) -> SkipFlags {
        SkipFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SkipFlags {
    fn bitor_assign(&mut self, rhs: SkipFlags) {
        self.0 |= rhs.0;
    }
}
