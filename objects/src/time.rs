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
use std::{
    fmt::{self, Display, Formatter},
    ops::{Add, Sub},
};

/// Second-granularity chain time. All consensus time flows in from block
/// timestamps and caller-provided production times; the core never reads the
/// wall clock.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub struct TimePointSec(pub u32);

impl TimePointSec {
    pub const fn new(seconds: u32) -> Self {
        Self(seconds)
    }

    /// The largest representable time, used to park suspended crontabs.
    pub const fn maximum() -> Self {
        Self(u32::MAX)
    }

    pub const fn secs(&self) -> u32 {
        self.0
    }

    pub fn saturating_add(self, seconds: u32) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    pub fn saturating_sub(self, other: Self) -> u32 {
        self.0.saturating_sub(other.0)
    }
}

impl Add<u32> for TimePointSec {
    type Output = TimePointSec;

    fn add(self, seconds: u32) -> Self::Output {
        TimePointSec(self.0 + seconds)
    }
}

impl Sub<TimePointSec> for TimePointSec {
    type Output = u32;

    fn sub(self, other: TimePointSec) -> Self::Output {
        self.0 - other.0
    }
}

impl Display for TimePointSec {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
