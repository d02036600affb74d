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

use ember_objects::{ProposalId, SignedTransaction, TimePointSec};

use serde::{Deserialize, Serialize};

/// A pre-approved transaction awaiting its execution window. The embedded
/// transaction runs as an agreed task once `expiration_time` is reached.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposed_transaction: SignedTransaction,
    pub expiration_time: TimePointSec,
    /// Cleared the moment the task is admitted for execution, so a proposal
    /// runs at most once.
    pub allow_execution: bool,
}

impl Proposal {
    /// Whether the task may be admitted for execution at `now`.
    pub fn is_executable(&self, now: TimePointSec) -> bool {
        self.allow_execution && self.expiration_time <= now
    }
}
