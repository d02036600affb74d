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

use ember_objects::{
    ProcessedTransaction, TimePointSec, TransactionId, TransactionInBlockId, TransactionObjectId,
    TxHash,
};

use serde::{Deserialize, Serialize};

/// A recently applied transaction, kept until it expires so duplicates can be
/// rejected. Indexed by id and by hash.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionObject {
    pub id: TransactionObjectId,
    pub trx_id: TransactionId,
    pub trx_hash: TxHash,
    pub trx: ProcessedTransaction,
}

impl TransactionObject {
    pub fn expiration(&self) -> TimePointSec {
        self.trx.trx.expiration
    }
}

/// Location of a transaction within an applied block, indexed by hash.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionInBlock {
    pub id: TransactionInBlockId,
    pub trx_hash: TxHash,
    pub block_num: u32,
    pub trx_in_block: u32,
}
