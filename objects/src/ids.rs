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

/// The closed set of object kinds held by the object store. The numeric tags
/// are part of the storage format and must not be reordered.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectType {
    Account = 1,
    Witness = 2,
    Proposal = 3,
    Crontab = 4,
    VestingBalance = 5,
    TemporaryAuthority = 6,
    Transaction = 7,
    TransactionInBlock = 8,
    BlockSummary = 9,
    GlobalProperty = 10,
    DynamicGlobalProperty = 11,
    Contract = 12,
}

/// A type-tagged object identifier: an [`ObjectType`] plus a 64-bit instance
/// number unique within the type.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ObjectId {
    pub object_type: ObjectType,
    pub instance: u64,
}

impl ObjectId {
    pub const fn new(object_type: ObjectType, instance: u64) -> Self {
        Self { object_type, instance }
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.object_type as u8, self.instance)
    }
}

macro_rules! typed_id {
    ($(#[$doc:meta])* $name:ident, $object_type:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            pub const OBJECT_TYPE: ObjectType = ObjectType::$object_type;

            pub const fn object_id(&self) -> ObjectId {
                ObjectId::new(ObjectType::$object_type, self.0)
            }
        }

        impl From<$name> for ObjectId {
            fn from(id: $name) -> ObjectId {
                id.object_id()
            }
        }

        impl From<u64> for $name {
            fn from(instance: u64) -> $name {
                $name(instance)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                write!(f, "{}", self.object_id())
            }
        }
    };
}

typed_id!(AccountId, Account);
typed_id!(WitnessId, Witness);
typed_id!(ProposalId, Proposal);
typed_id!(CrontabId, Crontab);
typed_id!(VestingBalanceId, VestingBalance);
typed_id!(TemporaryAuthorityId, TemporaryAuthority);
typed_id!(TransactionObjectId, Transaction);
typed_id!(TransactionInBlockId, TransactionInBlock);
typed_id!(
    /// Ring index into the 65536 block summary slots; the instance is
    /// `block_num & 0xFFFF`.
    BlockSummaryId,
    BlockSummary
);
typed_id!(GlobalPropertyId, GlobalProperty);
typed_id!(DynamicGlobalPropertyId, DynamicGlobalProperty);
typed_id!(ContractId, Contract);
