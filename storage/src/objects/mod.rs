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

pub mod account;
pub use account::*;

pub mod authority;
pub use authority::*;

pub mod block_summary;
pub use block_summary::*;

pub mod crontab;
pub use crontab::*;

pub mod properties;
pub use properties::*;

pub mod proposal;
pub use proposal::*;

pub mod temporary_authority;
pub use temporary_authority::*;

pub mod transaction;
pub use transaction::*;

pub mod vesting;
pub use vesting::*;

pub mod witness;
pub use witness::*;

use ember_objects::{ObjectId, ObjectType};

/// Type-erased storage representation of a chain object. Internal to the
/// store; the public surface is typed through [`ChainObject`].
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Account(Account),
    Witness(Witness),
    Proposal(Proposal),
    Crontab(Crontab),
    VestingBalance(VestingBalance),
    TemporaryAuthority(TemporaryAuthority),
    Transaction(TransactionObject),
    TransactionInBlock(TransactionInBlock),
    BlockSummary(BlockSummary),
    GlobalProperty(GlobalProperty),
    DynamicGlobalProperty(DynamicGlobalProperty),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Account(_) => ObjectType::Account,
            Object::Witness(_) => ObjectType::Witness,
            Object::Proposal(_) => ObjectType::Proposal,
            Object::Crontab(_) => ObjectType::Crontab,
            Object::VestingBalance(_) => ObjectType::VestingBalance,
            Object::TemporaryAuthority(_) => ObjectType::TemporaryAuthority,
            Object::Transaction(_) => ObjectType::Transaction,
            Object::TransactionInBlock(_) => ObjectType::TransactionInBlock,
            Object::BlockSummary(_) => ObjectType::BlockSummary,
            Object::GlobalProperty(_) => ObjectType::GlobalProperty,
            Object::DynamicGlobalProperty(_) => ObjectType::DynamicGlobalProperty,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        match self {
            Object::Account(o) => o.id.into(),
            Object::Witness(o) => o.id.into(),
            Object::Proposal(o) => o.id.into(),
            Object::Crontab(o) => o.id.into(),
            Object::VestingBalance(o) => o.id.into(),
            Object::TemporaryAuthority(o) => o.id.into(),
            Object::Transaction(o) => o.id.into(),
            Object::TransactionInBlock(o) => o.id.into(),
            Object::BlockSummary(o) => o.id.into(),
            Object::GlobalProperty(o) => o.id.into(),
            Object::DynamicGlobalProperty(o) => o.id.into(),
        }
    }
}

/// Implemented by every object kind held in the store; ties a record type to
/// its typed id and its [`Object`] variant.
pub trait ChainObject: Clone + Sized {
    const OBJECT_TYPE: ObjectType;
    type Id: Copy + Into<ObjectId> + From<u64>;

    fn id(&self) -> Self::Id;
    fn into_object(self) -> Object;
    fn from_object(object: &Object) -> Option<&Self>;
    fn from_object_mut(object: &mut Object) -> Option<&mut Self>;
}

macro_rules! chain_object {
    ($record:ident, $variant:ident, $id:ident) => {
        impl ChainObject for $record {
            const OBJECT_TYPE: ObjectType = ObjectType::$variant;
            type Id = ember_objects::$id;

            fn id(&self) -> Self::Id {
                self.id
            }

            fn into_object(self) -> Object {
                Object::$variant(self)
            }

            fn from_object(object: &Object) -> Option<&Self> {
                match object {
                    Object::$variant(record) => Some(record),
                    _ => None,
                }
            }

            fn from_object_mut(object: &mut Object) -> Option<&mut Self> {
                match object {
                    Object::$variant(record) => Some(record),
                    _ => None,
                }
            }
        }
    };
}

chain_object!(Account, Account, AccountId);
chain_object!(Witness, Witness, WitnessId);
chain_object!(Proposal, Proposal, ProposalId);
chain_object!(Crontab, Crontab, CrontabId);
chain_object!(VestingBalance, VestingBalance, VestingBalanceId);
chain_object!(TemporaryAuthority, TemporaryAuthority, TemporaryAuthorityId);
chain_object!(TransactionObject, Transaction, TransactionObjectId);
chain_object!(TransactionInBlock, TransactionInBlock, TransactionInBlockId);
chain_object!(BlockSummary, BlockSummary, BlockSummaryId);
chain_object!(GlobalProperty, GlobalProperty, GlobalPropertyId);
chain_object!(DynamicGlobalProperty, DynamicGlobalProperty, DynamicGlobalPropertyId);
