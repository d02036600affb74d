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

use ember_objects::{BlockId, SignedBlock};

use parking_lot::RwLock;
use std::collections::HashMap;

/// The persistent block log. Blocks land here once their application
/// commits; the fork window consults it as fallback for anything older than
/// the in-memory horizon.
pub trait BlockStore: Send + Sync {
    fn store(&self, id: BlockId, block: &SignedBlock);

    fn fetch_optional(&self, id: &BlockId) -> Option<SignedBlock>;

    fn fetch_by_number(&self, num: u32) -> Option<SignedBlock>;

    fn fetch_block_id(&self, num: u32) -> Option<BlockId>;

    fn contains(&self, id: &BlockId) -> bool {
        self.fetch_optional(id).is_some()
    }
}

/// In-memory block log, used by tests and light deployments.
#[derive(Debug, Default)]
pub struct MemBlockStore {
    blocks: RwLock<HashMap<BlockId, SignedBlock>>,
    by_number: RwLock<HashMap<u32, BlockId>>,
}

impl MemBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemBlockStore {
    fn store(&self, id: BlockId, block: &SignedBlock) {
        self.by_number.write().insert(id.num(), id);
        self.blocks.write().insert(id, block.clone());
    }

    fn fetch_optional(&self, id: &BlockId) -> Option<SignedBlock> {
        self.blocks.read().get(id).cloned()
    }

    fn fetch_by_number(&self, num: u32) -> Option<SignedBlock> {
        let id = *self.by_number.read().get(&num)?;
        self.fetch_optional(&id)
    }

    fn fetch_block_id(&self, num: u32) -> Option<BlockId> {
        self.by_number.read().get(&num).copied()
    }

    fn contains(&self, id: &BlockId) -> bool {
        self.blocks.read().contains_key(id)
    }
}
