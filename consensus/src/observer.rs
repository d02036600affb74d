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

use crate::error::ConsensusError;

use ember_objects::{
    DynamicGlobalPropertyId, GlobalPropertyId, ProcessedTransaction, SignedBlock,
};
use ember_storage::{DynamicGlobalProperty, GlobalProperty, Store};

/// Synchronous notifications fired after the mutation that triggers them.
/// Implementations must not call back into the chain.
pub trait ChainObserver: Send + Sync {
    fn applied_block(&self, _block: &SignedBlock) {}

    fn on_pending_transaction(&self, _trx: &ProcessedTransaction) {}

    fn notify_changed_objects(&self) {}
}

/// Maintenance-interval bookkeeping, called at most once per block when the
/// block timestamp reaches the scheduled maintenance time.
pub trait MaintenanceHook: Send + Sync {
    fn perform_chain_maintenance(
        &self,
        store: &mut Store,
        block: &SignedBlock,
    ) -> Result<(), ConsensusError>;
}

/// Advances the next maintenance time past the block; parameter and witness
/// set recomputation is plugged in by the node.
#[derive(Debug, Default)]
pub struct DefaultMaintenance;

impl MaintenanceHook for DefaultMaintenance {
    fn perform_chain_maintenance(
        &self,
        store: &mut Store,
        block: &SignedBlock,
    ) -> Result<(), ConsensusError> {
        let interval = store
            .get::<GlobalProperty>(GlobalPropertyId(0))?
            .parameters
            .maintenance_interval
            .max(1);
        store.modify::<DynamicGlobalProperty>(DynamicGlobalPropertyId(0), |dgp| {
            while dgp.next_maintenance_time <= block.header.timestamp {
                dgp.next_maintenance_time = dgp.next_maintenance_time.saturating_add(interval);
            }
        })?;
        Ok(())
    }
}
