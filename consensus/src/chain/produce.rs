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

use super::Chain;
use crate::{
    error::ConsensusError,
    evaluator::TransactionApplyMode,
    parameters::GENESIS_EXTENSION,
    skip::SkipFlags,
};

use ember_objects::{
    BlockHeader, PrivateKey, ProcessedTransaction, SignedBlock, TimePointSec, TxHash, WitnessId,
};
use ember_storage::Witness;

use tracing::warn;

impl Chain {
    /// Builds and signs a block for the witness's scheduled slot. The caller
    /// is expected to feed the result back through [`Chain::push_block`].
    pub fn generate_block(
        &mut self,
        when: TimePointSec,
        witness_id: WitnessId,
        signing_key: &PrivateKey,
        skip: SkipFlags,
    ) -> Result<SignedBlock, ConsensusError> {
        self.with_skip_flags(skip, |chain| chain._generate_block(when, witness_id, signing_key))
    }

    pub(crate) fn _generate_block(
        &mut self,
        when: TimePointSec,
        witness_id: WitnessId,
        signing_key: &PrivateKey,
    ) -> Result<SignedBlock, ConsensusError> {
        let skip = self.current_skip;

        let slot_num = self.get_slot_at_time(when)?;
        if slot_num == 0 {
            return Err(ConsensusError::InvalidProductionSlot);
        }
        if self.get_scheduled_witness(slot_num)? != witness_id {
            return Err(ConsensusError::NotScheduledWitness);
        }
        let witness = self.store.get::<Witness>(witness_id)?;
        if !skip.contains(SkipFlags::WITNESS_SIGNATURE)
            && witness.signing_key != signing_key.public_key()
        {
            return Err(ConsensusError::WrongSigningKey);
        }

        let params = self.chain_parameters()?;
        let maximum_block_size = params.maximum_block_size as usize;
        let mut total_block_size = SignedBlock::default().packed_size()? + 128;

        // Throw away the pending session and rebuild it by re-applying the
        // queue: time-based semantics may have shifted since the
        // transactions arrived, and only `when` settles them.
        self.reset_pending_session()?;
        let session = self.store.start_undo_session();
        self.pending_session = Some(session);

        let head_block_num = self.head_block_num()?;
        self.current_block_num = head_block_num + 1;
        self.current_trx_in_block = 0;

        let queue = self.pending_tx.clone();
        let mut transactions: Vec<(TxHash, ProcessedTransaction)> = Vec::new();
        for trx in &queue {
            let trx_size = trx.packed_size()?;
            // Postpone everything that no longer fits; it stays queued for
            // the next block.
            if total_block_size + trx_size >= maximum_block_size {
                break;
            }

            let mut trx_skip = skip;
            if trx.trx.leads_with_fee_share() {
                trx_skip = SkipFlags::FEE_SHARE;
            }
            if !self.options.deduce_in_verification_mode {
                trx_skip |= SkipFlags::AUTHORITY_CHECK;
            }

            let mut mode = TransactionApplyMode::ProductionBlock;
            let applied = self.with_skip_flags(trx_skip, |chain| {
                chain._apply_transaction(&trx.trx, None, &mut mode, false)
            });
            match applied {
                Ok(processed) => {
                    total_block_size += trx_size;
                    transactions.push((processed.hash()?, processed));
                    self.current_trx_in_block += 1;
                }
                Err(e) => {
                    warn!("transaction was not processed while generating block: {e}");
                }
            }
        }

        // The pending queue is no longer mirrored by this session; the
        // push_block that follows will rebuild it.
        self.reset_pending_session()?;

        let previous = self.head_block_id()?;
        let extensions = if previous.is_zero() {
            vec![GENESIS_EXTENSION.to_string()]
        } else {
            Vec::new()
        };

        let mut block = SignedBlock {
            header: BlockHeader {
                previous,
                timestamp: when,
                witness: witness_id,
                transaction_merkle_root: Default::default(),
                extensions,
            },
            witness_signature: Default::default(),
            transactions,
        };
        block.header.transaction_merkle_root = block.calculate_merkle_root();
        block.sign(signing_key, &self.chain_id)?;
        Ok(block)
    }
}
