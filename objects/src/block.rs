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

use crate::{
    digest::{hash_bytes, merkle_root, Digest, TxHash},
    error::ObjectError,
    ids::WitnessId,
    keys::{PrivateKey, PublicKey, SigPair},
    time::TimePointSec,
    transaction::ProcessedTransaction,
};

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A block identifier. The first four bytes carry the big-endian block
/// number; the remainder is the truncated header digest, so the number is
/// derivable from the id alone.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub struct BlockId(pub Digest);

impl BlockId {
    /// The block number embedded in the id prefix.
    pub fn num(&self) -> u32 {
        u32::from_be_bytes([self.0 .0[0], self.0 .0[1], self.0 .0[2], self.0 .0[3]])
    }

    /// The second 32-bit word of the id, referenced by transactions as the
    /// TaPoS prefix.
    pub fn prefix_word(&self) -> u32 {
        u32::from_le_bytes([self.0 .0[4], self.0 .0[5], self.0 .0[6], self.0 .0[7]])
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous: BlockId,
    pub timestamp: TimePointSec,
    pub witness: WitnessId,
    pub transaction_merkle_root: Digest,
    pub extensions: Vec<String>,
}

impl BlockHeader {
    pub fn digest(&self) -> Result<Digest, ObjectError> {
        Ok(hash_bytes(&bincode::serialize(self)?))
    }

    /// The digest the witness signature commits to, domain-separated by
    /// chain id.
    pub fn signing_digest(&self, chain_id: &Digest) -> Result<Digest, ObjectError> {
        let mut bytes = chain_id.0.to_vec();
        bytes.extend_from_slice(&bincode::serialize(self)?);
        Ok(hash_bytes(&bytes))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub witness_signature: SigPair,
    /// Transactions in application order, keyed by their full hash.
    pub transactions: Vec<(TxHash, ProcessedTransaction)>,
}

impl SignedBlock {
    /// The block number, one past the previous block's.
    pub fn block_num(&self) -> u32 {
        self.header.previous.num() + 1
    }

    /// Computes the identity of this block: the header digest with the block
    /// number spliced into the first four bytes.
    pub fn id(&self) -> Result<BlockId, ObjectError> {
        let mut digest = self.header.digest()?;
        digest.0[..4].copy_from_slice(&self.block_num().to_be_bytes());
        Ok(BlockId(digest))
    }

    /// The merkle root over the contained transaction hashes, in order.
    pub fn calculate_merkle_root(&self) -> Digest {
        let hashes: Vec<TxHash> = self.transactions.iter().map(|(hash, _)| *hash).collect();
        merkle_root(&hashes)
    }

    pub fn sign(&mut self, key: &PrivateKey, chain_id: &Digest) -> Result<(), ObjectError> {
        let digest = self.header.signing_digest(chain_id)?;
        self.witness_signature = key.sign(&digest);
        Ok(())
    }

    /// Whether the witness signature was produced by `signer`.
    pub fn validate_signee(&self, signer: &PublicKey, chain_id: &Digest) -> bool {
        let digest = match self.header.signing_digest(chain_id) {
            Ok(digest) => digest,
            Err(_) => return false,
        };
        match self.witness_signature.verify(&digest) {
            Ok(key) => key == *signer,
            Err(_) => false,
        }
    }

    pub fn packed_size(&self) -> Result<usize, ObjectError> {
        Ok(bincode::serialized_size(self)? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_at(previous: BlockId, timestamp: u32) -> BlockHeader {
        BlockHeader {
            previous,
            timestamp: TimePointSec::new(timestamp),
            witness: WitnessId(1),
            transaction_merkle_root: Digest::default(),
            extensions: Vec::new(),
        }
    }

    #[test]
    fn id_embeds_the_block_number() {
        let block = SignedBlock { header: header_at(BlockId::default(), 5), ..Default::default() };
        let id = block.id().unwrap();
        assert_eq!(id.num(), 1);
        assert_eq!(block.block_num(), 1);
    }

    #[test]
    fn id_changes_with_the_header() {
        let a = SignedBlock { header: header_at(BlockId::default(), 5), ..Default::default() };
        let b = SignedBlock { header: header_at(BlockId::default(), 10), ..Default::default() };
        assert_ne!(a.id().unwrap(), b.id().unwrap());
    }

    #[test]
    fn signee_validation_round_trip() {
        let chain_id = hash_bytes(b"testnet");
        let key = PrivateKey::from_seed([3u8; 32]);
        let mut block =
            SignedBlock { header: header_at(BlockId::default(), 5), ..Default::default() };
        block.sign(&key, &chain_id).unwrap();

        assert!(block.validate_signee(&key.public_key(), &chain_id));
        let other = PrivateKey::from_seed([4u8; 32]);
        assert!(!block.validate_signee(&other.public_key(), &chain_id));
    }
}
