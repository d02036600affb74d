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
    digest::{hash_bytes, Digest, TransactionId, TxHash},
    error::ObjectError,
    ids::ObjectId,
    keys::{PrivateKey, PublicKey, SigPair},
    operation::{Operation, OperationResult},
    time::TimePointSec,
};

use serde::{Deserialize, Serialize};

/// The kind of pre-approved task a transaction executes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AgreedTaskKind {
    Proposal,
    Crontab,
}

/// A reference to a proposal or crontab whose authority was approved at
/// creation time; signatures are not re-checked at execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgreedTask {
    pub kind: AgreedTaskKind,
    pub id: ObjectId,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Low 16 bits of the referenced block number (TaPoS).
    pub ref_block_num: u16,
    /// Second 32-bit word of the referenced block id (TaPoS).
    pub ref_block_prefix: u32,
    pub expiration: TimePointSec,
    pub operations: Vec<Operation>,
    pub signatures: Vec<SigPair>,
    pub agreed_task: Option<AgreedTask>,
}

impl SignedTransaction {
    /// The transaction id: digest of the transaction with signatures stripped.
    pub fn id(&self) -> Result<TransactionId, ObjectError> {
        let mut stripped = self.clone();
        stripped.signatures.clear();
        Ok(hash_bytes(&bincode::serialize(&stripped)?))
    }

    /// The transaction hash: digest over the full transaction, signatures
    /// included.
    pub fn hash(&self) -> Result<TxHash, ObjectError> {
        Ok(hash_bytes(&bincode::serialize(self)?))
    }

    /// The digest that signatures commit to, domain-separated by chain id.
    pub fn signing_digest(&self, chain_id: &Digest) -> Result<Digest, ObjectError> {
        let mut stripped = self.clone();
        stripped.signatures.clear();
        let mut bytes = chain_id.0.to_vec();
        bytes.extend_from_slice(&bincode::serialize(&stripped)?);
        Ok(hash_bytes(&bytes))
    }

    pub fn sign(&mut self, key: &PrivateKey, chain_id: &Digest) -> Result<(), ObjectError> {
        let digest = self.signing_digest(chain_id)?;
        self.signatures.push(key.sign(&digest));
        Ok(())
    }

    /// Verifies every attached signature and returns the set of signing keys.
    pub fn signature_keys(&self, chain_id: &Digest) -> Result<Vec<PublicKey>, ObjectError> {
        let digest = self.signing_digest(chain_id)?;
        self.signatures.iter().map(|pair| pair.verify(&digest)).collect()
    }

    /// Serialized size in bytes, as counted against block size limits.
    pub fn packed_size(&self) -> Result<usize, ObjectError> {
        Ok(bincode::serialized_size(self)? as usize)
    }

    /// Structural validation, independent of chain state.
    pub fn validate(&self) -> Result<(), ObjectError> {
        if self.operations.is_empty() {
            return Err(ObjectError::EmptyTransaction);
        }
        for operation in &self.operations {
            operation.validate()?;
        }
        Ok(())
    }

    pub fn is_agreed_task(&self) -> bool {
        self.agreed_task.is_some()
    }

    /// Whether the lead operation is the system fee-share kind, which is
    /// exempt from signature, TaPoS and duplicate checks.
    pub fn leads_with_fee_share(&self) -> bool {
        self.operations.first().map(Operation::is_contract_share_fee).unwrap_or(false)
    }
}

/// A [`SignedTransaction`] plus the results its operations produced when it
/// was applied. Auto-gas may append one extra synthesized result, so the
/// result sequence can exceed the operation sequence by one.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    pub trx: SignedTransaction,
    pub operation_results: Vec<OperationResult>,
}

impl ProcessedTransaction {
    pub fn new(trx: SignedTransaction) -> Self {
        Self { trx, operation_results: Vec::new() }
    }

    pub fn id(&self) -> Result<TransactionId, ObjectError> {
        self.trx.id()
    }

    pub fn hash(&self) -> Result<TxHash, ObjectError> {
        self.trx.hash()
    }

    pub fn packed_size(&self) -> Result<usize, ObjectError> {
        Ok(bincode::serialized_size(self)? as usize)
    }
}

impl From<SignedTransaction> for ProcessedTransaction {
    fn from(trx: SignedTransaction) -> Self {
        Self::new(trx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{asset::Asset, ids::AccountId, operation::TransferOperation};

    fn transfer(from: u64, to: u64, amount: i64) -> Operation {
        Operation::Transfer(TransferOperation {
            from: AccountId(from),
            to: AccountId(to),
            amount: Asset::core(amount),
            memo: None,
        })
    }

    fn sample_transaction() -> SignedTransaction {
        SignedTransaction {
            ref_block_num: 1,
            ref_block_prefix: 0xdead_beef,
            expiration: TimePointSec::new(100),
            operations: vec![transfer(1, 2, 10)],
            signatures: Vec::new(),
            agreed_task: None,
        }
    }

    #[test]
    fn id_ignores_signatures() {
        let mut trx = sample_transaction();
        let unsigned_id = trx.id().unwrap();

        let key = PrivateKey::from_seed([7u8; 32]);
        trx.sign(&key, &Digest::default()).unwrap();

        assert_eq!(trx.id().unwrap(), unsigned_id);
        assert_ne!(trx.hash().unwrap(), unsigned_id);
    }

    #[test]
    fn signature_keys_report_the_signers() {
        let mut trx = sample_transaction();
        let chain_id = hash_bytes(b"testnet");
        let key = PrivateKey::from_seed([9u8; 32]);
        trx.sign(&key, &chain_id).unwrap();

        assert_eq!(trx.signature_keys(&chain_id).unwrap(), vec![key.public_key()]);
        // The same signature must not verify under another chain id.
        assert!(trx.signature_keys(&hash_bytes(b"mainnet")).is_err());
    }

    #[test]
    fn validate_rejects_empty_operations() {
        let mut trx = sample_transaction();
        trx.operations.clear();
        assert!(trx.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_transfer() {
        let mut trx = sample_transaction();
        trx.operations = vec![transfer(1, 2, 0)];
        assert!(trx.validate().is_err());
    }
}
