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

use blake2::{digest::Digest as _, Blake2s256};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A 32-byte Blake2s digest. Used for block ids, transaction hashes and
/// merkle roots.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn new(hash: Vec<u8>) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hash);

        Self(digest)
    }

    pub const fn size() -> usize {
        32
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash of a signed transaction, signatures included.
pub type TxHash = Digest;

/// Hash of a transaction with its signatures stripped.
pub type TransactionId = Digest;

/// Hashes raw bytes into a [`Digest`].
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    let mut hasher = Blake2s256::new();
    hasher.update(bytes);
    Digest(hasher.finalize().into())
}

/// Hashes the concatenation of two digests, used when folding merkle levels.
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Blake2s256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    Digest(hasher.finalize().into())
}

/// Computes the merkle root over an ordered list of transaction hashes.
///
/// An empty list yields the zero digest; an odd leaf at any level is carried
/// up to the next level unhashed.
pub fn merkle_root(hashes: &[Digest]) -> Digest {
    if hashes.is_empty() {
        return Digest::default();
    }

    let mut level: Vec<Digest> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            match pair {
                [left, right] => next.push(hash_pair(left, right)),
                [odd] => next.push(*odd),
                _ => unreachable!(),
            }
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_root_of_single_leaf_is_the_leaf() {
        let leaf = hash_bytes(b"leaf");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn merkle_root_is_order_sensitive() {
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn merkle_root_carries_odd_leaf_up() {
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        let c = hash_bytes(b"c");
        assert_eq!(merkle_root(&[a, b, c]), hash_pair(&hash_pair(&a, &b), &c));
    }
}
