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

use crate::{digest::Digest, error::ObjectError};

use ed25519_dalek::{ExpandedSecretKey, Verifier};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// An ed25519 public key in compressed byte form.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub struct PublicKey(pub [u8; 32]);

impl Display for PublicKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A block/transaction signing key. Never serialized.
#[derive(Clone)]
pub struct PrivateKey {
    seed: [u8; 32],
}

impl PrivateKey {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    pub fn public_key(&self) -> PublicKey {
        // The seed is a valid ed25519 secret by construction.
        let secret = ed25519_dalek::SecretKey::from_bytes(&self.seed)
            .expect("32-byte seed is a valid ed25519 secret");
        PublicKey(ed25519_dalek::PublicKey::from(&secret).to_bytes())
    }

    /// Produces a detached signature over the given digest, paired with the
    /// signing public key.
    pub fn sign(&self, digest: &Digest) -> SigPair {
        let secret = ed25519_dalek::SecretKey::from_bytes(&self.seed)
            .expect("32-byte seed is a valid ed25519 secret");
        let public = ed25519_dalek::PublicKey::from(&secret);
        let expanded: ExpandedSecretKey = (&secret).into();
        let signature = expanded.sign(digest.as_ref(), &public);

        SigPair {
            signer: PublicKey(public.to_bytes()),
            signature: signature.to_bytes().to_vec(),
        }
    }
}

/// A detached signature together with the key that produced it.
///
/// ed25519 cannot recover the signer from a signature the way recoverable
/// ECDSA schemes do, so the signer travels alongside the signature and
/// verification yields the signing key set.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SigPair {
    pub signer: PublicKey,
    pub signature: Vec<u8>,
}

impl SigPair {
    /// Verifies the signature over `digest` and returns the signing key.
    pub fn verify(&self, digest: &Digest) -> Result<PublicKey, ObjectError> {
        let public = ed25519_dalek::PublicKey::from_bytes(&self.signer.0)?;
        let signature = ed25519_dalek::Signature::from_bytes(&self.signature)?;
        public.verify(digest.as_ref(), &signature)?;
        Ok(self.signer)
    }

    pub fn is_empty(&self) -> bool {
        self.signature.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;

    use rand::{Rng, SeedableRng};

    fn test_key(rng: &mut impl Rng) -> PrivateKey {
        let mut seed = [0u8; 32];
        rng.fill(&mut seed);
        PrivateKey::from_seed(seed)
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let key = test_key(&mut rng);
        let digest = hash_bytes(b"payload");

        let pair = key.sign(&digest);
        assert_eq!(pair.verify(&digest).unwrap(), key.public_key());
    }

    #[test]
    fn verify_rejects_wrong_digest() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(43);
        let key = test_key(&mut rng);

        let pair = key.sign(&hash_bytes(b"payload"));
        assert!(pair.verify(&hash_bytes(b"other")).is_err());
    }

    #[test]
    fn verify_rejects_swapped_signer() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(44);
        let key = test_key(&mut rng);
        let other = test_key(&mut rng);
        let digest = hash_bytes(b"payload");

        let mut pair = key.sign(&digest);
        pair.signer = other.public_key();
        assert!(pair.verify(&digest).is_err());
    }
}
