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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("invalid key material: {0}")]
    BadKey(String),

    #[error("invalid signature encoding: {0}")]
    BadSignature(String),

    #[error("transaction has no operations")]
    EmptyTransaction,

    #[error("malformed operation: {0}")]
    MalformedOperation(String),

    #[error("{0}: {1}")]
    Crate(&'static str, String),
}

impl From<bincode::Error> for ObjectError {
    fn from(error: bincode::Error) -> Self {
        ObjectError::Crate("bincode", format!("{error:?}"))
    }
}

impl From<ed25519_dalek::SignatureError> for ObjectError {
    fn from(error: ed25519_dalek::SignatureError) -> Self {
        ObjectError::BadSignature(error.to_string())
    }
}
