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

#![forbid(unsafe_code)]
#![warn(unused_extern_crates)]

pub mod asset;
pub use asset::*;

pub mod block;
pub use block::*;

pub mod digest;
pub use digest::*;

pub mod error;
pub use error::*;

pub mod ids;
pub use ids::*;

pub mod keys;
pub use keys::*;

pub mod operation;
pub use operation::*;

pub mod time;
pub use time::*;

pub mod transaction;
pub use transaction::*;
