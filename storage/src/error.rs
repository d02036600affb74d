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

use ember_objects::{ObjectError, ObjectId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} does not exist")]
    ObjectNotFound(ObjectId),

    #[error("object {0} is not of the requested kind")]
    WrongObjectType(ObjectId),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("mutation with no open undo session")]
    NoActiveSession,

    #[error("session is not on top of the undo stack")]
    SessionNotOnTop,

    #[error("no committed undo state to pop")]
    NoUndoHistory,

    #[error("undo stack desync: {0}")]
    UndoStackDesync(String),

    #[error("{0}")]
    Object(#[from] ObjectError),
}
