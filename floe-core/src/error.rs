// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Failure kinds surfaced by the decoder.
//!
//! All errors propagate to the caller; there is no local recovery. After any
//! failure the stream must be [`reset`](crate::stream::InputStream::reset)
//! before it is used again.

use thiserror::Error as ThisError;

pub use anyhow::Error as AnyhowError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// A read past the buffer limit, a negative size, or a violation of the
    /// aggregate sequence-size budget.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// Encapsulation bracketing went wrong: the cursor did not land on the
    /// encapsulation boundary, or an empty encapsulation carried a body.
    #[error("encapsulation error: {0}")]
    Encapsulation(String),

    /// Structurally invalid bytes.
    #[error("marshal error: {0}")]
    Marshal(String),

    /// A class was encoded in the compact format and its type is not
    /// registered; slicing cannot recover it.
    #[error("no class factory registered for type `{0}'")]
    NoClassFactory(String),

    /// An exception type is not registered and the last slice was reached.
    #[error("unknown user exception of type `{0}'")]
    UnknownUserException(String),

    #[error(transparent)]
    Other(#[from] AnyhowError),
}

impl Error {
    pub fn out_of_bounds(pos: usize, requested: usize, limit: usize) -> Error {
        Error::OutOfBounds(format!(
            "need {requested} byte(s) at position {pos}, buffer limit is {limit}"
        ))
    }

    pub fn negative_size(size: i32) -> Error {
        Error::OutOfBounds(format!("negative size {size}"))
    }

    pub fn encapsulation(msg: impl Into<String>) -> Error {
        Error::Encapsulation(msg.into())
    }

    pub fn marshal(msg: impl Into<String>) -> Error {
        Error::Marshal(msg.into())
    }

    pub fn no_class_factory(type_id: impl Into<String>) -> Error {
        Error::NoClassFactory(type_id.into())
    }

    pub fn unknown_user_exception(type_id: impl Into<String>) -> Error {
        Error::UnknownUserException(type_id.into())
    }
}

/// Return early with the given error when the condition does not hold.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}
