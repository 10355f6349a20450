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

//! Wire-level constants and small value types of the Slice encoding.

use std::fmt;

/// Encoding version carried by every encapsulation header.
///
/// Only 1.0 and 1.1 are recognized. 1.0 disables tagged members and the
/// class/exception decoding paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodingVersion {
    pub major: u8,
    pub minor: u8,
}

impl EncodingVersion {
    pub const V1_0: EncodingVersion = EncodingVersion { major: 1, minor: 0 };
    pub const V1_1: EncodingVersion = EncodingVersion { major: 1, minor: 1 };

    pub fn is_supported(self) -> bool {
        self == EncodingVersion::V1_0 || self == EncodingVersion::V1_1
    }
}

impl fmt::Display for EncodingVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Per-slice header flags. The two low bits form a 2-bit type-id field:
/// `0x03` means a compact numeric id.
pub mod slice_flags {
    pub const HAS_TYPE_ID_STRING: u8 = 0x01;
    pub const HAS_TYPE_ID_INDEX: u8 = 0x02;
    pub const HAS_TYPE_ID_COMPACT: u8 = 0x03;
    pub const HAS_OPTIONAL_MEMBERS: u8 = 0x04;
    pub const HAS_INDIRECTION_TABLE: u8 = 0x08;
    pub const HAS_SLICE_SIZE: u8 = 0x10;
    pub const IS_LAST_SLICE: u8 = 0x20;
}

/// A standalone `0xFF` byte terminates a tagged-member section.
pub const OPTIONAL_END_MARKER: u8 = 0xFF;

/// Type id of the class hierarchy root; unknown sliced instances fall back
/// to a factory registered under this id before turning opaque.
pub const ROOT_OBJECT_ID: &str = "::Ice::Object";

/// Width class of a tagged member, stored in the low 3 bits of the tagged
/// member header byte. Every 3-bit value is a valid format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionalFormat {
    F1 = 0,
    F2 = 1,
    F4 = 2,
    F8 = 3,
    Size = 4,
    VSize = 5,
    FSize = 6,
    Class = 7,
}

impl OptionalFormat {
    pub fn from_byte(b: u8) -> OptionalFormat {
        match b & 0x07 {
            0 => OptionalFormat::F1,
            1 => OptionalFormat::F2,
            2 => OptionalFormat::F4,
            3 => OptionalFormat::F8,
            4 => OptionalFormat::Size,
            5 => OptionalFormat::VSize,
            6 => OptionalFormat::FSize,
            _ => OptionalFormat::Class,
        }
    }
}

/// Whether an instance frame decodes a class or a user exception.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SliceType {
    #[default]
    Class,
    Exception,
}
