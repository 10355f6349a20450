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

//! Encapsulation frames.
//!
//! Frames chain into a stack on the stream; a popped frame is reset and
//! parked in a single-slot free list so the allocations of its decoder
//! (frame pools, interning table, caches) survive to the next
//! encapsulation.

use crate::decoder::EncapsDecoder;
use crate::types::EncodingVersion;

pub(crate) struct Encaps {
    /// Absolute buffer position of the encapsulation size word.
    pub start: usize,
    /// Total encapsulation size in bytes, including the 6-byte header.
    pub sz: i32,
    pub encoding: EncodingVersion,
    /// Set for the frame synthesized when class, exception or tagged data
    /// is read outside any started encapsulation. Such a frame spans the
    /// whole buffer and cannot be ended explicitly.
    pub implicit: bool,
    /// Slice state machine bound to this frame, created on the first
    /// class/exception or tagged read.
    pub decoder: Option<EncapsDecoder>,
}

impl Default for Encaps {
    fn default() -> Encaps {
        Encaps {
            start: 0,
            sz: 0,
            encoding: EncodingVersion::V1_1,
            implicit: false,
            decoder: None,
        }
    }
}

impl Encaps {
    /// First absolute position past the encapsulation.
    pub fn end(&self) -> usize {
        self.start + self.sz as usize
    }

    /// Clear frame state before parking it in the free list. Decoder
    /// allocations are kept.
    pub fn reset(&mut self) {
        self.start = 0;
        self.sz = 0;
        self.encoding = EncodingVersion::V1_1;
        self.implicit = false;
        if let Some(decoder) = &mut self.decoder {
            decoder.reset();
        }
    }
}
