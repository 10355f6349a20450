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

//! The input stream: the public decoding surface.
//!
//! An [`InputStream`] owns the buffer cursor and the encapsulation stack and
//! exposes every wire read: primitives, sequences, strings, enumerations,
//! proxies, tagged members, and (through the slice state machine in
//! `decoder`) classes and user exceptions.
//!
//! A stream is single-threaded and runs to completion or fails; after a
//! failure it must be [`reset`](InputStream::reset) before further use.

use crate::buffer::Reader;
use crate::encaps::Encaps;
use crate::ensure;
use crate::error::Error;
use crate::floe::Floe;
use crate::types::{EncodingVersion, OptionalFormat, OPTIONAL_END_MARKER};
use crate::value::Identity;

pub struct InputStream<'a> {
    pub(crate) buf: Reader<'a>,
    pub(crate) engine: &'a Floe,
    pub(crate) encaps: Vec<Encaps>,
    free_encaps: Option<Encaps>,
    /// Cumulative lower bound, in bytes, of every sequence announced so far.
    /// Guards against allocation bombs spread over many small sequences.
    min_total_seq_size: usize,
}

impl<'a> InputStream<'a> {
    pub fn new(engine: &'a Floe, bf: &'a [u8]) -> InputStream<'a> {
        InputStream {
            buf: Reader::new(bf),
            engine,
            encaps: Vec::new(),
            free_encaps: None,
            min_total_seq_size: 0,
        }
    }

    #[inline(always)]
    pub fn pos(&self) -> usize {
        self.buf.pos()
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Encoding version in effect at the cursor: the current encapsulation's
    /// version, or the engine default outside any encapsulation.
    pub fn encoding(&self) -> EncodingVersion {
        match self.encaps.last() {
            Some(e) => e.encoding,
            None => self.engine.default_encoding(),
        }
    }

    /// Rewind to the start of the buffer and drop all decoding state. The
    /// only way to reuse a stream after a failure.
    pub fn reset(&mut self) {
        while let Some(mut e) = self.encaps.pop() {
            e.reset();
            self.free_encaps = Some(e);
        }
        self.min_total_seq_size = 0;
        self.buf.seek(0).expect("seek to origin cannot fail");
    }

    // ------------------------------------------------------------------
    // Encapsulations
    // ------------------------------------------------------------------

    pub fn start_encapsulation(&mut self) -> Result<EncodingVersion, Error> {
        let start = self.buf.pos();
        let sz = self.buf.read_i32()?;
        ensure!(
            sz >= 6,
            Error::OutOfBounds(format!("invalid encapsulation size {sz}"))
        );
        ensure!(
            (sz - 4) as usize <= self.buf.remaining(),
            Error::out_of_bounds(self.buf.pos(), (sz - 4) as usize, self.buf.limit())
        );
        let encoding = self.read_encoding_version()?;
        self.push_encaps(start, sz, encoding, false);
        Ok(encoding)
    }

    pub fn end_encapsulation(&mut self) -> Result<(), Error> {
        let (end, encoding, implicit) = match self.encaps.last() {
            Some(e) => (e.end(), e.encoding, e.implicit),
            None => return Err(Error::encapsulation("not in an encapsulation")),
        };
        ensure!(
            !implicit,
            Error::encapsulation("not in an encapsulation")
        );
        if encoding != EncodingVersion::V1_0 {
            // Unread trailing tagged members are legal; skip them.
            self.skip_optionals()?;
            ensure!(
                self.buf.pos() == end,
                Error::encapsulation(format!(
                    "buffer position {} does not match encapsulation end {}",
                    self.buf.pos(),
                    end
                ))
            );
        } else if self.buf.pos() != end {
            // A 1.0 sender bug could append one spurious byte.
            ensure!(
                self.buf.pos() + 1 == end,
                Error::encapsulation(format!(
                    "buffer position {} does not match encapsulation end {}",
                    self.buf.pos(),
                    end
                ))
            );
            self.buf.skip(1)?;
        }
        self.pop_encaps();
        Ok(())
    }

    /// Skip over a whole encapsulation without decoding its content.
    pub fn skip_encapsulation(&mut self) -> Result<EncodingVersion, Error> {
        let (encoding, _) = self.read_encapsulation()?;
        Ok(encoding)
    }

    /// Return a whole encapsulation, header included, as a raw blob.
    pub fn read_encapsulation(&mut self) -> Result<(EncodingVersion, &'a [u8]), Error> {
        let start = self.buf.pos();
        let sz = self.buf.read_i32()?;
        ensure!(
            sz >= 6,
            Error::OutOfBounds(format!("invalid encapsulation size {sz}"))
        );
        ensure!(
            (sz - 4) as usize <= self.buf.remaining(),
            Error::out_of_bounds(self.buf.pos(), (sz - 4) as usize, self.buf.limit())
        );
        let encoding = self.read_encoding_version()?;
        self.buf.skip(sz as usize - 6)?;
        Ok((encoding, self.buf.sub_slice(start, start + sz as usize)?))
    }

    /// Skip an encapsulation that is expected to carry no data. For 1.0 an
    /// empty encapsulation is exactly six bytes; later encodings may pad it
    /// with tagged members, which are skipped unexamined.
    pub fn skip_empty_encapsulation(&mut self) -> Result<EncodingVersion, Error> {
        let sz = self.buf.read_i32()?;
        ensure!(
            sz >= 6,
            Error::encapsulation(format!("invalid encapsulation size {sz}"))
        );
        ensure!(
            (sz - 4) as usize <= self.buf.remaining(),
            Error::out_of_bounds(self.buf.pos(), (sz - 4) as usize, self.buf.limit())
        );
        let encoding = self.read_encoding_version()?;
        if encoding == EncodingVersion::V1_0 {
            ensure!(
                sz == 6,
                Error::encapsulation(format!("expected empty 1.0 encapsulation, size is {sz}"))
            );
        } else {
            self.buf.skip(sz as usize - 6)?;
        }
        Ok(encoding)
    }

    fn read_encoding_version(&mut self) -> Result<EncodingVersion, Error> {
        let major = self.buf.read_u8()?;
        let minor = self.buf.read_u8()?;
        let encoding = EncodingVersion { major, minor };
        ensure!(
            encoding.is_supported(),
            Error::marshal(format!("unsupported encoding version {encoding}"))
        );
        Ok(encoding)
    }

    fn push_encaps(&mut self, start: usize, sz: i32, encoding: EncodingVersion, implicit: bool) {
        let mut e = self.free_encaps.take().unwrap_or_default();
        e.start = start;
        e.sz = sz;
        e.encoding = encoding;
        e.implicit = implicit;
        self.encaps.push(e);
    }

    fn pop_encaps(&mut self) {
        let mut e = self.encaps.pop().expect("encapsulation stack is empty");
        e.reset();
        self.free_encaps = Some(e);
    }

    /// Absolute position just past the current encapsulation, or the buffer
    /// limit outside any encapsulation.
    pub(crate) fn encaps_end(&self) -> usize {
        match self.encaps.last() {
            Some(e) => e.end(),
            None => self.buf.limit(),
        }
    }

    /// Class, exception and tagged reads may run outside any started
    /// encapsulation; give them a frame spanning the rest of the buffer.
    pub(crate) fn ensure_encaps(&mut self) {
        if self.encaps.is_empty() {
            let sz = self.buf.limit() as i32;
            let encoding = self.engine.default_encoding();
            self.push_encaps(0, sz, encoding, true);
        }
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    #[inline(always)]
    pub fn read_bool(&mut self) -> Result<bool, Error> {
        self.buf.read_bool()
    }

    #[inline(always)]
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        self.buf.read_u8()
    }

    #[inline(always)]
    pub fn read_i8(&mut self) -> Result<i8, Error> {
        self.buf.read_i8()
    }

    #[inline(always)]
    pub fn read_i16(&mut self) -> Result<i16, Error> {
        self.buf.read_i16()
    }

    #[inline(always)]
    pub fn read_i32(&mut self) -> Result<i32, Error> {
        self.buf.read_i32()
    }

    #[inline(always)]
    pub fn read_i64(&mut self) -> Result<i64, Error> {
        self.buf.read_i64()
    }

    #[inline(always)]
    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.buf.read_f32()
    }

    #[inline(always)]
    pub fn read_f64(&mut self) -> Result<f64, Error> {
        self.buf.read_f64()
    }

    #[inline(always)]
    pub fn read_blob(&mut self, len: usize) -> Result<&'a [u8], Error> {
        self.buf.read_bytes(len)
    }

    #[inline(always)]
    pub fn read_size(&mut self) -> Result<i32, Error> {
        self.buf.read_size()
    }

    #[inline(always)]
    pub fn skip_size(&mut self) -> Result<(), Error> {
        self.buf.skip_size()
    }

    #[inline(always)]
    pub fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.buf.skip(n)
    }

    #[inline(always)]
    pub fn peek_u8(&self) -> Result<u8, Error> {
        self.buf.peek_u8()
    }

    /// Read a sequence size and charge it against the allocation budget.
    ///
    /// Two checks defend against hostile input: the announced elements must
    /// fit in the remaining buffer at `min_element_size` bytes each, and the
    /// running total of all announced sequences must not exceed the buffer
    /// size. A stream can therefore never force the decoder to allocate more
    /// than it is long.
    pub fn read_and_check_seq_size(&mut self, min_element_size: usize) -> Result<usize, Error> {
        let sz = self.read_size()? as usize;
        if sz == 0 {
            return Ok(0);
        }
        let limit = self.buf.limit();
        let bytes = sz
            .checked_mul(min_element_size)
            .filter(|b| self.buf.pos().checked_add(*b).is_some_and(|end| end <= limit))
            .ok_or_else(|| {
                Error::OutOfBounds(format!(
                    "sequence of {sz} element(s) cannot fit at position {}, buffer limit is {limit}",
                    self.buf.pos()
                ))
            })?;
        self.min_total_seq_size += bytes;
        ensure!(
            self.min_total_seq_size <= limit,
            Error::OutOfBounds(format!(
                "aggregate sequence size {} exceeds buffer limit {limit}",
                self.min_total_seq_size
            ))
        );
        Ok(sz)
    }

    // ------------------------------------------------------------------
    // Strings and sequences
    // ------------------------------------------------------------------

    pub fn read_string(&mut self) -> Result<String, Error> {
        let len = self.read_size()? as usize;
        let bytes = self.buf.read_bytes(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| Error::marshal("string is not valid UTF-8"))?;
        Ok(s.to_owned())
    }

    pub fn read_string_seq(&mut self) -> Result<Vec<String>, Error> {
        let n = self.read_and_check_seq_size(1)?;
        let mut seq = Vec::with_capacity(n);
        for _ in 0..n {
            seq.push(self.read_string()?);
        }
        Ok(seq)
    }

    pub fn read_byte_seq(&mut self) -> Result<Vec<u8>, Error> {
        let n = self.read_and_check_seq_size(1)?;
        Ok(self.buf.read_bytes(n)?.to_vec())
    }

    pub fn read_bool_seq(&mut self) -> Result<Vec<bool>, Error> {
        let n = self.read_and_check_seq_size(1)?;
        Ok(self.buf.read_bytes(n)?.iter().map(|b| *b != 0).collect())
    }

    pub fn read_i16_seq(&mut self) -> Result<Vec<i16>, Error> {
        let n = self.read_and_check_seq_size(2)?;
        let bytes = self.buf.read_bytes(n * 2)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub fn read_i32_seq(&mut self) -> Result<Vec<i32>, Error> {
        let n = self.read_and_check_seq_size(4)?;
        let bytes = self.buf.read_bytes(n * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub fn read_i64_seq(&mut self) -> Result<Vec<i64>, Error> {
        let n = self.read_and_check_seq_size(8)?;
        let bytes = self.buf.read_bytes(n * 8)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub fn read_f32_seq(&mut self) -> Result<Vec<f32>, Error> {
        let n = self.read_and_check_seq_size(4)?;
        let bytes = self.buf.read_bytes(n * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub fn read_f64_seq(&mut self) -> Result<Vec<f64>, Error> {
        let n = self.read_and_check_seq_size(8)?;
        let bytes = self.buf.read_bytes(n * 8)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    // ------------------------------------------------------------------
    // Enumerations and proxies
    // ------------------------------------------------------------------

    /// Read an enumerator. With 1.1 the value is a size; 1.0 used the
    /// narrowest fixed width that holds `max_value`. Range validation
    /// against the defined enumerator set is the caller's.
    pub fn read_enum(&mut self, max_value: i32) -> Result<i32, Error> {
        if self.encoding() == EncodingVersion::V1_0 {
            if max_value < 127 {
                Ok(self.buf.read_u8()? as i32)
            } else if max_value < 32767 {
                Ok(self.buf.read_i16()? as i32)
            } else {
                self.buf.read_i32()
            }
        } else {
            self.read_size()
        }
    }

    pub fn read_identity(&mut self) -> Result<Identity, Error> {
        let name = self.read_string()?;
        let category = self.read_string()?;
        Ok(Identity { name, category })
    }

    /// Read a proxy. The wire carries the identity first; a proxy with an
    /// empty name is null. Reference construction (endpoints and all) is the
    /// caller's business, supplied as `factory`.
    pub fn read_proxy<P, F>(&mut self, factory: F) -> Result<Option<P>, Error>
    where
        F: FnOnce(Identity, &mut InputStream<'a>) -> Result<P, Error>,
    {
        let identity = self.read_identity()?;
        if identity.name.is_empty() {
            Ok(None)
        } else {
            factory(identity, self).map(Some)
        }
    }

    // ------------------------------------------------------------------
    // Tagged (optional) members
    // ------------------------------------------------------------------

    /// Position the stream on the tagged member `tag`, verifying its width
    /// class. Returns `false`, without consuming the member's bytes, when
    /// the member is absent. Tags must be queried in increasing order.
    pub fn read_optional(&mut self, tag: i32, expected: OptionalFormat) -> Result<bool, Error> {
        if self.encoding() == EncodingVersion::V1_0 {
            return Ok(false);
        }
        // Within a class or exception slice, tagged members exist only when
        // the slice header says so.
        if let Some(flags) = self.current_slice_flags() {
            if flags & crate::types::slice_flags::HAS_OPTIONAL_MEMBERS == 0 {
                return Ok(false);
            }
        }
        self.read_opt_impl(tag, expected)
    }

    fn read_opt_impl(&mut self, read_tag: i32, expected: OptionalFormat) -> Result<bool, Error> {
        let end = self.encaps_end();
        loop {
            if self.buf.pos() >= end {
                return Ok(false);
            }
            let b = self.buf.read_u8()?;
            if b == OPTIONAL_END_MARKER {
                self.buf.rewind(1);
                return Ok(false);
            }
            let format = OptionalFormat::from_byte(b);
            let mut tag = (b >> 3) as i32;
            if tag == 30 {
                tag = self.read_size()?;
            }
            if tag > read_tag {
                // Not present; rewind over the header we just consumed.
                let header = if tag < 30 {
                    1
                } else if tag < 255 {
                    2
                } else {
                    6
                };
                self.buf.rewind(header);
                return Ok(false);
            } else if tag < read_tag {
                self.skip_optional(format)?;
            } else {
                ensure!(
                    format == expected,
                    Error::marshal(format!(
                        "tagged member {tag} has format {format:?}, expected {expected:?}"
                    ))
                );
                return Ok(true);
            }
        }
    }

    /// Skip one tagged member's payload according to its width class.
    pub fn skip_optional(&mut self, format: OptionalFormat) -> Result<(), Error> {
        match format {
            OptionalFormat::F1 => self.buf.skip(1),
            OptionalFormat::F2 => self.buf.skip(2),
            OptionalFormat::F4 => self.buf.skip(4),
            OptionalFormat::F8 => self.buf.skip(8),
            OptionalFormat::Size => self.buf.skip_size(),
            OptionalFormat::VSize => {
                let n = self.read_size()?;
                self.buf.skip(n as usize)
            }
            OptionalFormat::FSize => {
                let n = self.buf.read_i32()?;
                if n < 0 {
                    return Err(Error::negative_size(n));
                }
                self.buf.skip(n as usize)
            }
            OptionalFormat::Class => {
                // A tagged class member is a full class reference.
                self.read_class()?;
                Ok(())
            }
        }
    }

    /// Consume the rest of a tagged section, up to its end marker or the
    /// end of the encapsulation.
    pub(crate) fn skip_optionals(&mut self) -> Result<(), Error> {
        let end = self.encaps_end();
        loop {
            if self.buf.pos() >= end {
                return Ok(());
            }
            let b = self.buf.read_u8()?;
            if b == OPTIONAL_END_MARKER {
                return Ok(());
            }
            let format = OptionalFormat::from_byte(b);
            if (b >> 3) == 30 {
                self.buf.skip_size()?;
            }
            self.skip_optional(format)?;
        }
    }
}
