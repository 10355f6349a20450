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

//! Bounded little-endian cursor over an immutable byte region.
//!
//! Every fixed-width read checks the remaining bytes once, decodes with the
//! `from_le_bytes` pattern and advances the cursor by the exact type width.
//! A failed read reports [`Error::OutOfBounds`] and leaves the cursor where
//! it was, so the caller can report the exact failure position.
//!
//! Compact size integers (one byte, with a `0xFF` + `i32` escape for values
//! of 255 and above) are decoded here as well since every layer above needs
//! them.

use crate::error::Error;

#[derive(Default)]
pub struct Reader<'a> {
    bf: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    #[inline(always)]
    pub fn new(bf: &'a [u8]) -> Reader<'a> {
        Reader { bf, cursor: 0 }
    }

    #[inline(always)]
    pub fn pos(&self) -> usize {
        self.cursor
    }

    #[inline(always)]
    pub fn limit(&self) -> usize {
        self.bf.len()
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.bf.len() - self.cursor
    }

    /// Reposition the cursor. The target must lie within `[0, limit]`.
    #[inline(always)]
    pub fn seek(&mut self, pos: usize) -> Result<(), Error> {
        if pos > self.bf.len() {
            return Err(Error::out_of_bounds(pos, 0, self.bf.len()));
        }
        self.cursor = pos;
        Ok(())
    }

    /// Move the cursor back over bytes that were just read.
    #[inline(always)]
    pub(crate) fn rewind(&mut self, n: usize) {
        self.cursor -= n;
    }

    #[inline(always)]
    pub fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.check_bound(n)?;
        self.cursor += n;
        Ok(())
    }

    #[inline(always)]
    pub fn sub_slice(&self, start: usize, end: usize) -> Result<&'a [u8], Error> {
        if end > self.bf.len() || end < start {
            return Err(Error::out_of_bounds(start, end.wrapping_sub(start), self.bf.len()));
        }
        Ok(&self.bf[start..end])
    }

    #[inline(always)]
    fn check_bound(&self, n: usize) -> Result<(), Error> {
        if self.cursor + n > self.bf.len() {
            Err(Error::out_of_bounds(self.cursor, n, self.bf.len()))
        } else {
            Ok(())
        }
    }

    #[inline(always)]
    pub fn peek_u8(&self) -> Result<u8, Error> {
        match self.bf.get(self.cursor) {
            Some(v) => Ok(*v),
            None => Err(Error::out_of_bounds(self.cursor, 1, self.bf.len())),
        }
    }

    #[inline(always)]
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let v = self.peek_u8()?;
        self.cursor += 1;
        Ok(v)
    }

    #[inline(always)]
    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    #[inline(always)]
    pub fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    #[inline(always)]
    pub fn read_i16(&mut self) -> Result<i16, Error> {
        let cursor = self.cursor;
        self.check_bound(2)?;
        let result = i16::from_le_bytes(self.bf[cursor..cursor + 2].try_into().unwrap());
        self.cursor = cursor + 2;
        Ok(result)
    }

    #[inline(always)]
    pub fn read_i32(&mut self) -> Result<i32, Error> {
        let cursor = self.cursor;
        self.check_bound(4)?;
        let result = i32::from_le_bytes(self.bf[cursor..cursor + 4].try_into().unwrap());
        self.cursor = cursor + 4;
        Ok(result)
    }

    #[inline(always)]
    pub fn read_i64(&mut self) -> Result<i64, Error> {
        let cursor = self.cursor;
        self.check_bound(8)?;
        let result = i64::from_le_bytes(self.bf[cursor..cursor + 8].try_into().unwrap());
        self.cursor = cursor + 8;
        Ok(result)
    }

    #[inline(always)]
    pub fn read_f32(&mut self) -> Result<f32, Error> {
        let cursor = self.cursor;
        self.check_bound(4)?;
        let result = f32::from_le_bytes(self.bf[cursor..cursor + 4].try_into().unwrap());
        self.cursor = cursor + 4;
        Ok(result)
    }

    #[inline(always)]
    pub fn read_f64(&mut self) -> Result<f64, Error> {
        let cursor = self.cursor;
        self.check_bound(8)?;
        let result = f64::from_le_bytes(self.bf[cursor..cursor + 8].try_into().unwrap());
        self.cursor = cursor + 8;
        Ok(result)
    }

    #[inline(always)]
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        self.check_bound(len)?;
        let result = &self.bf[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(result)
    }

    /// Compact size integer: one byte, or `0xFF` followed by a non-negative
    /// `i32` for values of 255 and above.
    #[inline(always)]
    pub fn read_size(&mut self) -> Result<i32, Error> {
        let b = self.read_u8()?;
        if b == 255 {
            let v = self.read_i32()?;
            if v < 0 {
                return Err(Error::negative_size(v));
            }
            Ok(v)
        } else {
            Ok(b as i32)
        }
    }

    #[inline(always)]
    pub fn skip_size(&mut self) -> Result<(), Error> {
        if self.read_u8()? == 255 {
            self.skip(4)?;
        }
        Ok(())
    }
}
