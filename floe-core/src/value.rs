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

//! Polymorphic roots produced by the decoder.
//!
//! Classes are shared handles: the same instance may appear many times in
//! one graph through back-references, so decoded classes are handed out as
//! [`ClassRef`] (`Rc<RefCell<dyn AnyClass>>`). The interior is filled
//! *after* the handle is registered with the decoder, which is what makes
//! cyclic graphs decodable. User exceptions are decoded at most once per
//! stream and transfer ownership to the caller as a plain `Box`.
//!
//! Polymorphism is registry-driven rather than inheritance-driven: a type id
//! maps to a constructor, and an instance whose type is unknown everywhere
//! becomes an [`UnknownSlicedClass`] carrying its preserved slices.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Error;
use crate::stream::InputStream;

/// Root of all decodable class instances.
///
/// `read` consumes the data members of every locally known slice of the
/// instance, most-derived first, bracketing each inheritance level with
/// [`InputStream::start_slice`] and [`InputStream::end_slice`]. Tagged
/// members are read between the mandatory members and `end_slice` via
/// [`InputStream::read_optional`].
pub trait AnyClass: Any {
    /// Most-derived type id this value decodes, e.g. `"::Mod::Type"`.
    fn type_id(&self) -> &str;

    fn read(&mut self, stream: &mut InputStream<'_>) -> Result<(), Error>;

    /// Whether slices of unknown derived types should be retained on this
    /// value even when the engine-wide preservation default is off.
    fn preserves_slices(&self) -> bool {
        false
    }

    /// Called once at the end of decoding when slices were preserved.
    fn set_sliced_data(&mut self, _data: SlicedData) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared handle to a decoded class instance.
pub type ClassRef = Rc<RefCell<dyn AnyClass>>;

/// Root of all decodable user exceptions.
pub trait UserException: Any {
    /// Most-derived type id this exception decodes.
    fn type_id(&self) -> &str;

    /// Same slice-walking contract as [`AnyClass::read`].
    fn read(&mut self, stream: &mut InputStream<'_>) -> Result<(), Error>;

    /// Called when slices of unknown derived exception types were preserved.
    fn set_sliced_data(&mut self, _data: SlicedData) {}

    fn as_any(&self) -> &dyn Any;
}

/// One preserved slice of an instance whose type was not known locally.
///
/// `bytes` holds the slice body verbatim, without the trailing tagged-member
/// end marker when `has_optional_members` is set (the marker is re-emitted
/// on re-serialization). `instances` holds the slice's indirection table.
#[derive(Clone, Default)]
pub struct SliceInfo {
    pub type_id: String,
    pub compact_id: i32,
    pub bytes: Vec<u8>,
    pub instances: Vec<ClassRef>,
    pub has_optional_members: bool,
    pub is_last_slice: bool,
}

/// The preserved slices of one instance, in stream order.
#[derive(Clone, Default)]
pub struct SlicedData {
    pub slices: Vec<SliceInfo>,
}

/// Opaque stand-in for an instance whose most-derived type chain is unknown
/// all the way down. Carries the preserved slices for round-tripping.
pub struct UnknownSlicedClass {
    type_id: String,
    sliced_data: SlicedData,
}

impl UnknownSlicedClass {
    pub fn new(type_id: impl Into<String>) -> UnknownSlicedClass {
        UnknownSlicedClass {
            type_id: type_id.into(),
            sliced_data: SlicedData::default(),
        }
    }

    pub fn sliced_data(&self) -> &SlicedData {
        &self.sliced_data
    }
}

impl AnyClass for UnknownSlicedClass {
    fn type_id(&self) -> &str {
        &self.type_id
    }

    // Every slice was consumed while searching for a factory, so there is
    // nothing left to read.
    fn read(&mut self, _stream: &mut InputStream<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn preserves_slices(&self) -> bool {
        true
    }

    fn set_sliced_data(&mut self, data: SlicedData) {
        self.sliced_data = data;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Object identity carried by proxies: two strings, `name` and `category`.
/// A proxy with an empty name is the null proxy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Identity {
    pub name: String,
    pub category: String,
}
