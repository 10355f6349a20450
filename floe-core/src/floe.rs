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

//! Decoder engine: configuration plus the type registry.
//!
//! A [`Floe`] value is built once, registered with the application's class
//! and exception types, and then shared by any number of sequential
//! decodes. Each decode runs on an [`InputStream`] borrowed from the
//! engine via [`Floe::input`]; the registry is read-only from the stream's
//! perspective.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Error;
use crate::resolver::type_resolver::{CompactIdResolver, TypeResolver};
use crate::stream::InputStream;
use crate::types::EncodingVersion;
use crate::value::{AnyClass, ClassRef, UserException};

pub struct Floe {
    resolver: TypeResolver,
    class_graph_depth_max: u32,
    slice_classes: bool,
    preserve_slices: bool,
    trace_slicing: bool,
    encoding: EncodingVersion,
}

impl Default for Floe {
    fn default() -> Floe {
        Floe {
            resolver: TypeResolver::default(),
            class_graph_depth_max: 100,
            slice_classes: true,
            preserve_slices: true,
            trace_slicing: false,
            encoding: EncodingVersion::V1_1,
        }
    }
}

impl Floe {
    /// Maximum nesting depth of a decoded class graph. Hostile input that
    /// nests deeper fails with a marshal error instead of blowing the
    /// stack.
    pub fn class_graph_depth_max(mut self, max: u32) -> Self {
        self.class_graph_depth_max = max;
        self
    }

    /// Whether instances of unknown derived class types are sliced down to
    /// the closest known base. When disabled, an unknown type is a hard
    /// failure.
    pub fn slice_classes(mut self, enabled: bool) -> Self {
        self.slice_classes = enabled;
        self
    }

    /// Whether slices dropped by slicing are preserved on the decoded value
    /// for later re-serialization.
    pub fn preserve_slices(mut self, enabled: bool) -> Self {
        self.preserve_slices = enabled;
        self
    }

    /// Emit a trace log line every time a slice of an unknown type is
    /// skipped.
    pub fn trace_slicing(mut self, enabled: bool) -> Self {
        self.trace_slicing = enabled;
        self
    }

    /// Encoding version assumed outside any encapsulation.
    pub fn encoding(mut self, encoding: EncodingVersion) -> Self {
        self.encoding = encoding;
        self
    }

    /// Register a class type constructible via `Default` under its wire
    /// type id.
    pub fn register_class<T: AnyClass + Default>(&mut self, type_id: &str) {
        self.resolver
            .register_class_factory(type_id, Rc::new(|| {
                Rc::new(RefCell::new(T::default())) as ClassRef
            }));
    }

    /// Register a class factory closure under a wire type id.
    pub fn register_class_factory<F>(&mut self, type_id: &str, factory: F)
    where
        F: Fn() -> ClassRef + 'static,
    {
        self.resolver.register_class_factory(type_id, Rc::new(factory));
    }

    /// Register an exception type constructible via `Default` under its
    /// wire type id.
    pub fn register_exception<T: UserException + Default>(&mut self, type_id: &str) {
        self.resolver
            .register_exception_factory(type_id, Rc::new(|| {
                Box::new(T::default()) as Box<dyn UserException>
            }));
    }

    /// Register an exception factory closure under a wire type id.
    pub fn register_exception_factory<F>(&mut self, type_id: &str, factory: F)
    where
        F: Fn() -> Box<dyn UserException> + 'static,
    {
        self.resolver
            .register_exception_factory(type_id, Rc::new(factory));
    }

    /// Associate a negotiated compact (numeric) id with a type id.
    pub fn register_compact_id(&mut self, compact_id: i32, type_id: &str) {
        self.resolver.register_compact_id(compact_id, type_id);
    }

    /// Install an application hook that translates compact ids ahead of the
    /// registry table. The hook may fail; the failure surfaces as a marshal
    /// error on the stream that hit it.
    pub fn compact_id_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(i32) -> Result<Option<String>, Error> + 'static,
    {
        self.resolver
            .set_compact_id_resolver(Box::new(resolver) as CompactIdResolver);
        self
    }

    /// Begin decoding a buffer.
    pub fn input<'a>(&'a self, bf: &'a [u8]) -> InputStream<'a> {
        InputStream::new(self, bf)
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    pub(crate) fn max_class_graph_depth(&self) -> u32 {
        self.class_graph_depth_max
    }

    pub(crate) fn can_slice_classes(&self) -> bool {
        self.slice_classes
    }

    pub(crate) fn should_preserve_slices(&self) -> bool {
        self.preserve_slices
    }

    pub(crate) fn traces_slicing(&self) -> bool {
        self.trace_slicing
    }

    pub(crate) fn default_encoding(&self) -> EncodingVersion {
        self.encoding
    }
}
