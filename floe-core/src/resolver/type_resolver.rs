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

//! Runtime registry mapping wire type ids to constructors.
//!
//! The decoder consults this registry when it resolves the concrete type of
//! a class or exception slice. Registrations are immutable for the duration
//! of a decode; per-stream lookup caches live in the decoder itself.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Error;
use crate::value::{ClassRef, UserException};

/// Constructor for a registered class type.
pub type ClassFactory = Rc<dyn Fn() -> ClassRef>;

/// Constructor for a registered user-exception type.
pub type ExceptionFactory = Rc<dyn Fn() -> Box<dyn UserException>>;

/// External compact-id resolver hook. Returns the type id a compact id
/// stands for, `None` when the id is unknown to the hook, or an error that
/// the decoder surfaces as a marshal failure.
pub type CompactIdResolver = Box<dyn Fn(i32) -> Result<Option<String>, Error>>;

#[derive(Default)]
pub struct TypeResolver {
    class_factories: HashMap<String, ClassFactory>,
    exception_factories: HashMap<String, ExceptionFactory>,
    compact_ids: HashMap<i32, String>,
    compact_id_resolver: Option<CompactIdResolver>,
}

impl TypeResolver {
    pub fn register_class_factory(&mut self, type_id: &str, factory: ClassFactory) {
        self.class_factories.insert(type_id.to_owned(), factory);
    }

    pub fn register_exception_factory(&mut self, type_id: &str, factory: ExceptionFactory) {
        self.exception_factories.insert(type_id.to_owned(), factory);
    }

    /// Associate a negotiated compact (numeric) id with a type id.
    pub fn register_compact_id(&mut self, compact_id: i32, type_id: &str) {
        self.compact_ids.insert(compact_id, type_id.to_owned());
    }

    pub fn set_compact_id_resolver(&mut self, resolver: CompactIdResolver) {
        self.compact_id_resolver = Some(resolver);
    }

    pub(crate) fn class_factory(&self, type_id: &str) -> Option<ClassFactory> {
        self.class_factories.get(type_id).cloned()
    }

    /// Construct a fresh instance of a registered class type.
    pub fn new_instance(&self, type_id: &str) -> Option<ClassRef> {
        self.class_factories.get(type_id).map(|f| f())
    }

    /// Construct a fresh instance of a registered exception type.
    pub fn new_exception(&self, type_id: &str) -> Option<Box<dyn UserException>> {
        self.exception_factories.get(type_id).map(|f| f())
    }

    /// Look up a compact id in the registry table.
    pub fn resolve_compact_id(&self, compact_id: i32) -> Option<&str> {
        self.compact_ids.get(&compact_id).map(String::as_str)
    }

    /// Run the external compact-id resolver, if one is installed.
    pub(crate) fn external_compact_id(&self, compact_id: i32) -> Result<Option<String>, Error> {
        match &self.compact_id_resolver {
            Some(resolver) => resolver(compact_id),
            None => Ok(None),
        }
    }
}
