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

//! Slice state machine and the class/exception graph decoder.
//!
//! One [`EncapsDecoder`] lives in each encapsulation frame and holds the
//! per-encapsulation state: the type-id interning table, the unmarshaled
//! map of already-registered instances, resolution caches and a pool of
//! [`InstanceData`] frames, one per nested instance under decode.
//!
//! The central rule that makes cyclic graphs decodable is *register first,
//! then fill*: an instance handle enters the unmarshaled map before its
//! data members are read, so a nested reference to it resolves to the
//! partially-constructed handle. For the same reason the indirection tables
//! of skipped class slices are not read where they sit in the stream; their
//! positions are recorded and the tables are replayed once the instance is
//! registered. Exceptions cannot reference themselves, so their tables are
//! read eagerly.

use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use log::trace;

use crate::ensure;
use crate::error::Error;
use crate::resolver::type_resolver::ClassFactory;
use crate::stream::InputStream;
use crate::types::slice_flags::{
    HAS_INDIRECTION_TABLE, HAS_OPTIONAL_MEMBERS, HAS_SLICE_SIZE, HAS_TYPE_ID_COMPACT,
    HAS_TYPE_ID_INDEX, HAS_TYPE_ID_STRING, IS_LAST_SLICE,
};
use crate::types::{EncodingVersion, SliceType, ROOT_OBJECT_ID};
use crate::value::{ClassRef, SliceInfo, SlicedData, UnknownSlicedClass, UserException};

/// Per-encapsulation decoding state. Reset and pooled together with its
/// encapsulation frame.
pub(crate) struct EncapsDecoder {
    /// Interned type ids; wire indices are 1-based into this table.
    type_id_table: Vec<String>,
    /// Registered instances keyed by decode order; the first instance of an
    /// encapsulation registers as 2 (1 marks an inline instance).
    unmarshaled: HashMap<i32, ClassRef>,
    value_id_index: i32,
    class_graph_depth: u32,
    /// Compact id -> type id, memoized per encapsulation.
    compact_id_cache: HashMap<i32, String>,
    /// Type id -> factory; `None` memoizes a failed lookup so repeated
    /// misses stay cheap.
    factory_cache: HashMap<String, Option<ClassFactory>>,
    /// Frame pool; the first `depth` entries are live, the rest are kept
    /// for reuse.
    frames: Vec<InstanceData>,
    depth: usize,
}

impl Default for EncapsDecoder {
    fn default() -> EncapsDecoder {
        EncapsDecoder {
            type_id_table: Vec::new(),
            unmarshaled: HashMap::new(),
            value_id_index: 1,
            class_graph_depth: 0,
            compact_id_cache: HashMap::new(),
            factory_cache: HashMap::new(),
            frames: Vec::new(),
            depth: 0,
        }
    }
}

impl EncapsDecoder {
    pub(crate) fn reset(&mut self) {
        self.type_id_table.clear();
        self.unmarshaled.clear();
        self.value_id_index = 1;
        self.class_graph_depth = 0;
        self.compact_id_cache.clear();
        self.factory_cache.clear();
        for frame in &mut self.frames {
            frame.clear();
        }
        self.depth = 0;
    }

    fn cur(&mut self) -> &mut InstanceData {
        assert!(self.depth > 0, "no instance is being decoded");
        &mut self.frames[self.depth - 1]
    }

    fn current_flags(&self) -> Option<u8> {
        if self.depth == 0 {
            None
        } else {
            Some(self.frames[self.depth - 1].flags)
        }
    }
}

/// State of one class or exception instance while its slices are decoded.
#[derive(Default)]
struct InstanceData {
    slice_type: SliceType,
    /// Set when the slice header was pre-read to find a factory; the next
    /// `start_slice` must not read it again.
    skip_first_slice: bool,

    // Current slice.
    flags: u8,
    type_id: String,
    compact_id: i32,
    slice_size: i32,
    indirection_table: Option<Vec<ClassRef>>,
    pos_after_indirection_table: Option<usize>,

    // Accumulated over the whole instance.
    slices: Vec<SliceInfo>,
    /// One table per preserved slice, in slice order.
    indirection_tables: Vec<Vec<ClassRef>>,
    /// Stream positions of skipped class-slice tables; 0 means the slice
    /// had none.
    deferred_indirection_tables: Vec<usize>,
}

impl InstanceData {
    fn clear(&mut self) {
        self.skip_first_slice = false;
        self.flags = 0;
        self.type_id.clear();
        self.compact_id = -1;
        self.slice_size = 0;
        self.indirection_table = None;
        self.pos_after_indirection_table = None;
        self.slices.clear();
        self.indirection_tables.clear();
        self.deferred_indirection_tables.clear();
    }
}

impl<'a> InputStream<'a> {
    pub(crate) fn decoder_mut(&mut self) -> &mut EncapsDecoder {
        self.ensure_encaps();
        self.encaps
            .last_mut()
            .expect("encapsulation stack is empty")
            .decoder
            .get_or_insert_with(EncapsDecoder::default)
    }

    fn cur_mut(&mut self) -> &mut InstanceData {
        self.decoder_mut().cur()
    }

    /// Header flags of the slice currently being decoded, if any.
    pub(crate) fn current_slice_flags(&self) -> Option<u8> {
        self.encaps.last()?.decoder.as_ref()?.current_flags()
    }

    fn push_instance(&mut self, slice_type: SliceType) {
        let decoder = self.decoder_mut();
        if decoder.depth == decoder.frames.len() {
            decoder.frames.push(InstanceData::default());
        }
        let frame = &mut decoder.frames[decoder.depth];
        frame.clear();
        frame.slice_type = slice_type;
        decoder.depth += 1;
    }

    fn pop_instance(&mut self) {
        let decoder = self.decoder_mut();
        decoder.cur().clear();
        decoder.depth -= 1;
    }

    fn inc_class_graph_depth(&mut self) -> Result<(), Error> {
        let max = self.engine.max_class_graph_depth();
        let decoder = self.decoder_mut();
        decoder.class_graph_depth += 1;
        ensure!(
            decoder.class_graph_depth <= max,
            Error::marshal("maximum class graph depth reached")
        );
        Ok(())
    }

    fn dec_class_graph_depth(&mut self) {
        self.decoder_mut().class_graph_depth -= 1;
    }

    /// Read a type id, either inline as a string (interning it) or as a
    /// 1-based index into the interning table.
    fn read_type_id(&mut self, is_index: bool) -> Result<String, Error> {
        if is_index {
            let index = self.read_size()?;
            let decoder = self.decoder_mut();
            if index < 1 || index as usize > decoder.type_id_table.len() {
                return Err(Error::marshal(format!("invalid type id index {index}")));
            }
            Ok(decoder.type_id_table[index as usize - 1].clone())
        } else {
            let type_id = self.read_string()?;
            self.decoder_mut().type_id_table.push(type_id.clone());
            Ok(type_id)
        }
    }

    // ------------------------------------------------------------------
    // Slice bracketing
    // ------------------------------------------------------------------

    /// Begin one slice of the instance under decode. Called by
    /// [`AnyClass::read`](crate::value::AnyClass::read) and
    /// [`UserException::read`](crate::value::UserException::read)
    /// implementations once per inheritance level, most derived first.
    pub fn start_slice(&mut self) -> Result<(), Error> {
        self.decoder_start_slice(true)
    }

    /// Finish the current slice: unread tagged members are skipped and the
    /// cursor lands after the slice's indirection table, if it had one.
    pub fn end_slice(&mut self) -> Result<(), Error> {
        let flags = self.cur_mut().flags;
        if flags & HAS_OPTIONAL_MEMBERS != 0 {
            self.skip_optionals()?;
        }
        if flags & HAS_INDIRECTION_TABLE != 0 {
            let after = {
                let cur = self.cur_mut();
                cur.indirection_table = None;
                cur.pos_after_indirection_table.take()
            };
            let after = after.ok_or_else(|| Error::marshal("indirection table was not read"))?;
            self.buf.seek(after)?;
        }
        Ok(())
    }

    fn decoder_start_slice(&mut self, read_indirection_table: bool) -> Result<(), Error> {
        let pre_read = {
            let cur = self.cur_mut();
            if cur.skip_first_slice {
                // Header already consumed while searching for a factory.
                cur.skip_first_slice = false;
                true
            } else {
                false
            }
        };
        if !pre_read {
            let flags = self.read_u8()?;
            self.cur_mut().flags = flags;
            if self.cur_mut().slice_type == SliceType::Class {
                // The compact-id bits must be checked first, the field is
                // two bits wide.
                if flags & HAS_TYPE_ID_COMPACT == HAS_TYPE_ID_COMPACT {
                    let id = self.read_size()?;
                    let cur = self.cur_mut();
                    cur.type_id.clear();
                    cur.compact_id = id;
                } else if flags & (HAS_TYPE_ID_INDEX | HAS_TYPE_ID_STRING) != 0 {
                    let type_id = self.read_type_id(flags & HAS_TYPE_ID_INDEX != 0)?;
                    let cur = self.cur_mut();
                    cur.type_id = type_id;
                    cur.compact_id = -1;
                } else {
                    // Only the most derived slice carries a type id in the
                    // compact format.
                    let cur = self.cur_mut();
                    cur.type_id.clear();
                    cur.compact_id = -1;
                }
            } else {
                // Exception slices always spell the type id out.
                let type_id = self.read_string()?;
                let cur = self.cur_mut();
                cur.type_id = type_id;
                cur.compact_id = -1;
            }
            if flags & HAS_SLICE_SIZE != 0 {
                let sz = self.read_i32()?;
                ensure!(sz >= 4, Error::marshal(format!("invalid slice size {sz}")));
                self.cur_mut().slice_size = sz;
            } else {
                self.cur_mut().slice_size = 0;
            }
        }

        if read_indirection_table {
            let (flags, slice_size, already_read) = {
                let cur = self.cur_mut();
                (cur.flags, cur.slice_size, cur.indirection_table.is_some())
            };
            if flags & HAS_INDIRECTION_TABLE != 0 && !already_read {
                // The table sits after the slice body; hop over the body,
                // decode the table so member references can resolve against
                // it, then come back.
                ensure!(
                    flags & HAS_SLICE_SIZE != 0,
                    Error::marshal("indirection table requires a slice size")
                );
                let body_start = self.buf.pos();
                self.buf.seek(body_start + slice_size as usize - 4)?;
                let table = self.read_indirection_table()?;
                let after = self.buf.pos();
                let cur = self.cur_mut();
                cur.indirection_table = Some(table);
                cur.pos_after_indirection_table = Some(after);
                self.buf.seek(body_start)?;
            }
        }
        Ok(())
    }

    /// Step over a slice whose type is not known locally, preserving its
    /// bytes and indirection table for later re-serialization.
    fn skip_slice(&mut self) -> Result<(), Error> {
        let (slice_type, flags, type_id, compact_id, slice_size) = {
            let cur = self.cur_mut();
            (
                cur.slice_type,
                cur.flags,
                cur.type_id.clone(),
                cur.compact_id,
                cur.slice_size,
            )
        };
        if self.engine.traces_slicing() {
            let kind = match slice_type {
                SliceType::Class => "class",
                SliceType::Exception => "exception",
            };
            trace!(
                target: "floe::slicing",
                "unknown {kind} type `{}', skipping slice",
                display_type_id(&type_id, compact_id)
            );
        }
        let start = self.buf.pos();
        if flags & HAS_SLICE_SIZE != 0 {
            self.buf.skip(slice_size as usize - 4)?;
        } else if slice_type == SliceType::Class {
            // Without a size the slice cannot be stepped over; the compact
            // format does not support unknown class types.
            return Err(Error::no_class_factory(display_type_id(
                &type_id, compact_id,
            )));
        } else {
            return Err(Error::unknown_user_exception(strip_global_scope(&type_id)));
        }

        let mut body_end = self.buf.pos();
        if flags & HAS_OPTIONAL_MEMBERS != 0 {
            // The tagged end marker is re-written when the slice is
            // re-serialized; keep it out of the preserved bytes.
            body_end -= 1;
        }
        let info = SliceInfo {
            type_id: type_id.clone(),
            compact_id,
            bytes: self.buf.sub_slice(start, body_end)?.to_vec(),
            instances: Vec::new(),
            has_optional_members: flags & HAS_OPTIONAL_MEMBERS != 0,
            is_last_slice: flags & IS_LAST_SLICE != 0,
        };

        if slice_type == SliceType::Class {
            // The table may reference the very instance being built, so it
            // can only be decoded after registration. Remember where it
            // starts and step over it.
            let pos = if flags & HAS_INDIRECTION_TABLE != 0 {
                let pos = self.buf.pos();
                self.skip_indirection_table()?;
                pos
            } else {
                0
            };
            self.cur_mut().deferred_indirection_tables.push(pos);
        } else {
            // Exception tables were already read ahead by start_slice; take
            // the cached table and step over its wire bytes.
            let table = if flags & HAS_INDIRECTION_TABLE != 0 {
                let (cached, after) = {
                    let cur = self.cur_mut();
                    (
                        cur.indirection_table.take(),
                        cur.pos_after_indirection_table.take(),
                    )
                };
                match (cached, after) {
                    (Some(table), Some(after)) => {
                        self.buf.seek(after)?;
                        table
                    }
                    _ => self.read_indirection_table()?,
                }
            } else {
                Vec::new()
            };
            self.cur_mut().indirection_tables.push(table);
        }
        self.cur_mut().slices.push(info);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Indirection tables
    // ------------------------------------------------------------------

    fn read_indirection_table(&mut self) -> Result<Vec<ClassRef>, Error> {
        let sz = self.read_and_check_seq_size(1)?;
        ensure!(sz > 0, Error::marshal("invalid indirection table size"));
        let mut table = Vec::with_capacity(sz);
        for _ in 0..sz {
            let index = self.read_size()?;
            table.push(self.read_instance(index)?);
        }
        Ok(table)
    }

    /// Step over an indirection table without materializing its entries.
    /// Inline instances are walked slice by slice; type-id reads along the
    /// way keep the interning table consistent.
    fn skip_indirection_table(&mut self) -> Result<(), Error> {
        let sz = self.read_and_check_seq_size(1)?;
        for _ in 0..sz {
            let index = self.read_size()?;
            ensure!(
                index > 0,
                Error::marshal(format!("invalid object id {index} in indirection table"))
            );
            if index == 1 {
                self.inc_class_graph_depth()?;
                loop {
                    let flags = self.read_u8()?;
                    if flags & HAS_TYPE_ID_COMPACT == HAS_TYPE_ID_COMPACT {
                        self.read_size()?;
                    } else if flags & (HAS_TYPE_ID_INDEX | HAS_TYPE_ID_STRING) != 0 {
                        self.read_type_id(flags & HAS_TYPE_ID_INDEX != 0)?;
                    }
                    ensure!(
                        flags & HAS_SLICE_SIZE != 0,
                        Error::marshal("instance in indirection table has no slice size")
                    );
                    let sz = self.read_i32()?;
                    ensure!(sz >= 4, Error::marshal(format!("invalid slice size {sz}")));
                    self.buf.skip(sz as usize - 4)?;
                    if flags & HAS_INDIRECTION_TABLE != 0 {
                        self.skip_indirection_table()?;
                    }
                    if flags & IS_LAST_SLICE != 0 {
                        break;
                    }
                }
                self.dec_class_graph_depth();
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    /// Read a class reference: `None` for the null instance, a shared
    /// handle otherwise. Back and forward references resolve through the
    /// current slice's indirection table or the unmarshaled map.
    pub fn read_class(&mut self) -> Result<Option<ClassRef>, Error> {
        ensure!(
            self.encoding() != EncodingVersion::V1_0,
            Error::marshal("class decoding is not supported with encoding 1.0")
        );
        let index = self.read_size()?;
        if index < 0 {
            return Err(Error::marshal("invalid object id"));
        }
        if index == 0 {
            return Ok(None);
        }
        if self
            .current_slice_flags()
            .is_some_and(|f| f & HAS_INDIRECTION_TABLE != 0)
        {
            // Inside a table-bearing slice the reference is a 1-based index
            // into that table.
            let entry = match &self.cur_mut().indirection_table {
                Some(table) => table.get(index as usize - 1).cloned(),
                None => return Err(Error::marshal("indirection table was not read")),
            };
            return entry.map(Some).ok_or_else(|| {
                Error::marshal(format!("indirection table index {index} is out of range"))
            });
        }
        self.read_instance(index).map(Some)
    }

    fn read_instance(&mut self, index: i32) -> Result<ClassRef, Error> {
        ensure!(
            index > 0,
            Error::marshal(format!("invalid object id {index}"))
        );
        if index > 1 {
            // A reference to an instance encountered earlier in this
            // encapsulation.
            return self
                .decoder_mut()
                .unmarshaled
                .get(&index)
                .cloned()
                .ok_or_else(|| {
                    Error::marshal(format!("could not find index {index} in the unmarshaled map"))
                });
        }

        // index == 1: the instance is marshaled inline right here.
        self.push_instance(SliceType::Class);
        let new_index = {
            let decoder = self.decoder_mut();
            decoder.value_id_index += 1;
            decoder.value_id_index
        };
        self.decoder_start_slice(false)?;
        let most_derived_id = self.cur_mut().type_id.clone();

        let mut matched = true;
        let v: ClassRef = loop {
            // A compact id resolves to a type id through the per-encaps
            // cache, the external resolver, then the registry table.
            let compact_id = self.cur_mut().compact_id;
            if compact_id >= 0 && self.cur_mut().type_id.is_empty() {
                if let Some(type_id) = self.resolve_compact_id(compact_id)? {
                    self.cur_mut().type_id = type_id;
                }
            }
            let type_id = self.cur_mut().type_id.clone();
            if !type_id.is_empty() {
                if let Some(factory) = self.class_factory_for(&type_id) {
                    break factory();
                }
            }
            if !self.engine.can_slice_classes() {
                return Err(Error::no_class_factory(display_type_id(
                    &type_id, compact_id,
                )));
            }
            self.skip_slice()?;
            if self.cur_mut().flags & IS_LAST_SLICE != 0 {
                matched = false;
                // Last chance: a factory registered for the hierarchy root
                // may supply a stand-in; otherwise the instance stays
                // opaque.
                match self.class_factory_for(ROOT_OBJECT_ID) {
                    Some(factory) => break factory(),
                    None => {
                        break Rc::new(RefCell::new(UnknownSlicedClass::new(
                            most_derived_id.clone(),
                        ))) as ClassRef
                    }
                }
            }
            self.decoder_start_slice(false)?;
        };

        self.inc_class_graph_depth()?;
        // Register the handle before filling it: a cyclic reference inside
        // the members must find this instance in the unmarshaled map.
        self.decoder_mut().unmarshaled.insert(new_index, v.clone());

        // Indirection tables of skipped slices were deferred until the
        // instance became visible; replay them now.
        let deferred = mem::take(&mut self.cur_mut().deferred_indirection_tables);
        if !deferred.is_empty() {
            let saved = self.buf.pos();
            for pos in deferred {
                let table = if pos == 0 {
                    Vec::new()
                } else {
                    self.buf.seek(pos)?;
                    self.read_indirection_table()?
                };
                self.cur_mut().indirection_tables.push(table);
            }
            self.buf.seek(saved)?;
        }

        if matched {
            // The matched slice's header is already consumed; the value's
            // read starts with the member data.
            self.cur_mut().skip_first_slice = true;
            v.borrow_mut().read(self)?;
        }
        self.end_instance(&v);
        self.dec_class_graph_depth();
        Ok(v)
    }

    fn end_instance(&mut self, v: &ClassRef) {
        let preserve =
            self.engine.should_preserve_slices() || v.borrow().preserves_slices();
        if let Some(data) = self.take_sliced_data() {
            if preserve {
                v.borrow_mut().set_sliced_data(data);
            }
        }
        self.pop_instance();
    }

    /// Zip the preserved slices with their indirection tables and clear the
    /// frame's accumulation buffers.
    fn take_sliced_data(&mut self) -> Option<SlicedData> {
        let (mut slices, tables) = {
            let cur = self.cur_mut();
            (
                mem::take(&mut cur.slices),
                mem::take(&mut cur.indirection_tables),
            )
        };
        if slices.is_empty() {
            return None;
        }
        for (info, table) in slices.iter_mut().zip(tables) {
            info.instances = table;
        }
        Some(SlicedData { slices })
    }

    fn resolve_compact_id(&mut self, compact_id: i32) -> Result<Option<String>, Error> {
        if let Some(type_id) = self.decoder_mut().compact_id_cache.get(&compact_id) {
            return Ok(Some(type_id.clone()));
        }
        let resolved = match self.engine.resolver().external_compact_id(compact_id) {
            Ok(Some(type_id)) => Some(type_id),
            Ok(None) => self
                .engine
                .resolver()
                .resolve_compact_id(compact_id)
                .map(str::to_owned),
            Err(e) => {
                return Err(Error::marshal(format!(
                    "exception in compact id resolver for id {compact_id}: {e}"
                )))
            }
        };
        if let Some(type_id) = &resolved {
            self.decoder_mut()
                .compact_id_cache
                .insert(compact_id, type_id.clone());
        }
        Ok(resolved)
    }

    fn class_factory_for(&mut self, type_id: &str) -> Option<ClassFactory> {
        if let Some(cached) = self.decoder_mut().factory_cache.get(type_id) {
            return cached.clone();
        }
        let factory = self.engine.resolver().class_factory(type_id);
        self.decoder_mut()
            .factory_cache
            .insert(type_id.to_owned(), factory.clone());
        factory
    }

    // ------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------

    /// Decode a user exception and hand it to the caller. `factory` is
    /// consulted before the registry for every slice's type id. Unknown
    /// derived slices are skipped; when the whole chain is unknown the
    /// result is [`Error::UnknownUserException`].
    pub fn read_exception(
        &mut self,
        factory: Option<&dyn Fn(&str) -> Option<Box<dyn UserException>>>,
    ) -> Result<Box<dyn UserException>, Error> {
        ensure!(
            self.encoding() != EncodingVersion::V1_0,
            Error::marshal("exception decoding is not supported with encoding 1.0")
        );
        self.push_instance(SliceType::Exception);
        self.decoder_start_slice(true)?;
        let most_derived_id = self.cur_mut().type_id.clone();
        loop {
            let type_id = self.cur_mut().type_id.clone();
            let mut ex = factory.and_then(|f| f(&type_id));
            if ex.is_none() {
                ex = self.engine.resolver().new_exception(&type_id);
            }
            if let Some(mut ex) = ex {
                self.cur_mut().skip_first_slice = true;
                ex.read(self)?;
                let preserve = self.engine.should_preserve_slices();
                if let Some(data) = self.take_sliced_data() {
                    if preserve {
                        ex.set_sliced_data(data);
                    }
                }
                self.pop_instance();
                return Ok(ex);
            }
            self.skip_slice()?;
            if self.cur_mut().flags & IS_LAST_SLICE != 0 {
                return Err(Error::unknown_user_exception(strip_global_scope(
                    &most_derived_id,
                )));
            }
            self.decoder_start_slice(true)?;
        }
    }
}

fn display_type_id(type_id: &str, compact_id: i32) -> String {
    if type_id.is_empty() && compact_id >= 0 {
        format!("{compact_id} (compact)")
    } else {
        type_id.to_owned()
    }
}

fn strip_global_scope(type_id: &str) -> &str {
    type_id.strip_prefix("::").unwrap_or(type_id)
}
