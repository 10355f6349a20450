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

//! # Floe Core
//!
//! Input-side decoder for the Slice binary encoding, version 1.1: a
//! contiguous little-endian buffer carrying a typed value graph is turned
//! into in-memory values — primitives, sequences, strings, proxies,
//! enumerations, user exceptions, and polymorphic class instances encoded
//! as inheritance slices.
//!
//! ## Architecture
//!
//! - **`buffer`**: bounded little-endian cursor and compact size integers
//! - **`stream`**: the [`InputStream`] decoding surface — encapsulations,
//!   primitives, sequences, tagged members, enums, proxies
//! - **`decoder`**: slice state machine, class graph and exception decoding
//! - **`resolver`**: the runtime registry mapping type ids to constructors
//! - **`value`**: polymorphic roots ([`AnyClass`], [`UserException`]) and
//!   preserved slice data
//! - **`floe`**: the [`Floe`] engine tying configuration and registry
//!   together
//! - **`types`**, **`error`**: wire constants and failure kinds
//!
//! ## Key concepts
//!
//! Classes decode through a runtime registry, not language inheritance: a
//! wire type id maps to a registered constructor, and instances of unknown
//! derived types are *sliced* down to the closest registered base while the
//! dropped slices are preserved for re-serialization. Back-references and
//! cycles resolve through a per-encapsulation unmarshaled map: an instance
//! handle is registered before its members are read.
//!
//! Hostile input is bounded twice over: every announced sequence is charged
//! against the buffer size before anything is allocated, and class graphs
//! deeper than the configured maximum are rejected.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use floe_core::floe::Floe;
//!
//! let mut engine = Floe::default();
//! engine.register_class::<Point>("::Demo::Point");
//!
//! let mut stream = engine.input(&bytes);
//! stream.start_encapsulation()?;
//! let p = stream.read_class()?;
//! stream.end_encapsulation()?;
//! ```

pub mod buffer;
mod decoder;
mod encaps;
pub mod error;
pub mod floe;
pub mod resolver;
pub mod stream;
pub mod types;
pub mod value;

pub use error::Error;
pub use floe::Floe;
pub use resolver::type_resolver::TypeResolver;
pub use stream::InputStream;
pub use types::{EncodingVersion, OptionalFormat};
pub use value::{
    AnyClass, ClassRef, Identity, SliceInfo, SlicedData, UnknownSlicedClass, UserException,
};
