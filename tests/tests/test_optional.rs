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

//! Tagged (optional) member scanning and skipping.

use floe_core::{EncodingVersion, Error, Floe, OptionalFormat};
use floe_tests::WireWriter;

#[test]
fn absent_member_stops_at_the_end_marker() {
    let mut w = WireWriter::new();
    let e = w.begin_encaps();
    w.write_u8(0xFF);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    assert!(!stream.read_optional(5, OptionalFormat::F4).unwrap());
    // The cursor still points at the marker byte.
    assert_eq!(stream.pos(), 6);
    assert_eq!(stream.peek_u8().unwrap(), 0xFF);
    stream.end_encapsulation().unwrap();
}

#[test]
fn present_f4_member() {
    let bytes = [
        0x0C, 0, 0, 0, 0x01, 0x01, 0x2C, 0xDE, 0xAD, 0xBE, 0xEF, 0xFF,
    ];
    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    assert!(stream.read_optional(5, OptionalFormat::F4).unwrap());
    assert_eq!(stream.read_i32().unwrap() as u32, 0xEFBE_ADDE);
    assert!(!stream.read_optional(6, OptionalFormat::F1).unwrap());
    stream.end_encapsulation().unwrap();
}

#[test]
fn lower_tags_are_skipped_over() {
    let mut w = WireWriter::new();
    let e = w.begin_encaps();
    w.write_tag(1, OptionalFormat::F1);
    w.write_u8(0x11);
    w.write_tag(3, OptionalFormat::VSize);
    w.write_size(2);
    w.write_bytes(&[0x22, 0x33]);
    w.write_tag(5, OptionalFormat::F4);
    w.write_i32(1234);
    w.write_u8(0xFF);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    assert!(stream.read_optional(5, OptionalFormat::F4).unwrap());
    assert_eq!(stream.read_i32().unwrap(), 1234);
    stream.end_encapsulation().unwrap();
}

#[test]
fn querying_a_missing_middle_tag_consumes_nothing_extra() {
    let mut w = WireWriter::new();
    let e = w.begin_encaps();
    w.write_tag(8, OptionalFormat::F2);
    w.write_i16(77);
    w.write_u8(0xFF);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    let before = stream.pos();
    assert!(!stream.read_optional(2, OptionalFormat::F1).unwrap());
    assert_eq!(stream.pos(), before);
    // The later tag is still reachable.
    assert!(stream.read_optional(8, OptionalFormat::F2).unwrap());
    assert_eq!(stream.read_i16().unwrap(), 77);
    stream.end_encapsulation().unwrap();
}

#[test]
fn format_mismatch_is_a_marshal_error() {
    let mut w = WireWriter::new();
    let e = w.begin_encaps();
    w.write_tag(5, OptionalFormat::F4);
    w.write_i32(0);
    w.write_u8(0xFF);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    assert!(matches!(
        stream.read_optional(5, OptionalFormat::F2),
        Err(Error::Marshal(_))
    ));
}

#[test]
fn wide_tags_use_the_size_escape() {
    let mut w = WireWriter::new();
    let e = w.begin_encaps();
    w.write_tag(40, OptionalFormat::F1);
    w.write_u8(0x55);
    w.write_u8(0xFF);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    // Query below the stored tag first: the two-byte header is rewound.
    let before = stream.pos();
    assert!(!stream.read_optional(7, OptionalFormat::F1).unwrap());
    assert_eq!(stream.pos(), before);
    assert!(stream.read_optional(40, OptionalFormat::F1).unwrap());
    assert_eq!(stream.read_u8().unwrap(), 0x55);
    stream.end_encapsulation().unwrap();
}

#[test]
fn very_wide_tags_rewind_six_bytes() {
    let mut w = WireWriter::new();
    let e = w.begin_encaps();
    w.write_tag(300, OptionalFormat::F8);
    w.write_i64(-1);
    w.write_u8(0xFF);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    let before = stream.pos();
    assert!(!stream.read_optional(7, OptionalFormat::F1).unwrap());
    assert_eq!(stream.pos(), before);
    assert!(stream.read_optional(300, OptionalFormat::F8).unwrap());
    assert_eq!(stream.read_i64().unwrap(), -1);
    stream.end_encapsulation().unwrap();
}

#[test]
fn every_width_class_can_be_skipped() {
    let mut w = WireWriter::new();
    let e = w.begin_encaps();
    w.write_tag(1, OptionalFormat::F8);
    w.write_i64(0);
    w.write_tag(2, OptionalFormat::Size);
    w.write_size(500);
    w.write_tag(3, OptionalFormat::VSize);
    w.write_size(3);
    w.write_bytes(&[1, 2, 3]);
    w.write_tag(4, OptionalFormat::FSize);
    w.write_i32(2);
    w.write_bytes(&[8, 9]);
    w.write_tag(5, OptionalFormat::Class);
    w.write_size(0); // null class reference
    w.write_tag(9, OptionalFormat::F1);
    w.write_u8(0x77);
    w.write_u8(0xFF);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    assert!(stream.read_optional(9, OptionalFormat::F1).unwrap());
    assert_eq!(stream.read_u8().unwrap(), 0x77);
    stream.end_encapsulation().unwrap();
}

#[test]
fn negative_fsize_is_rejected() {
    let mut w = WireWriter::new();
    let e = w.begin_encaps();
    w.write_tag(1, OptionalFormat::FSize);
    w.write_i32(-5);
    w.write_u8(0xFF);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    assert!(matches!(
        stream.read_optional(2, OptionalFormat::F1),
        Err(Error::OutOfBounds(_))
    ));
}

#[test]
fn encoding_1_0_has_no_tagged_members() {
    let mut w = WireWriter::new();
    let e = w.begin_encaps_with(1, 0);
    w.write_u8(0x2C);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    let before = stream.pos();
    assert!(!stream.read_optional(5, OptionalFormat::F4).unwrap());
    assert_eq!(stream.pos(), before);

    // Outside any encapsulation the engine default decides.
    let engine = Floe::default().encoding(EncodingVersion::V1_0);
    let mut stream = engine.input(&[0x2C]);
    assert!(!stream.read_optional(5, OptionalFormat::F4).unwrap());
}

#[test]
fn end_of_encapsulation_terminates_the_scan() {
    // No end marker at all: the encapsulation boundary stops the search.
    let mut w = WireWriter::new();
    let e = w.begin_encaps();
    w.write_tag(1, OptionalFormat::F1);
    w.write_u8(0x10);
    w.end_encaps(e);
    let bytes = w.into_bytes();

    let engine = Floe::default();
    let mut stream = engine.input(&bytes);
    stream.start_encapsulation().unwrap();
    assert!(!stream.read_optional(5, OptionalFormat::F4).unwrap());
    stream.end_encapsulation().unwrap();
}
