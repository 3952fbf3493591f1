//! Binary tile format codec.
//!
//! Serializes a tile's feature graph to a compact, versioned, big-endian
//! byte layout and back:
//!
//! ```text
//! u16 version              -- 0
//! u16 string_count
//!   string_count × { u16 byte_length, UTF-8 bytes }
//! u32 node_count
//!   node_count × { u64 id, i32 lat_fixed, i32 lon_fixed,
//!                  u16 tag_count × { u16 key_index, u16 value_index } }
//! u32 way_count
//!   way_count × { u64 id, u16 ref_count × u64 node_id,
//!                 u16 tag_count × { u16 key_index, u16 value_index } }
//! ```
//!
//! Tag keys and values are interned into the string table ([`strings`]);
//! coordinates are fixed-point degrees × 1e7 ([`crate::coord`]).
//!
//! Encoding is canonical: nodes, ways, and tags live in ordered maps, so one
//! `FeatureSet` always produces one byte sequence. Decoding is total over any
//! encoder output (see the round-trip property test) and fails fast with an
//! offset-carrying error on anything malformed.

mod error;
pub mod strings;

pub use error::CodecError;

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use strings::StringTable;

/// The only wire format version this codec reads or writes.
pub const FORMAT_VERSION: u16 = 0;

/// Largest tag count one feature can carry on the wire.
const MAX_TAGS: usize = u16::MAX as usize;

/// Largest node-reference count one way can carry on the wire.
const MAX_NODE_REFS: usize = u16::MAX as usize;

/// A point feature with fixed-point coordinates and tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    /// Latitude in degrees × 1e7.
    pub lat: i32,
    /// Longitude in degrees × 1e7.
    pub lon: i32,
    /// Key/value tags.
    pub tags: BTreeMap<String, String>,
}

/// An ordered path of node references with tags.
///
/// `node_refs` may point at nodes outside this tile; referential integrity
/// across the tile boundary is not checked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Way {
    /// Ordered node ids forming the way.
    pub node_refs: Vec<u64>,
    /// Key/value tags.
    pub tags: BTreeMap<String, String>,
}

/// The decoded form of one tile payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureSet {
    /// Nodes by id.
    pub nodes: BTreeMap<u64, Node>,
    /// Ways by id.
    pub ways: BTreeMap<u64, Way>,
}

impl FeatureSet {
    /// Encode this feature set into the binary tile format.
    ///
    /// # Errors
    ///
    /// Fails without producing any bytes when the feature set exceeds a
    /// format capacity: `StringTableOverflow`, `StringTooLong`,
    /// `TooManyTags`, or `TooManyNodeRefs`.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut table = StringTable::new();

        // Feature records are encoded first so the string table is complete
        // before the header is written.
        let mut body = BytesMut::new();

        body.put_u32(self.nodes.len() as u32);
        for (&id, node) in &self.nodes {
            body.put_u64(id);
            body.put_i32(node.lat);
            body.put_i32(node.lon);
            encode_tags(&mut body, &mut table, "node", id, &node.tags)?;
        }

        body.put_u32(self.ways.len() as u32);
        for (&id, way) in &self.ways {
            body.put_u64(id);
            if way.node_refs.len() > MAX_NODE_REFS {
                return Err(CodecError::TooManyNodeRefs {
                    id,
                    count: way.node_refs.len(),
                });
            }
            body.put_u16(way.node_refs.len() as u16);
            for &node_ref in &way.node_refs {
                body.put_u64(node_ref);
            }
            encode_tags(&mut body, &mut table, "way", id, &way.tags)?;
        }

        let mut out = BytesMut::with_capacity(4 + body.len());
        out.put_u16(FORMAT_VERSION);
        out.put_u16(table.len() as u16);
        for s in table.entries() {
            if s.len() > MAX_STRING_LEN {
                return Err(CodecError::StringTooLong { len: s.len() });
            }
            out.put_u16(s.len() as u16);
            out.put_slice(s.as_bytes());
        }
        out.extend_from_slice(&body);
        Ok(out.freeze())
    }

    /// Decode a binary tile payload.
    ///
    /// Trailing bytes after the final way record are ignored.
    ///
    /// # Errors
    ///
    /// - `UnsupportedVersion` when the version field is nonzero
    /// - `Truncated` when any declared length runs past the buffer
    /// - `InvalidString` when a string table entry is not UTF-8
    /// - `StringIndexOutOfRange` when a tag references a missing entry
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(data);

        let version = reader.read_u16("version")?;
        if version != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let string_count = reader.read_u16("string_count")?;
        let mut entries = Vec::with_capacity(string_count as usize);
        for _ in 0..string_count {
            let len = reader.read_u16("string_length")?;
            let raw = reader.take(len as usize, "string_bytes")?;
            let index = entries.len();
            entries.push(
                String::from_utf8(raw.to_vec())
                    .map_err(|source| CodecError::InvalidString { index, source })?,
            );
        }
        let table = StringTable::from_entries(entries);

        let node_count = reader.read_u32("node_count")?;
        let mut nodes = BTreeMap::new();
        for _ in 0..node_count {
            let id = reader.read_u64("node_id")?;
            let lat = reader.read_i32("node_lat")?;
            let lon = reader.read_i32("node_lon")?;
            let tags = decode_tags(&mut reader, &table)?;
            nodes.insert(id, Node { lat, lon, tags });
        }

        let way_count = reader.read_u32("way_count")?;
        let mut ways = BTreeMap::new();
        for _ in 0..way_count {
            let id = reader.read_u64("way_id")?;
            let ref_count = reader.read_u16("node_ref_count")?;
            let mut node_refs = Vec::with_capacity(ref_count as usize);
            for _ in 0..ref_count {
                node_refs.push(reader.read_u64("node_ref")?);
            }
            let tags = decode_tags(&mut reader, &table)?;
            ways.insert(id, Way { node_refs, tags });
        }

        Ok(Self { nodes, ways })
    }
}

/// Largest single string the u16 length prefix can describe.
const MAX_STRING_LEN: usize = u16::MAX as usize;

fn encode_tags(
    body: &mut BytesMut,
    table: &mut StringTable,
    kind: &'static str,
    id: u64,
    tags: &BTreeMap<String, String>,
) -> Result<(), CodecError> {
    if tags.len() > MAX_TAGS {
        return Err(CodecError::TooManyTags {
            kind,
            id,
            count: tags.len(),
        });
    }
    body.put_u16(tags.len() as u16);
    for (key, value) in tags {
        body.put_u16(table.intern(key)?);
        body.put_u16(table.intern(value)?);
    }
    Ok(())
}

fn decode_tags(
    reader: &mut Reader<'_>,
    table: &StringTable,
) -> Result<BTreeMap<String, String>, CodecError> {
    let count = reader.read_u16("tag_count")?;
    let mut tags = BTreeMap::new();
    for _ in 0..count {
        let key = table.lookup(reader.read_u16("tag_key_index")?)?;
        let value = table.lookup(reader.read_u16("tag_value_index")?)?;
        tags.insert(key.to_owned(), value.to_owned());
    }
    Ok(tags)
}

/// Bounds-checked big-endian cursor over a payload buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Consume `len` bytes, or fail with the field name and offset.
    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        let available = self.buf.len() - self.pos;
        if available < len {
            return Err(CodecError::Truncated {
                field,
                offset: self.pos,
                needed: len - available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u16(&mut self, field: &'static str) -> Result<u16, CodecError> {
        let raw = self.take(2, field)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        let raw = self.take(4, field)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        let raw = self.take(8, field)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Ok(u64::from_be_bytes(bytes))
    }

    fn read_i32(&mut self, field: &'static str) -> Result<i32, CodecError> {
        let raw = self.take(4, field)?;
        Ok(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    fn sample_set() -> FeatureSet {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            101,
            Node {
                lat: 405_012_345,
                lon: -74_054_321,
                tags: tags(&[("amenity", "cafe"), ("name", "Corner Cafe")]),
            },
        );
        nodes.insert(
            102,
            Node {
                lat: 405_098_765,
                lon: -74_012_345,
                tags: BTreeMap::new(),
            },
        );
        let mut ways = BTreeMap::new();
        ways.insert(
            201,
            Way {
                // the dangling ref 999 is allowed: integrity across the
                // tile boundary is not checked
                node_refs: vec![101, 102, 999],
                tags: tags(&[("highway", "residential"), ("name", "Corner Cafe")]),
            },
        );
        FeatureSet { nodes, ways }
    }

    #[test]
    fn test_round_trip_sample() {
        let original = sample_set();
        let encoded = original.encode().unwrap();
        let decoded = FeatureSet::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_empty_set_layout() {
        let encoded = FeatureSet::default().encode().unwrap();
        // version, string_count, node_count, way_count
        assert_eq!(
            encoded.as_ref(),
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0][..]
        );
    }

    #[test]
    fn test_exact_wire_layout() {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            1,
            Node {
                lat: 2,
                lon: 3,
                tags: tags(&[("a", "b")]),
            },
        );
        let set = FeatureSet {
            nodes,
            ways: BTreeMap::new(),
        };
        let encoded = set.encode().unwrap();

        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            0x00, 0x00,                                     // version
            0x00, 0x02,                                     // string_count
            0x00, 0x01, b'a',                               // "a"
            0x00, 0x01, b'b',                               // "b"
            0x00, 0x00, 0x00, 0x01,                         // node_count
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, // node id 1
            0x00, 0x00, 0x00, 0x02,                         // lat 2
            0x00, 0x00, 0x00, 0x03,                         // lon 3
            0x00, 0x01,                                     // tag_count
            0x00, 0x00, 0x00, 0x01,                         // key "a", value "b"
            0x00, 0x00, 0x00, 0x00,                         // way_count
        ];
        assert_eq!(encoded.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let set = sample_set();
        assert_eq!(set.encode().unwrap(), set.encode().unwrap());
    }

    #[test]
    fn test_strings_interned_across_features() {
        // "name" and "Corner Cafe" appear on both a node and a way; the
        // table must hold each once
        let encoded = sample_set().encode().unwrap();
        let string_count = u16::from_be_bytes([encoded[2], encoded[3]]);
        assert_eq!(string_count, 6);
    }

    #[test]
    fn test_negative_coordinates_survive() {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            7,
            Node {
                lat: -900_000_000,
                lon: -1_800_000_000,
                tags: BTreeMap::new(),
            },
        );
        let set = FeatureSet {
            nodes,
            ways: BTreeMap::new(),
        };
        let decoded = FeatureSet::decode(&set.encode().unwrap()).unwrap();
        assert_eq!(decoded.nodes[&7].lat, -900_000_000);
        assert_eq!(decoded.nodes[&7].lon, -1_800_000_000);
    }

    #[test]
    fn test_decode_rejects_unsupported_version() {
        let encoded = FeatureSet::default().encode().unwrap();
        let mut tampered = encoded.to_vec();
        tampered[1] = 1;
        let err = FeatureSet::decode(&tampered).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion(1)));
    }

    #[test]
    fn test_decode_rejects_truncated_header() {
        let err = FeatureSet::decode(&[0x00]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                field: "version",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_string() {
        // one declared string of 5 bytes, only 2 supplied
        let buf = [0x00, 0x00, 0x00, 0x01, 0x00, 0x05, b'h', b'i'];
        let err = FeatureSet::decode(&buf).unwrap_err();
        match err {
            CodecError::Truncated {
                field,
                offset,
                needed,
            } => {
                assert_eq!(field, "string_bytes");
                assert_eq!(offset, 6);
                assert_eq!(needed, 3);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_truncated_body() {
        let encoded = sample_set().encode().unwrap();
        let err = FeatureSet::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn test_decode_rejects_dangling_string_index() {
        // empty string table, one node with a tag referencing entry 0
        #[rustfmt::skip]
        let buf = [
            0x00, 0x00,                                     // version
            0x00, 0x00,                                     // string_count
            0x00, 0x00, 0x00, 0x01,                         // node_count
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, // id
            0x00, 0x00, 0x00, 0x00,                         // lat
            0x00, 0x00, 0x00, 0x00,                         // lon
            0x00, 0x01,                                     // tag_count
            0x00, 0x00, 0x00, 0x00,                         // key 0, value 0
        ];
        let err = FeatureSet::decode(&buf).unwrap_err();
        assert!(matches!(
            err,
            CodecError::StringIndexOutOfRange { index: 0, len: 0 }
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let buf = [0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0xff, 0xfe];
        let err = FeatureSet::decode(&buf).unwrap_err();
        assert!(matches!(err, CodecError::InvalidString { index: 0, .. }));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut padded = sample_set().encode().unwrap().to_vec();
        padded.extend_from_slice(&[0xde, 0xad]);
        let decoded = FeatureSet::decode(&padded).unwrap();
        assert_eq!(decoded, sample_set());
    }

    #[test]
    fn test_encode_rejects_too_many_tags() {
        let mut huge = BTreeMap::new();
        for i in 0..=MAX_TAGS {
            huge.insert(format!("k{i}"), String::new());
        }
        let mut nodes = BTreeMap::new();
        nodes.insert(
            1,
            Node {
                lat: 0,
                lon: 0,
                tags: huge,
            },
        );
        let set = FeatureSet {
            nodes,
            ways: BTreeMap::new(),
        };
        let err = set.encode().unwrap_err();
        assert!(matches!(
            err,
            CodecError::TooManyTags {
                kind: "node",
                id: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_encode_rejects_too_many_node_refs() {
        let mut ways = BTreeMap::new();
        ways.insert(
            9,
            Way {
                node_refs: vec![0; MAX_NODE_REFS + 1],
                tags: BTreeMap::new(),
            },
        );
        let set = FeatureSet {
            nodes: BTreeMap::new(),
            ways,
        };
        let err = set.encode().unwrap_err();
        assert!(matches!(err, CodecError::TooManyNodeRefs { id: 9, .. }));
    }

    #[test]
    fn test_encode_rejects_string_table_overflow() {
        // distinct values on one feature's tags overflow the shared table
        let mut huge = BTreeMap::new();
        for i in 0..(MAX_TAGS / 2) {
            huge.insert(format!("key-{i}"), format!("value-{i}"));
        }
        let mut nodes = BTreeMap::new();
        for id in 0..2u64 {
            nodes.insert(
                id,
                Node {
                    lat: 0,
                    lon: 0,
                    tags: if id == 0 {
                        huge.clone()
                    } else {
                        let mut more = BTreeMap::new();
                        for i in 0..(MAX_TAGS / 2) {
                            more.insert(format!("other-{i}"), format!("extra-{i}"));
                        }
                        more
                    },
                },
            );
        }
        let set = FeatureSet {
            nodes,
            ways: BTreeMap::new(),
        };
        let err = set.encode().unwrap_err();
        assert!(matches!(err, CodecError::StringTableOverflow(_)));
    }

    mod property_tests {
        use super::*;
        use proptest::collection::{btree_map, vec as prop_vec};
        use proptest::prelude::*;

        fn tag_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
            btree_map("[a-z:_]{1,10}", "[a-zA-Z0-9 ]{0,16}", 0..5)
        }

        fn node_strategy() -> impl Strategy<Value = Node> {
            (any::<i32>(), any::<i32>(), tag_strategy())
                .prop_map(|(lat, lon, tags)| Node { lat, lon, tags })
        }

        fn way_strategy() -> impl Strategy<Value = Way> {
            (prop_vec(any::<u64>(), 0..12), tag_strategy())
                .prop_map(|(node_refs, tags)| Way { node_refs, tags })
        }

        fn feature_set_strategy() -> impl Strategy<Value = FeatureSet> {
            (
                btree_map(any::<u64>(), node_strategy(), 0..8),
                btree_map(any::<u64>(), way_strategy(), 0..8),
            )
                .prop_map(|(nodes, ways)| FeatureSet { nodes, ways })
        }

        proptest! {
            #[test]
            fn test_round_trip_law(set in feature_set_strategy()) {
                let encoded = set.encode().unwrap();
                let decoded = FeatureSet::decode(&encoded).unwrap();
                prop_assert_eq!(decoded, set);
            }

            #[test]
            fn test_any_strict_prefix_is_truncated(
                set in feature_set_strategy(),
                cut in any::<prop::sample::Index>(),
            ) {
                // every strict prefix of encoder output fails cleanly rather
                // than reading out of bounds
                let encoded = set.encode().unwrap();
                let cut = cut.index(encoded.len());
                let result = FeatureSet::decode(&encoded[..cut]);
                prop_assert!(
                    matches!(result, Err(CodecError::Truncated { .. })),
                    "expected Truncated error"
                );
            }

            #[test]
            fn test_decode_never_panics_on_noise(noise in prop_vec(any::<u8>(), 0..256)) {
                let _ = FeatureSet::decode(&noise);
            }
        }
    }
}
