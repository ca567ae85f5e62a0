//! Binary serialization for the index blob.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! [magic: 4 bytes "RDXI"]
//! [version: u32]
//! [variant: u8]            0 = flat, 1 = clustered
//! [dimension: u32]
//! [count: u32]
//! -- clustered only --
//! [nlist: u32]
//! [nprobe: u32]
//! [centroids: nlist * dimension * f32]
//! [lists: nlist * (len: u32, positions: len * u32)]
//! -- both variants --
//! [vectors: count * dimension * f32]
//! ```
//!
//! Decode rejects anything it cannot fully account for: wrong magic or
//! version, unknown variant tags, truncated payloads, trailing bytes,
//! counts the remaining bytes cannot cover, and inverted lists that
//! fail to partition `0..count`. Counts are bounded against the blob
//! length before anything is allocated from them.

use crate::error::{PersistError, PersistResult};
use crate::index::{FlatIndex, IvfIndex, VectorIndex};

/// File name of the index blob inside a shard directory.
pub const INDEX_ARTIFACT: &str = "index.bin";

const INDEX_MAGIC: [u8; 4] = *b"RDXI";
const INDEX_FORMAT_VERSION: u32 = 1;

const TAG_FLAT: u8 = 0;
const TAG_CLUSTERED: u8 = 1;

/// Serialize an index into the blob format.
#[must_use]
pub fn encode(index: &VectorIndex) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&INDEX_MAGIC);
    buf.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());

    match index {
        VectorIndex::Flat(flat) => {
            buf.push(TAG_FLAT);
            buf.extend_from_slice(&(flat.dimension() as u32).to_le_bytes());
            buf.extend_from_slice(&(flat.count() as u32).to_le_bytes());
            write_vectors(&mut buf, flat.vectors());
        }
        VectorIndex::Clustered(ivf) => {
            buf.push(TAG_CLUSTERED);
            buf.extend_from_slice(&(ivf.dimension() as u32).to_le_bytes());
            buf.extend_from_slice(&(ivf.count() as u32).to_le_bytes());
            buf.extend_from_slice(&(ivf.nlist() as u32).to_le_bytes());
            buf.extend_from_slice(&(ivf.nprobe() as u32).to_le_bytes());
            write_vectors(&mut buf, ivf.centroids());
            for list in ivf.lists() {
                buf.extend_from_slice(&(list.len() as u32).to_le_bytes());
                for &position in list {
                    buf.extend_from_slice(&position.to_le_bytes());
                }
            }
            write_vectors(&mut buf, ivf.vectors());
        }
    }

    buf
}

/// Deserialize an index blob.
pub fn decode(bytes: &[u8]) -> PersistResult<VectorIndex> {
    let mut reader = Reader::new(bytes);

    let magic = reader.take(4)?;
    if magic != INDEX_MAGIC {
        return Err(corrupt("bad magic bytes".to_string()));
    }
    let version = reader.read_u32()?;
    if version != INDEX_FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }

    let variant = reader.read_u8()?;
    let dimension = reader.read_u32()? as usize;
    let count = reader.read_u32()? as usize;
    if dimension == 0 && count > 0 {
        return Err(corrupt(format!(
            "{count} vectors with dimension zero"
        )));
    }

    let index = match variant {
        TAG_FLAT => {
            let vectors = read_vectors(&mut reader, count, dimension)?;
            VectorIndex::Flat(FlatIndex::from_parts(dimension, vectors))
        }
        TAG_CLUSTERED => {
            let nlist = reader.read_u32()? as usize;
            let nprobe = reader.read_u32()? as usize;
            if nlist == 0 {
                return Err(corrupt("clustered index with zero lists".to_string()));
            }
            if nprobe == 0 || nprobe > nlist {
                return Err(corrupt(format!(
                    "nprobe {nprobe} outside 1..={nlist}"
                )));
            }
            let centroids = read_vectors(&mut reader, nlist, dimension)?;
            let lists = read_lists(&mut reader, nlist, count)?;
            let vectors = read_vectors(&mut reader, count, dimension)?;
            VectorIndex::Clustered(IvfIndex::from_parts(
                dimension, nprobe, centroids, lists, vectors,
            ))
        }
        tag => return Err(corrupt(format!("unknown index variant tag {tag}"))),
    };

    if reader.remaining() != 0 {
        return Err(corrupt(format!(
            "{} trailing bytes after payload",
            reader.remaining()
        )));
    }

    Ok(index)
}

fn corrupt(reason: String) -> PersistError {
    PersistError::CorruptFormat {
        artifact: "index.bin",
        reason,
    }
}

fn write_vectors(buf: &mut Vec<u8>, vectors: &[Vec<f32>]) {
    for vector in vectors {
        for &value in vector {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn read_vectors(
    reader: &mut Reader<'_>,
    count: usize,
    dimension: usize,
) -> PersistResult<Vec<Vec<f32>>> {
    // Header fields are untrusted; bound the claimed payload against the
    // bytes actually present before reserving anything.
    let needed = (count as u64)
        .checked_mul(dimension as u64)
        .and_then(|n| n.checked_mul(4));
    match needed {
        Some(needed) if needed <= reader.remaining() as u64 => {}
        _ => {
            return Err(corrupt(format!(
                "{count} vectors of dimension {dimension} exceed the {} remaining bytes",
                reader.remaining()
            )));
        }
    }

    let mut vectors = Vec::with_capacity(count);
    for _ in 0..count {
        let bytes = reader.take(dimension * 4)?;
        let mut vector = Vec::with_capacity(dimension);
        for chunk in bytes.chunks_exact(4) {
            vector.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        vectors.push(vector);
    }
    Ok(vectors)
}

/// Read `nlist` inverted lists and verify they partition `0..count`.
fn read_lists(reader: &mut Reader<'_>, nlist: usize, count: usize) -> PersistResult<Vec<Vec<u32>>> {
    // Every position appears in exactly one list at 4 bytes apiece, so a
    // count the remaining bytes cannot cover is corrupt.
    if (count as u64) * 4 > reader.remaining() as u64 {
        return Err(corrupt(format!(
            "{count} filed positions exceed the {} remaining bytes",
            reader.remaining()
        )));
    }

    let mut lists = Vec::with_capacity(nlist);
    let mut seen = vec![false; count];
    for _ in 0..nlist {
        let len = reader.read_u32()? as usize;
        // The lists partition 0..count, so no list can hold more.
        if len > count {
            return Err(corrupt(format!(
                "list of {len} positions in an index of {count} vectors"
            )));
        }
        let mut list = Vec::with_capacity(len);
        for _ in 0..len {
            let position = reader.read_u32()?;
            match seen.get_mut(position as usize) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(corrupt(format!(
                        "position {position} appears in more than one list"
                    )));
                }
                None => {
                    return Err(corrupt(format!(
                        "position {position} out of range for {count} vectors"
                    )));
                }
            }
            list.push(position);
        }
        lists.push(list);
    }
    if let Some(missing) = seen.iter().position(|present| !present) {
        return Err(corrupt(format!("position {missing} missing from all lists")));
    }
    Ok(lists)
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> PersistResult<&'a [u8]> {
        let end = self.offset.checked_add(n).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.offset..end];
                self.offset = end;
                Ok(slice)
            }
            None => Err(corrupt(format!(
                "unexpected end of data at byte {}",
                self.offset
            ))),
        }
    }

    fn read_u8(&mut self) -> PersistResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> PersistResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexParams;

    fn sample_vectors(n: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| vec![i as f32, (i as f32) * 0.5, 1.0 - (i as f32) * 0.1])
            .collect()
    }

    #[test]
    fn test_flat_round_trip() {
        let index = VectorIndex::build(sample_vectors(12), &IndexParams::default()).unwrap();
        assert!(matches!(index, VectorIndex::Flat(_)));

        let decoded = decode(&encode(&index)).unwrap();
        assert_eq!(index, decoded);
    }

    #[test]
    fn test_clustered_round_trip() {
        let index = VectorIndex::Clustered(IvfIndex::train(sample_vectors(40), 4, 2, 42).unwrap());
        let decoded = decode(&encode(&index)).unwrap();
        assert_eq!(index, decoded);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = encode(&VectorIndex::build(sample_vectors(3), &IndexParams::default()).unwrap());
        bytes[0] = b'X';
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = encode(&VectorIndex::build(sample_vectors(3), &IndexParams::default()).unwrap());
        bytes[4] = 99;
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_unknown_variant_rejected() {
        let mut bytes = encode(&VectorIndex::build(sample_vectors(3), &IndexParams::default()).unwrap());
        bytes[8] = 7;
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("variant tag"));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = encode(&VectorIndex::build(sample_vectors(6), &IndexParams::default()).unwrap());
        let err = decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.to_string().contains("remaining bytes"));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&VectorIndex::build(sample_vectors(6), &IndexParams::default()).unwrap());
        bytes.push(0);
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_hostile_count_rejected_before_allocation() {
        // Flat header claiming u32::MAX vectors with no payload behind it.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RDXI");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(TAG_FLAT);
        bytes.extend_from_slice(&384u32.to_le_bytes()); // dimension
        bytes.extend_from_slice(&u32::MAX.to_le_bytes()); // count

        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("remaining bytes"));
    }

    #[test]
    fn test_hostile_clustered_count_rejected_before_lists() {
        // Clustered header claiming u32::MAX vectors; the one real
        // centroid parses, the filed-position bound must trip next.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RDXI");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(TAG_CLUSTERED);
        bytes.extend_from_slice(&1u32.to_le_bytes()); // dimension
        bytes.extend_from_slice(&u32::MAX.to_le_bytes()); // count
        bytes.extend_from_slice(&1u32.to_le_bytes()); // nlist
        bytes.extend_from_slice(&1u32.to_le_bytes()); // nprobe
        bytes.extend_from_slice(&0.5f32.to_le_bytes()); // centroid

        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("remaining bytes"));
    }

    #[test]
    fn test_hostile_list_len_rejected() {
        // One vector, one list claiming u32::MAX members.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RDXI");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(TAG_CLUSTERED);
        bytes.extend_from_slice(&1u32.to_le_bytes()); // dimension
        bytes.extend_from_slice(&1u32.to_le_bytes()); // count
        bytes.extend_from_slice(&1u32.to_le_bytes()); // nlist
        bytes.extend_from_slice(&1u32.to_le_bytes()); // nprobe
        bytes.extend_from_slice(&0.5f32.to_le_bytes()); // centroid
        bytes.extend_from_slice(&u32::MAX.to_le_bytes()); // list len

        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("in an index of"));
    }

    #[test]
    fn test_zero_dimension_with_vectors_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RDXI");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(TAG_FLAT);
        bytes.extend_from_slice(&0u32.to_le_bytes()); // dimension
        bytes.extend_from_slice(&u32::MAX.to_le_bytes()); // count

        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("dimension zero"));
    }

    #[test]
    fn test_out_of_range_position_rejected() {
        // Hand-built clustered blob: one list holding position 5 of 1.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RDXI");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(TAG_CLUSTERED);
        bytes.extend_from_slice(&1u32.to_le_bytes()); // dimension
        bytes.extend_from_slice(&1u32.to_le_bytes()); // count
        bytes.extend_from_slice(&1u32.to_le_bytes()); // nlist
        bytes.extend_from_slice(&1u32.to_le_bytes()); // nprobe
        bytes.extend_from_slice(&0.5f32.to_le_bytes()); // centroid
        bytes.extend_from_slice(&1u32.to_le_bytes()); // list len
        bytes.extend_from_slice(&5u32.to_le_bytes()); // bad position
        bytes.extend_from_slice(&0.5f32.to_le_bytes()); // vector

        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_unassigned_position_rejected() {
        // Two vectors, one list, only position 0 filed.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RDXI");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(TAG_CLUSTERED);
        bytes.extend_from_slice(&1u32.to_le_bytes()); // dimension
        bytes.extend_from_slice(&2u32.to_le_bytes()); // count
        bytes.extend_from_slice(&1u32.to_le_bytes()); // nlist
        bytes.extend_from_slice(&1u32.to_le_bytes()); // nprobe
        bytes.extend_from_slice(&0.5f32.to_le_bytes()); // centroid
        bytes.extend_from_slice(&1u32.to_le_bytes()); // list len
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0.1f32.to_le_bytes());
        bytes.extend_from_slice(&0.2f32.to_le_bytes());

        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("missing from all lists"));
    }
}
