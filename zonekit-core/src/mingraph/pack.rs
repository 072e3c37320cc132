//! Packed stream encoding of a zone.
//!
//! A zone serializes to a little-endian, word-addressed `u32` stream:
//!
//! ```text
//! word 0   : type tag (bits 0..2) | dimension (bits 3..18)
//! words 1..: payload, depending on the type
//! ```
//!
//! | tag | payload |
//! |-----|---------|
//! | 0   | nothing: the unconstrained zone |
//! | 1   | every off-diagonal bound, 32-bit raw words |
//! | 2   | bit matrix (`dim^2` bits, padded to words), then one 32-bit raw word per marked edge |
//! | 4   | like 1, bounds as 16-bit halves packed two per word |
//! | 5   | like 2, bounds as 16-bit halves packed two per word |
//!
//! With `minimize` the writer stores only the essential constraints of the
//! minimal graph (tags 2/5), otherwise the full off-diagonal copy (tags
//! 1/4). With `try16` it downgrades to the 16-bit variants whenever every
//! stored word fits. Readers rebuild the matrix from an unconstrained
//! init, fill the stored entries and re-close.

use super::BitMatrix;
use crate::bound::Bound;
use crate::common::Relation;
use crate::dbm::kernel::{self, idx};
use crate::dbm::Dbm;

const TAG_TRIVIAL: u32 = 0;
const TAG_COPY32: u32 = 1;
const TAG_BITMATRIX32: u32 = 2;
const TAG_COPY16: u32 = 4;
const TAG_BITMATRIX16: u32 = 5;

/// 16-bit infinity sentinel (raw encoding).
const INF16: i32 = 0x7ffe;

const fn fits16(raw: i32) -> bool {
    -INF16 < raw && raw < INF16
}

const fn header(tag: u32, dim: usize) -> u32 {
    tag | ((dim as u32) << 3)
}

/// Dimension stored in a stream.
#[must_use]
pub fn dim_of(stream: &[u32]) -> usize {
    ((stream[0] >> 3) & 0xffff) as usize
}

fn tag_of(stream: &[u32]) -> u32 {
    stream[0] & 0x7
}

fn matrix_words(dim: usize) -> usize {
    (dim * dim).div_ceil(32)
}

/// Total length of the stream in words, header included.
#[must_use]
pub fn size_of(stream: &[u32]) -> usize {
    let dim = dim_of(stream);
    match tag_of(stream) {
        TAG_TRIVIAL => 1,
        TAG_COPY32 => 1 + dim * (dim - 1),
        TAG_COPY16 => 1 + (dim * (dim - 1)).div_ceil(2),
        TAG_BITMATRIX32 => {
            let words = matrix_words(dim);
            let count = stream[1..=words].iter().map(|w| w.count_ones() as usize).sum::<usize>();
            1 + words + count
        }
        TAG_BITMATRIX16 => {
            let words = matrix_words(dim);
            let count = stream[1..=words].iter().map(|w| w.count_ones() as usize).sum::<usize>();
            1 + words + count.div_ceil(2)
        }
        _ => unreachable!("corrupt stream tag"),
    }
}

fn pack16(values: &[i32], out: &mut Vec<u32>) {
    for pair in values.chunks(2) {
        let lo = pair[0] as u16 as u32;
        let hi = if pair.len() == 2 {
            pair[1] as u16 as u32
        } else {
            0
        };
        out.push(lo | (hi << 16));
    }
}

fn unpack16(words: &[u32], count: usize) -> Vec<i32> {
    let mut values = Vec::with_capacity(count);
    for k in 0..count {
        let w = words[k / 2];
        let half = if k % 2 == 0 { w & 0xffff } else { w >> 16 };
        values.push(i32::from(half as u16 as i16));
    }
    values
}

fn raw16(raw: i32) -> i32 {
    if raw == Bound::INFINITY.raw() {
        INF16
    } else {
        raw
    }
}

fn widen16(raw: i32) -> i32 {
    if raw == INF16 {
        Bound::INFINITY.raw()
    } else {
        raw
    }
}

/// Serialize a non-empty zone starting at word `offset`; the words before
/// it are zeroed for the caller to fill with its own header.
#[must_use]
pub fn write_with_offset(dbm: &Dbm, minimize: bool, try16: bool, offset: usize) -> Vec<u32> {
    assert!(!dbm.is_empty(), "cannot pack an empty zone");
    let dim = dbm.dim();
    let mut out = vec![0u32; offset];

    if dim == 1 {
        out.push(header(TAG_TRIVIAL, dim));
        return out;
    }

    let cells = dbm.cells();
    if minimize {
        let (bits, count) = dbm.mingraph();
        if count == 0 {
            out.push(header(TAG_TRIVIAL, dim));
            return out;
        }
        let values: Vec<i32> = bits
            .edges()
            .map(|(i, j)| cells[idx(dim, i, j)].raw())
            .collect();
        if try16 && values.iter().all(|&v| fits16(v)) {
            out.push(header(TAG_BITMATRIX16, dim));
            out.extend_from_slice(bits.words());
            pack16(&values, &mut out);
        } else {
            out.push(header(TAG_BITMATRIX32, dim));
            out.extend_from_slice(bits.words());
            out.extend(values.iter().map(|&v| v as u32));
        }
    } else {
        let values: Vec<i32> = (0..dim * dim)
            .filter(|&b| b / dim != b % dim)
            .map(|b| cells[b].raw())
            .collect();
        if try16 && values.iter().all(|&v| v == Bound::INFINITY.raw() || fits16(v)) {
            out.push(header(TAG_COPY16, dim));
            let narrowed: Vec<i32> = values.iter().map(|&v| raw16(v)).collect();
            pack16(&narrowed, &mut out);
        } else {
            out.push(header(TAG_COPY32, dim));
            out.extend(values.iter().map(|&v| v as u32));
        }
    }
    out
}

/// Serialize a non-empty zone.
#[must_use]
pub fn write(dbm: &Dbm, minimize: bool, try16: bool) -> Vec<u32> {
    write_with_offset(dbm, minimize, try16, 0)
}

fn fill_copy(cells: &mut [Bound], dim: usize, values: &[i32]) {
    let mut it = values.iter();
    for i in 0..dim {
        for j in 0..dim {
            if i != j {
                cells[idx(dim, i, j)] = Bound::from_raw(*it.next().expect("truncated stream"));
            }
        }
    }
}

/// Rebuild the zone stored in a stream.
pub fn read(stream: &[u32]) -> Dbm {
    let dim = dim_of(stream);
    assert!(dim >= 1, "corrupt stream header");
    let mut cells = vec![Bound::LE_ZERO; dim * dim];
    kernel::init(&mut cells, dim);

    match tag_of(stream) {
        TAG_TRIVIAL => {}
        TAG_COPY32 => {
            let values: Vec<i32> = stream[1..1 + dim * (dim - 1)]
                .iter()
                .map(|&w| w as i32)
                .collect();
            fill_copy(&mut cells, dim, &values);
        }
        TAG_COPY16 => {
            let count = dim * (dim - 1);
            let values: Vec<i32> = unpack16(&stream[1..], count)
                .into_iter()
                .map(widen16)
                .collect();
            fill_copy(&mut cells, dim, &values);
        }
        TAG_BITMATRIX32 | TAG_BITMATRIX16 => {
            let words = matrix_words(dim);
            let bits = BitMatrix::from_words(dim, stream[1..=words].to_vec());
            let count = bits.count();
            let values: Vec<i32> = if tag_of(stream) == TAG_BITMATRIX32 {
                stream[1 + words..1 + words + count]
                    .iter()
                    .map(|&w| w as i32)
                    .collect()
            } else {
                unpack16(&stream[1 + words..], count)
            };
            for ((i, j), &raw) in bits.edges().zip(values.iter()) {
                cells[idx(dim, i, j)] = Bound::from_raw(raw);
            }
        }
        _ => unreachable!("corrupt stream tag"),
    }

    if kernel::close(&mut cells, dim) {
        Dbm::from_cells(dim, cells)
    } else {
        Dbm::empty(dim)
    }
}

/// The bit matrix of the stored zone and its count, without rebuilding
/// the matrix when the stream already carries one.
pub fn bit_matrix_of(stream: &[u32]) -> (BitMatrix, usize) {
    let dim = dim_of(stream);
    match tag_of(stream) {
        TAG_TRIVIAL => (BitMatrix::new(dim), 0),
        TAG_BITMATRIX32 | TAG_BITMATRIX16 => {
            let words = matrix_words(dim);
            let bits = BitMatrix::from_words(dim, stream[1..=words].to_vec());
            let count = bits.count();
            (bits, count)
        }
        _ => read(stream).mingraph(),
    }
}

/// Streamed test that every constraint stored in the stream is at least as
/// loose as the corresponding entry of `dbm`, which proves `dbm` a subset
/// of the stored zone.
fn streamed_subset(dbm: &Dbm, stream: &[u32]) -> bool {
    let dim = dim_of(stream);
    let cells = dbm.cells();
    match tag_of(stream) {
        TAG_TRIVIAL => true,
        TAG_COPY32 | TAG_COPY16 => {
            let count = dim * (dim - 1);
            let values: Vec<i32> = if tag_of(stream) == TAG_COPY32 {
                stream[1..1 + count].iter().map(|&w| w as i32).collect()
            } else {
                unpack16(&stream[1..], count).into_iter().map(widen16).collect()
            };
            let mut it = values.iter();
            for i in 0..dim {
                for j in 0..dim {
                    if i != j && cells[idx(dim, i, j)] > Bound::from_raw(*it.next().unwrap()) {
                        return false;
                    }
                }
            }
            true
        }
        _ => {
            let words = matrix_words(dim);
            let bits = BitMatrix::from_words(dim, stream[1..=words].to_vec());
            let count = bits.count();
            let values: Vec<i32> = if tag_of(stream) == TAG_BITMATRIX32 {
                stream[1 + words..1 + words + count]
                    .iter()
                    .map(|&w| w as i32)
                    .collect()
            } else {
                unpack16(&stream[1 + words..], count)
            };
            let result = bits
                .edges()
                .zip(values.iter())
                .all(|((i, j), &raw)| cells[idx(dim, i, j)] <= Bound::from_raw(raw));
            result
        }
    }
}

/// Relation of `dbm` against the stored zone; equivalent to unpacking and
/// comparing, but the subset direction is answered from the stream alone.
pub fn relation_with(dbm: &Dbm, stream: &[u32]) -> Relation {
    if dbm.dim() != dim_of(stream) {
        return Relation::DIFFERENT;
    }
    if dbm.is_empty() {
        return Relation::SUBSET;
    }
    if streamed_subset(dbm, stream) {
        if is_equal_to(dbm, stream) {
            Relation::EQUAL
        } else {
            Relation::SUBSET
        }
    } else {
        // Not a subset; only the other direction remains open.
        let other = read(stream);
        dbm.relation(&other) & Relation::SUPERSET
    }
}

/// `dbm` and the stored zone are the same set.
pub fn is_equal_to(dbm: &Dbm, stream: &[u32]) -> bool {
    if dbm.is_empty() || dbm.dim() != dim_of(stream) {
        return false;
    }
    let dim = dbm.dim();
    let cells = dbm.cells();
    match tag_of(stream) {
        TAG_TRIVIAL => dbm.is_init(),
        TAG_COPY32 | TAG_COPY16 => {
            let count = dim * (dim - 1);
            let values: Vec<i32> = if tag_of(stream) == TAG_COPY32 {
                stream[1..1 + count].iter().map(|&w| w as i32).collect()
            } else {
                unpack16(&stream[1..], count).into_iter().map(widen16).collect()
            };
            let mut it = values.iter();
            for i in 0..dim {
                for j in 0..dim {
                    if i != j && cells[idx(dim, i, j)] != Bound::from_raw(*it.next().unwrap()) {
                        return false;
                    }
                }
            }
            true
        }
        _ => {
            // Equal zones have identical minimal graphs; compare them
            // without unpacking.
            let (bits, count) = dbm.mingraph();
            let (other, other_count) = bit_matrix_of(stream);
            if count != other_count || bits != other {
                return false;
            }
            let words = matrix_words(dim);
            let values: Vec<i32> = if tag_of(stream) == TAG_BITMATRIX32 {
                stream[1 + words..1 + words + count]
                    .iter()
                    .map(|&w| w as i32)
                    .collect()
            } else {
                unpack16(&stream[1 + words..], count)
            };
            let result = bits
                .edges()
                .zip(values.iter())
                .all(|((i, j), &raw)| cells[idx(dim, i, j)].raw() == raw);
            result
        }
    }
}

/// Grow `dbm` to the convex union with the stored zone.
pub fn convex_union_with(dbm: &mut Dbm, stream: &[u32]) {
    let other = read(stream);
    dbm.convex_union(&other);
}
