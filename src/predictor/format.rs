//! Binary, little-endian predictor file format.
//!
//! ```text
//! magic:      "JRBOOST"              (7 bytes)
//! version:    u8                     (current = 8)
//! predictor:  <PredictorBody>
//! trailer:    '!'  (0x21)
//! ```
//!
//! The byte-oriented save/load idiom (explicit little-endian primitives, a
//! `ParseError` carrying the failing byte offset) follows
//! `krukah-robopoker`'s `byteorder::{WriteBytesExt, ReadBytesExt}` usage,
//! reimplemented by hand here since the wire format is small and bespoke
//! enough not to warrant the extra dependency.

use std::io::{self, Read, Write};

use super::{BasePredictor, Predictor};
use crate::error::{Error, Result};
use crate::tree::node::{Tree, TreeNode};

const MAGIC: &[u8; 7] = b"JRBOOST";
const CURRENT_VERSION: u8 = 8;
const TRAILER: u8 = b'!';

// --- varint ----------------------------------------------------------------

fn write_varint(w: &mut impl Write, mut v: u64) -> io::Result<()> {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            w.write_all(&[byte])?;
            return Ok(());
        }
        w.write_all(&[byte | 0x80])?;
    }
}

fn read_varint(r: &mut impl Read, offset: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    for i in 0..10 {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)
            .map_err(|_| Error::parse_error(*offset, "truncated varint"))?;
        *offset += 1;
        let b = byte[0];
        if i == 9 && b > 0x01 {
            return Err(Error::parse_error(*offset - 1, "varint overflows 64 bits"));
        }
        result |= ((b & 0x7F) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
    Err(Error::parse_error(*offset, "varint overflows 64 bits"))
}

fn write_f32(w: &mut impl Write, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_f32(r: &mut impl Read, offset: &mut usize) -> Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| Error::parse_error(*offset, "truncated f32"))?;
    *offset += 4;
    Ok(f32::from_le_bytes(buf))
}

fn write_usize_as_varint(w: &mut impl Write, v: usize) -> io::Result<()> {
    write_varint(w, v as u64)
}

fn read_varint_as_usize(r: &mut impl Read, offset: &mut usize) -> Result<usize> {
    Ok(read_varint(r, offset)? as usize)
}

// --- top level ---------------------------------------------------------

/// Serialize `predictor` to `writer` using the canonical format.
pub fn save(predictor: &Predictor, writer: &mut impl Write) -> Result<()> {
    writer
        .write_all(MAGIC)
        .and_then(|_| writer.write_all(&[CURRENT_VERSION]))
        .map_err(|e| Error::invalid_input(format!("write failed: {e}")))?;
    write_predictor_body(predictor, writer).map_err(|e| Error::invalid_input(format!("write failed: {e}")))?;
    writer
        .write_all(&[TRAILER])
        .map_err(|e| Error::invalid_input(format!("write failed: {e}")))?;
    Ok(())
}

/// Deserialize a `Predictor` from `reader`, validating magic, version, and
/// trailer.
pub fn load(reader: &mut impl Read) -> Result<Predictor> {
    let mut offset = 0usize;

    let mut magic = [0u8; 7];
    reader
        .read_exact(&mut magic)
        .map_err(|_| Error::parse_error(offset, "truncated magic"))?;
    offset += 7;
    if &magic != MAGIC {
        return Err(Error::parse_error(0, "bad magic"));
    }

    let mut version = [0u8; 1];
    reader
        .read_exact(&mut version)
        .map_err(|_| Error::parse_error(offset, "truncated version"))?;
    let version = version[0];
    offset += 1;
    if version > CURRENT_VERSION {
        return Err(Error::parse_error(
            offset - 1,
            format!("predictor file version {version} is newer than supported version {CURRENT_VERSION}"),
        ));
    }
    if version < CURRENT_VERSION {
        return Err(Error::parse_error(
            offset - 1,
            format!(
                "predictor file version {version} is older than the minimum supported version {CURRENT_VERSION}; re-save with a current trainer"
            ),
        ));
    }

    let predictor = read_predictor_body(reader, &mut offset)?;

    let mut trailer = [0u8; 1];
    reader
        .read_exact(&mut trailer)
        .map_err(|_| Error::parse_error(offset, "truncated trailer"))?;
    if trailer[0] != TRAILER {
        return Err(Error::parse_error(offset, "missing trailer"));
    }

    Ok(predictor)
}

// --- PredictorBody -------------------------------------------------------

fn write_predictor_body(p: &Predictor, w: &mut impl Write) -> io::Result<()> {
    match p {
        Predictor::Boosted(b) => {
            w.write_all(b"B")?;
            write_f32(w, b.c0)?;
            write_f32(w, b.c1)?;
            write_usize_as_varint(w, b.bases.len())?;
            for base in &b.bases {
                write_base_body(base, w)?;
            }
        }
        Predictor::Ensemble(members) => {
            w.write_all(b"E")?;
            write_usize_as_varint(w, members.len())?;
            for m in members {
                write_predictor_body(m, w)?;
            }
        }
        Predictor::Union(members) => {
            w.write_all(b"U")?;
            write_usize_as_varint(w, members.len())?;
            for m in members {
                write_predictor_body(m, w)?;
            }
        }
    }
    Ok(())
}

fn read_predictor_body(r: &mut impl Read, offset: &mut usize) -> Result<Predictor> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)
        .map_err(|_| Error::parse_error(*offset, "truncated predictor tag"))?;
    *offset += 1;
    match tag[0] {
        b'B' => {
            let c0 = read_f32(r, offset)?;
            let c1 = read_f32(r, offset)?;
            let count = read_varint_as_usize(r, offset)?;
            let mut bases = Vec::with_capacity(count);
            for _ in 0..count {
                bases.push(read_base_body(r, offset)?);
            }
            Ok(Predictor::Boosted(super::BoostedPredictor { c0, c1, bases }))
        }
        b'E' => {
            let count = read_varint_as_usize(r, offset)?;
            let mut members = Vec::with_capacity(count);
            for _ in 0..count {
                members.push(read_predictor_body(r, offset)?);
            }
            Ok(Predictor::Ensemble(members))
        }
        b'U' => {
            let count = read_varint_as_usize(r, offset)?;
            let mut members = Vec::with_capacity(count);
            for _ in 0..count {
                members.push(read_predictor_body(r, offset)?);
            }
            Ok(Predictor::Union(members))
        }
        other => Err(Error::parse_error(
            *offset - 1,
            format!("unknown predictor tag {other:#04x}"),
        )),
    }
}

// --- BaseBody ------------------------------------------------------------

fn write_base_body(b: &BasePredictor, w: &mut impl Write) -> io::Result<()> {
    match b {
        BasePredictor::Zero => {
            w.write_all(b"Z")?;
        }
        BasePredictor::Constant(y) => {
            w.write_all(b"C")?;
            write_f32(w, *y)?;
        }
        BasePredictor::Stump {
            j,
            x,
            left_y,
            right_y,
            gain,
        } => {
            w.write_all(b"S")?;
            write_usize_as_varint(w, *j)?;
            write_f32(w, *x)?;
            write_f32(w, *left_y)?;
            write_f32(w, *right_y)?;
            write_f32(w, *gain)?;
        }
        BasePredictor::Tree(tree) => {
            w.write_all(b"T")?;
            write_usize_as_varint(w, tree.len())?;
            write_node_body(tree, tree.root(), w)?;
        }
        BasePredictor::Forest(members) => {
            w.write_all(b"F")?;
            write_usize_as_varint(w, members.len())?;
            for m in members {
                write_base_body(m, w)?;
            }
        }
    }
    Ok(())
}

fn read_base_body(r: &mut impl Read, offset: &mut usize) -> Result<BasePredictor> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)
        .map_err(|_| Error::parse_error(*offset, "truncated base predictor tag"))?;
    *offset += 1;
    match tag[0] {
        b'Z' => Ok(BasePredictor::Zero),
        b'C' => Ok(BasePredictor::Constant(read_f32(r, offset)?)),
        b'S' => {
            let j = read_varint_as_usize(r, offset)?;
            let x = read_f32(r, offset)?;
            let left_y = read_f32(r, offset)?;
            let right_y = read_f32(r, offset)?;
            let gain = read_f32(r, offset)?;
            Ok(BasePredictor::Stump {
                j,
                x,
                left_y,
                right_y,
                gain,
            })
        }
        b'T' => {
            let node_count = read_varint_as_usize(r, offset)?;
            let mut arena = Vec::with_capacity(node_count);
            read_node_body(r, offset, &mut arena)?;
            if arena.len() != node_count {
                return Err(Error::parse_error(
                    *offset,
                    format!("tree declared {node_count} nodes but {} were read", arena.len()),
                ));
            }
            Ok(BasePredictor::Tree(Tree::from_arena(arena)))
        }
        b'F' => {
            let count = read_varint_as_usize(r, offset)?;
            let mut members = Vec::with_capacity(count);
            for _ in 0..count {
                members.push(read_base_body(r, offset)?);
            }
            Ok(BasePredictor::Forest(members))
        }
        other => Err(Error::parse_error(
            *offset - 1,
            format!("unknown base predictor tag {other:#04x}"),
        )),
    }
}

// --- NodeBody, depth-first ----------------------------------------------

fn write_node_body(tree: &Tree, idx: usize, w: &mut impl Write) -> io::Result<()> {
    let node = tree.node(idx);
    if node.is_leaf {
        w.write_all(&[1u8])?;
        write_f32(w, node.y)?;
    } else {
        w.write_all(&[0u8])?;
        write_usize_as_varint(w, node.j)?;
        write_f32(w, node.x)?;
        write_f32(w, node.gain)?;
        write_node_body(tree, node.left, w)?;
        write_node_body(tree, node.right, w)?;
    }
    Ok(())
}

/// Reads one `NodeBody` (and its subtree) depth-first, appending nodes to
/// `arena`. Returns the arena index of the node just read.
fn read_node_body(r: &mut impl Read, offset: &mut usize, arena: &mut Vec<TreeNode>) -> Result<usize> {
    let mut is_leaf = [0u8; 1];
    r.read_exact(&mut is_leaf)
        .map_err(|_| Error::parse_error(*offset, "truncated node"))?;
    *offset += 1;
    match is_leaf[0] {
        1 => {
            let y = read_f32(r, offset)?;
            let idx = arena.len();
            arena.push(TreeNode::leaf(y));
            Ok(idx)
        }
        0 => {
            let j = read_varint_as_usize(r, offset)?;
            let x = read_f32(r, offset)?;
            let gain = read_f32(r, offset)?;
            let idx = arena.len();
            arena.push(TreeNode::leaf(0.0)); // placeholder, patched below
            let left = read_node_body(r, offset, arena)?;
            let right = read_node_body(r, offset, arena)?;
            arena[idx] = TreeNode::internal(j, x, gain, left, right);
            Ok(idx)
        }
        other => Err(Error::parse_error(*offset - 1, format!("bad isLeaf byte {other:#04x}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::BoostedPredictor;

    fn sample_predictor() -> Predictor {
        let tree = Tree::from_arena(vec![
            TreeNode::internal(0, 0.5, 2.0, 1, 2),
            TreeNode::leaf(-1.0),
            TreeNode::leaf(1.0),
        ]);
        Predictor::Boosted(BoostedPredictor {
            c0: 0.25,
            c1: 1.5,
            bases: vec![
                BasePredictor::Zero,
                BasePredictor::Constant(0.5),
                BasePredictor::Stump {
                    j: 1,
                    x: 0.1,
                    left_y: -0.2,
                    right_y: 0.3,
                    gain: 0.9,
                },
                BasePredictor::Tree(tree),
                BasePredictor::Forest(vec![BasePredictor::Constant(1.0), BasePredictor::Zero]),
            ],
        })
    }

    #[test]
    fn round_trip_preserves_predictions_and_bytes() {
        let p = sample_predictor();
        let mut buf = Vec::new();
        save(&p, &mut buf).unwrap();
        let p2 = load(&mut &buf[..]).unwrap();
        assert_eq!(p, p2);

        let mut buf2 = Vec::new();
        save(&p2, &mut buf2).unwrap();
        assert_eq!(buf, buf2);
    }

    #[test]
    fn round_trip_predictions_match_on_data() {
        let p = sample_predictor();
        let mut buf = Vec::new();
        save(&p, &mut buf).unwrap();
        let p2 = load(&mut &buf[..]).unwrap();

        let x = Matrix_for_test();
        let a = p.predict(&x).unwrap();
        let b = p2.predict(&x).unwrap();
        assert_eq!(a, b);
    }

    #[allow(non_snake_case)]
    fn Matrix_for_test() -> crate::matrix::Matrix {
        crate::matrix::Matrix::from_column_major(vec![0.0, 1.0, 0.0, 1.0], 2, 2).unwrap()
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = b"NOPE!!!".to_vec();
        buf.push(8);
        assert!(load(&mut &buf[..]).is_err());
    }

    #[test]
    fn rejects_old_version() {
        let mut buf = MAGIC.to_vec();
        buf.push(7);
        let err = load(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }

    #[test]
    fn rejects_missing_trailer() {
        let p = BasePredictor::Zero;
        let mut buf = MAGIC.to_vec();
        buf.push(CURRENT_VERSION);
        buf.push(b'B');
        write_f32(&mut buf, 0.0).unwrap();
        write_f32(&mut buf, 0.0).unwrap();
        write_usize_as_varint(&mut buf, 1).unwrap();
        write_base_body(&p, &mut buf).unwrap();
        // omit trailer
        assert!(load(&mut &buf[..]).is_err());
    }

    #[test]
    fn varint_round_trips_u64_edges() {
        for &v in &[0u64, 1, 127, 128, 2_u64.pow(63), u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v).unwrap();
            let mut offset = 0usize;
            let got = read_varint(&mut &buf[..], &mut offset).unwrap();
            assert_eq!(got, v);
        }
    }

    #[test]
    fn eleven_byte_varint_is_a_parse_error() {
        // 10 continuation bytes followed by a terminal byte: 11 bytes total,
        // encodes a value that needs more than 64 bits.
        let mut buf = vec![0xFFu8; 10];
        buf.push(0x02); // exceeds 0x01 in the 10th payload byte slot
        let mut offset = 0usize;
        assert!(read_varint(&mut &buf[..], &mut offset).is_err());
    }
}
