//! Weight storage: the little-endian binary weight file and the symmetry
//! packing that lets mirrored pattern configurations share one entry.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::eval::pattern::{EVAL_F2X, N_PATTERN_TYPES, TYPE_OF_FEATURE};
use crate::square::Square;

/// "EDAX" file magic.
pub const MAGIC_ENGINE: u32 = 0x4544_4158;

/// "EVAL" section magic.
pub const MAGIC_SECTION: u32 = 0x4556_414C;

/// Weighted plies, 0..=60.
pub const EVAL_N_PLY: usize = 61;

/// Weights per ply: the packed tables of all pattern types plus the bias.
pub const EVAL_N_WEIGHT: usize = 113_896;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("bad weight file header (expected EDAX/EVAL magic)")]
    BadMagic,
    #[error("weight file truncated: expected {expected} weight entries")]
    Truncated { expected: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Header of the weight file, little-endian throughout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightHeader {
    pub version: i32,
    pub release: i32,
    pub build: i32,
    /// Seconds since the epoch when the weights were fitted.
    pub date: f64,
}

/// Raw-index to packed-index maps, one per pattern type, plus the layout of
/// the per-ply weight row.
pub struct Packing {
    maps: Vec<Box<[u16]>>,
    offsets: [usize; N_PATTERN_TYPES],
    bias_offset: usize,
}

impl Packing {
    /// Builds the packing tables from the feature geometry: for each
    /// pattern type, configurations related by the pattern's self-symmetry
    /// collapse onto one canonical entry.
    pub fn build() -> Packing {
        let mut maps = Vec::with_capacity(N_PATTERN_TYPES);
        let mut offsets = [0usize; N_PATTERN_TYPES];
        let mut offset = 0usize;

        for ty in 0..N_PATTERN_TYPES {
            let feature = representative_of(ty);
            let n = feature.n_square;
            let n_raw = 3usize.pow(n as u32);
            let perm = find_self_symmetry(&feature.squares[..n]);

            let mut map = vec![u16::MAX; n_raw].into_boxed_slice();
            let mut next_id = 0u16;
            for raw in 0..n_raw {
                let mirror = match &perm {
                    Some(perm) => permute_digits(raw, perm, n),
                    None => raw,
                };
                if mirror < raw {
                    map[raw] = map[mirror];
                } else {
                    map[raw] = next_id;
                    next_id += 1;
                }
            }

            offsets[ty] = offset;
            offset += next_id as usize;
            maps.push(map);
        }

        let packing = Packing {
            maps,
            offsets,
            bias_offset: offset,
        };
        debug_assert_eq!(packing.bias_offset + 1, EVAL_N_WEIGHT);
        packing
    }

    /// Weight-row index of `raw_index` for a feature of `ty`.
    #[inline]
    pub fn weight_index(&self, ty: usize, raw_index: usize) -> usize {
        self.offsets[ty] + self.maps[ty][raw_index] as usize
    }

    /// Weight-row index of the bias term.
    #[inline]
    pub fn bias_index(&self) -> usize {
        self.bias_offset
    }

    /// Packed table size of a pattern type.
    pub fn packed_len(&self, ty: usize) -> usize {
        let next = if ty + 1 < N_PATTERN_TYPES {
            self.offsets[ty + 1]
        } else {
            self.bias_offset
        };
        next - self.offsets[ty]
    }
}

fn representative_of(ty: usize) -> crate::eval::pattern::FeatureToCoordinate {
    let f = TYPE_OF_FEATURE.iter().position(|&t| t == ty).unwrap();
    EVAL_F2X[f]
}

/// Finds a board symmetry mapping the pattern's square set onto itself and
/// returns it as a digit permutation, or `None` for asymmetric patterns.
fn find_self_symmetry(squares: &[Square]) -> Option<Vec<usize>> {
    'sym: for k in 1..8 {
        let mut perm = vec![usize::MAX; squares.len()];
        for (i, &target) in squares.iter().enumerate() {
            // the transformed board carries the content of source into target
            let Some(source) = squares
                .iter()
                .position(|&q| q.transform(k) == target)
            else {
                continue 'sym;
            };
            perm[i] = source;
        }
        if perm.iter().enumerate().any(|(i, &j)| i != j) {
            return Some(perm);
        }
    }
    None
}

/// Applies a digit permutation to a base-3 index (most significant digit
/// first).
fn permute_digits(raw: usize, perm: &[usize], n: usize) -> usize {
    let mut digits = [0usize; 10];
    let mut r = raw;
    for i in (0..n).rev() {
        digits[i] = r % 3;
        r /= 3;
    }
    let mut out = 0;
    for i in 0..n {
        out = out * 3 + digits[perm[i]];
    }
    out
}

/// The per-ply weight matrix.
pub struct Weights {
    /// `EVAL_N_PLY` rows of `EVAL_N_WEIGHT` packed entries.
    values: Box<[i16]>,
    pub header: WeightHeader,
}

impl Weights {
    /// Loads a weight file, validating the magic header.
    pub fn load(path: &Path) -> Result<Weights, EvalError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read(&mut reader)
    }

    /// Reads weights from any byte stream in file format.
    pub fn read<R: Read>(reader: &mut R) -> Result<Weights, EvalError> {
        if reader.read_u32::<LittleEndian>()? != MAGIC_ENGINE
            || reader.read_u32::<LittleEndian>()? != MAGIC_SECTION
        {
            return Err(EvalError::BadMagic);
        }
        let header = WeightHeader {
            version: reader.read_i32::<LittleEndian>()?,
            release: reader.read_i32::<LittleEndian>()?,
            build: reader.read_i32::<LittleEndian>()?,
            date: reader.read_f64::<LittleEndian>()?,
        };

        let expected = EVAL_N_PLY * EVAL_N_WEIGHT;
        let mut values = vec![0i16; expected].into_boxed_slice();
        if let Err(err) = reader.read_i16_into::<LittleEndian>(&mut values) {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(EvalError::Truncated { expected });
            }
            return Err(EvalError::Io(err));
        }

        Ok(Weights { values, header })
    }

    /// All-zero weights: move ordering degrades but every exact endgame
    /// result is unaffected. Used when no weight file is configured.
    pub fn zeroed() -> Weights {
        Weights {
            values: vec![0i16; EVAL_N_PLY * EVAL_N_WEIGHT].into_boxed_slice(),
            header: WeightHeader {
                version: 0,
                release: 0,
                build: 0,
                date: 0.0,
            },
        }
    }

    /// The weight row of `ply`.
    #[inline]
    pub fn row(&self, ply: usize) -> &[i16] {
        &self.values[ply * EVAL_N_WEIGHT..(ply + 1) * EVAL_N_WEIGHT]
    }

    /// Builds weights from raw values; test support.
    #[cfg(test)]
    pub(crate) fn from_values(values: Box<[i16]>) -> Weights {
        assert_eq!(values.len(), EVAL_N_PLY * EVAL_N_WEIGHT);
        Weights {
            values,
            header: WeightHeader {
                version: 0,
                release: 0,
                build: 0,
                date: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    #[test]
    fn test_packing_layout() {
        let packing = Packing::build();
        // reversal-symmetric 10-square pattern (edge + 2X)
        assert_eq!(packing.packed_len(0), 29_646);
        // diagonally symmetric corner 3x3
        assert_eq!(packing.packed_len(1), 10_206);
        // asymmetric corner 2x5 stays unpacked
        assert_eq!(packing.packed_len(2), 59_049);
        // 8-square lines
        for ty in 3..=6 {
            assert_eq!(packing.packed_len(ty), 3_321, "type {ty}");
        }
        assert_eq!(packing.packed_len(7), 1_134);
        assert_eq!(packing.packed_len(8), 378);
        assert_eq!(packing.packed_len(9), 135);
        assert_eq!(packing.packed_len(10), 45);
        assert_eq!(packing.packed_len(11), 18);
        assert_eq!(packing.bias_index() + 1, EVAL_N_WEIGHT);
    }

    #[test]
    fn test_packing_identifies_mirrors() {
        let packing = Packing::build();
        // In the edge+2X pattern a configuration and its left-right mirror
        // share a packed entry. "Player disc on A1" mirrors to "player disc
        // on H1": digits (0,..,2-filled) exercised via permute_digits.
        let feature = representative_of(0);
        let n = feature.n_square;
        let perm = find_self_symmetry(&feature.squares[..n]).unwrap();
        let raw = {
            // player on the first square, rest empty
            let mut idx = 0usize;
            for i in 0..n {
                idx = idx * 3 + if i == 0 { 0 } else { 2 };
            }
            idx
        };
        let mirror = permute_digits(raw, &perm, n);
        assert_ne!(raw, mirror);
        assert_eq!(
            packing.weight_index(0, raw),
            packing.weight_index(0, mirror)
        );
    }

    #[test]
    fn test_every_feature_has_a_type_table() {
        let packing = Packing::build();
        for f in 0..TYPE_OF_FEATURE.len() {
            let ty = TYPE_OF_FEATURE[f];
            let n = EVAL_F2X[f].n_square;
            assert_eq!(
                packing.maps[ty].len(),
                3usize.pow(n as u32),
                "feature {f} disagrees with its type table"
            );
        }
    }

    #[test]
    fn test_weight_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.bin");

        {
            let mut out = std::io::BufWriter::new(std::fs::File::create(&path).unwrap());
            out.write_u32::<LittleEndian>(MAGIC_ENGINE).unwrap();
            out.write_u32::<LittleEndian>(MAGIC_SECTION).unwrap();
            out.write_i32::<LittleEndian>(2).unwrap();
            out.write_i32::<LittleEndian>(7).unwrap();
            out.write_i32::<LittleEndian>(123).unwrap();
            out.write_f64::<LittleEndian>(1_700_000_000.0).unwrap();
            for i in 0..(EVAL_N_PLY * EVAL_N_WEIGHT) as i64 {
                out.write_i16::<LittleEndian>((i % 251 - 125) as i16).unwrap();
            }
            out.flush().unwrap();
        }

        let weights = Weights::load(&path).unwrap();
        assert_eq!(weights.header.version, 2);
        assert_eq!(weights.header.release, 7);
        assert_eq!(weights.header.build, 123);
        assert_eq!(weights.row(0)[0], -125);
        assert_eq!(weights.row(0)[1], -124);
        assert_eq!(weights.row(60).len(), EVAL_N_WEIGHT);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.bin");
        std::fs::write(&path, b"not a weight file").unwrap();
        assert!(matches!(Weights::load(&path), Err(EvalError::BadMagic)));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.bin");
        {
            let mut out = std::io::BufWriter::new(std::fs::File::create(&path).unwrap());
            out.write_u32::<LittleEndian>(MAGIC_ENGINE).unwrap();
            out.write_u32::<LittleEndian>(MAGIC_SECTION).unwrap();
            out.write_i32::<LittleEndian>(1).unwrap();
            out.write_i32::<LittleEndian>(0).unwrap();
            out.write_i32::<LittleEndian>(0).unwrap();
            out.write_f64::<LittleEndian>(0.0).unwrap();
            out.write_i16::<LittleEndian>(42).unwrap();
            out.flush().unwrap();
        }
        assert!(matches!(
            Weights::load(&path),
            Err(EvalError::Truncated { .. })
        ));
    }
}
