//! Network weights, the binary file loader and the affine stack.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::accumulator::Accumulator;
use super::{FEATURES, L1, L2, PSQT_BUCKETS, QA, QB, SCALE};
use crate::types::{Color, Value};

/// File format version word.
pub const VERSION: u32 = 0x0B01_2511;

/// Architecture fingerprint: any dimension change invalidates old files.
pub const ARCH_HASH: u32 = (FEATURES as u32)
    ^ ((L1 as u32) << 8)
    ^ ((L2 as u32) << 20)
    ^ ((PSQT_BUCKETS as u32) << 26);

/// Loaded network weights, shared read-only by the workers of one NUMA
/// node (the pool clones one replica per node).
#[derive(Clone, Debug)]
pub struct NnueNetwork {
    /// Feature transformer rows, `FEATURES x L1`.
    pub ft_weights: Vec<i16>,
    /// Feature transformer bias, `L1`.
    pub ft_biases: Vec<i16>,
    /// PSQT head rows, `FEATURES x PSQT_BUCKETS`.
    pub psqt_weights: Vec<i32>,
    /// Hidden affine layer, `L1 x L2` (input is the pairwise-product
    /// halves of both perspectives).
    pub hidden_weights: Vec<i8>,
    pub hidden_biases: Vec<i32>,
    /// Output layer, `L2`.
    pub output_weights: Vec<i8>,
    pub output_bias: i32,
    /// Description string carried in the file.
    pub description: String,
}

/// Network file problems surfaced to the caller.
#[derive(Debug)]
pub enum NetworkLoadError {
    /// The file could not be opened or read
    Io(io::Error),
    /// Version word does not match this binary
    BadVersion { found: u32 },
    /// Architecture fingerprint mismatch
    BadHash { found: u32 },
    /// File ended before all weights were read
    Truncated,
    /// Extra bytes after the last weight
    TrailingBytes,
}

impl fmt::Display for NetworkLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkLoadError::Io(e) => write!(f, "network file I/O error: {e}"),
            NetworkLoadError::BadVersion { found } => {
                write!(f, "network version {found:#010x}, expected {VERSION:#010x}")
            }
            NetworkLoadError::BadHash { found } => {
                write!(
                    f,
                    "network architecture hash {found:#010x}, expected {ARCH_HASH:#010x}"
                )
            }
            NetworkLoadError::Truncated => write!(f, "network file is truncated"),
            NetworkLoadError::TrailingBytes => {
                write!(f, "network file has trailing bytes after the weights")
            }
        }
    }
}

impl std::error::Error for NetworkLoadError {}

impl From<io::Error> for NetworkLoadError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            NetworkLoadError::Truncated
        } else {
            NetworkLoadError::Io(e)
        }
    }
}

impl NnueNetwork {
    /// Load a network from a file in the engine's little-endian format:
    /// version, architecture hash, length-prefixed description, feature
    /// transformer (biases, weights, PSQT), then the small stack.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, NetworkLoadError> {
        let file = File::open(path).map_err(NetworkLoadError::Io)?;
        let mut reader = BufReader::new(file);
        let network = Self::from_reader(&mut reader)?;
        let mut probe = [0u8; 1];
        match reader.read(&mut probe) {
            Ok(0) => Ok(network),
            Ok(_) => Err(NetworkLoadError::TrailingBytes),
            Err(e) => Err(NetworkLoadError::Io(e)),
        }
    }

    /// Load from any reader (used by tests with in-memory buffers).
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self, NetworkLoadError> {
        let version = read_u32(reader)?;
        if version != VERSION {
            return Err(NetworkLoadError::BadVersion { found: version });
        }
        let hash = read_u32(reader)?;
        if hash != ARCH_HASH {
            return Err(NetworkLoadError::BadHash { found: hash });
        }

        let desc_len = read_u32(reader)? as usize;
        let mut desc_bytes = vec![0u8; desc_len];
        reader.read_exact(&mut desc_bytes)?;
        let description = String::from_utf8_lossy(&desc_bytes).into_owned();

        let ft_biases = read_i16s(reader, L1)?;
        let ft_weights = read_i16s(reader, FEATURES * L1)?;
        let psqt_weights = read_i32s(reader, FEATURES * PSQT_BUCKETS)?;

        let hidden_biases = read_i32s(reader, L2)?;
        let hidden_weights = read_i8s(reader, L1 * L2)?;
        let output_bias = read_i32s(reader, 1)?[0];
        let output_weights = read_i8s(reader, L2)?;

        Ok(NnueNetwork {
            ft_weights,
            ft_biases,
            psqt_weights,
            hidden_weights,
            hidden_biases,
            output_weights,
            output_bias,
            description,
        })
    }

    /// An all-zero network (bias-only eval). Handy for tests that only care
    /// about accumulator mechanics.
    #[must_use]
    pub fn zeroed() -> Self {
        NnueNetwork {
            ft_weights: vec![0; FEATURES * L1],
            ft_biases: vec![0; L1],
            psqt_weights: vec![0; FEATURES * PSQT_BUCKETS],
            hidden_weights: vec![0; L1 * L2],
            hidden_biases: vec![0; L2],
            output_weights: vec![0; L2],
            output_bias: 0,
            description: String::new(),
        }
    }

    /// One weight row of the feature transformer.
    #[inline]
    #[must_use]
    pub fn ft_row(&self, feature: usize) -> &[i16] {
        &self.ft_weights[feature * L1..(feature + 1) * L1]
    }

    /// One PSQT row.
    #[inline]
    #[must_use]
    pub fn psqt_row(&self, feature: usize) -> &[i32] {
        &self.psqt_weights[feature * PSQT_BUCKETS..(feature + 1) * PSQT_BUCKETS]
    }

    /// Run the affine stack on a computed accumulator. Returns the
    /// positional term (centipawn scale) and the PSQT term separately so
    /// the caller can phase-blend them.
    #[must_use]
    pub fn propagate(&self, acc: &Accumulator, stm: Color, bucket: usize) -> (Value, Value) {
        let us = stm.index();
        let them = stm.opponent().index();

        // Squared clipped ReLU with pairwise products: each perspective's
        // 512 values collapse to 256 activations; side to move first.
        let mut hidden = [0i32; L2];
        hidden.copy_from_slice(&self.hidden_biases);

        for (half, persp) in [(0usize, us), (1usize, them)] {
            let values = &acc.values[persp];
            for i in 0..L1 / 2 {
                let c0 = i32::from(values[i]).clamp(0, QA);
                let c1 = i32::from(values[i + L1 / 2]).clamp(0, QA);
                let act = (c0 * c1) >> 7;
                if act == 0 {
                    continue;
                }
                let row = half * (L1 / 2) + i;
                for (j, h) in hidden.iter_mut().enumerate() {
                    *h += act * i32::from(self.hidden_weights[row * L2 + j]);
                }
            }
        }

        let mut out = self.output_bias;
        for (j, &h) in hidden.iter().enumerate() {
            let act = (h / (QA * QB)).clamp(0, QA);
            out += act * i32::from(self.output_weights[j]);
        }
        let positional = out * SCALE / (QA * QB);

        let psqt = (acc.psqt[us][bucket] - acc.psqt[them][bucket]) / (2 * QB);
        (positional, psqt)
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, NetworkLoadError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i16s<R: Read>(reader: &mut R, count: usize) -> Result<Vec<i16>, NetworkLoadError> {
    let mut bytes = vec![0u8; count * 2];
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}

fn read_i32s<R: Read>(reader: &mut R, count: usize) -> Result<Vec<i32>, NetworkLoadError> {
    let mut bytes = vec![0u8; count * 4];
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn read_i8s<R: Read>(reader: &mut R, count: usize) -> Result<Vec<i8>, NetworkLoadError> {
    let mut bytes = vec![0u8; count];
    reader.read_exact(&mut bytes)?;
    Ok(bytes.into_iter().map(|b| b as i8).collect())
}

#[cfg(test)]
pub(crate) fn write_test_network(network: &NnueNetwork) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&ARCH_HASH.to_le_bytes());
    let desc = network.description.as_bytes();
    out.extend_from_slice(&(desc.len() as u32).to_le_bytes());
    out.extend_from_slice(desc);
    for &v in &network.ft_biases {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for &v in &network.ft_weights {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for &v in &network.psqt_weights {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for &v in &network.hidden_biases {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for &v in &network.hidden_weights {
        out.push(v as u8);
    }
    out.extend_from_slice(&network.output_bias.to_le_bytes());
    for &v in &network.output_weights {
        out.push(v as u8);
    }
    out
}
