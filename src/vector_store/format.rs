//! On-disk layout of the flat index.
//!
//! `index.bin` (little-endian): magic `RIDX`, `u32` version, 16-byte generation
//! UUID, `u32` dimensions, `u32` count, then `count * dimensions` `f32`s.
//! `chunks.json` carries the same generation and the chunk texts in id order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::IndexError;

pub const INDEX_FILE: &str = "index.bin";
pub const CHUNKS_FILE: &str = "chunks.json";

const MAGIC: &[u8; 4] = b"RIDX";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 16 + 4 + 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFile {
    pub generation: Uuid,
    pub dimensions: usize,
    pub chunks: Vec<StoredChunk>,
}

#[derive(Debug)]
pub struct VectorFile {
    pub generation: Uuid,
    pub dimensions: usize,
    pub vectors: Vec<Vec<f32>>,
}

/// Serialize vectors. Every vector must be `dimensions` long.
pub fn encode_vectors(generation: Uuid, dimensions: usize, vectors: &[&[f32]]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + vectors.len() * dimensions * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(generation.as_bytes());
    bytes.extend_from_slice(&(dimensions as u32).to_le_bytes());
    bytes.extend_from_slice(&(vectors.len() as u32).to_le_bytes());
    for vector in vectors {
        for &val in *vector {
            bytes.extend_from_slice(&val.to_le_bytes());
        }
    }
    bytes
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

pub fn decode_vectors(data: &[u8]) -> Result<VectorFile, IndexError> {
    if data.len() < HEADER_LEN {
        return Err(IndexError::Corrupt(format!(
            "{INDEX_FILE} is {} bytes, shorter than its header",
            data.len()
        )));
    }
    if &data[0..4] != MAGIC {
        return Err(IndexError::Corrupt(format!("{INDEX_FILE} has a bad magic number")));
    }
    let version = read_u32(data, 4);
    if version != VERSION {
        return Err(IndexError::Corrupt(format!(
            "{INDEX_FILE} has unsupported version {version}"
        )));
    }

    let mut generation = [0u8; 16];
    generation.copy_from_slice(&data[8..24]);
    let generation = Uuid::from_bytes(generation);
    let dimensions = read_u32(data, 24) as usize;
    let count = read_u32(data, 28) as usize;

    if dimensions == 0 && count > 0 {
        return Err(IndexError::Corrupt(format!(
            "{INDEX_FILE} declares {count} vectors of zero dimensions"
        )));
    }
    let expected = count
        .checked_mul(dimensions)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| {
            IndexError::Corrupt(format!(
                "{INDEX_FILE} header overflows: {count} vectors of {dimensions}"
            ))
        })?;
    if data.len() != expected {
        return Err(IndexError::Corrupt(format!(
            "{INDEX_FILE} is {} bytes, expected {expected} for {count} vectors of {dimensions}",
            data.len()
        )));
    }

    let body = &data[HEADER_LEN..];
    let vectors = (0..count)
        .map(|i| {
            (0..dimensions)
                .map(|d| {
                    let offset = (i * dimensions + d) * 4;
                    f32::from_le_bytes([
                        body[offset],
                        body[offset + 1],
                        body[offset + 2],
                        body[offset + 3],
                    ])
                })
                .collect()
        })
        .collect();

    Ok(VectorFile {
        generation,
        dimensions,
        vectors,
    })
}
