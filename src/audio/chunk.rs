use std::sync::Arc;

/// One captured audio chunk
///
/// Bytes are shared so fan-out to many consumers never copies the payload.
/// The sequence number is assigned by the capture loop and increases by one
/// per tick.
#[derive(Clone, Debug)]
pub struct AudioChunk {
    bytes: Arc<[u8]>,
    seq: u64,
}

impl AudioChunk {
    pub fn new(bytes: Vec<u8>, seq: u64) -> Self {
        Self {
            bytes: bytes.into(),
            seq,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
