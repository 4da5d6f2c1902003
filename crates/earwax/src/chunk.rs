/// One block of decoded PCM.
///
/// Samples are signed 16-bit, native-endian, interleaved across channels.
/// `data` borrows the producing context's reusable buffer, so the chunk has to
/// be consumed (or copied with [`Chunk::to_owned_chunk`]) before the next pull.
/// A zero-size chunk marks the end of the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk<'a> {
    data: &'a [u8],
    time: i64,
}

impl<'a> Chunk<'a> {
    pub(crate) fn new(data: &'a [u8], time: i64) -> Self {
        Self { data, time }
    }

    pub(crate) fn end() -> Self {
        Self { data: &[], time: 0 }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Presentation timestamp in the stream's time base.
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn is_end(&self) -> bool {
        self.data.is_empty()
    }

    /// Interleaved samples.
    pub fn samples(&self) -> impl Iterator<Item = i16> + 'a {
        self.data
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
    }

    pub fn to_owned_chunk(&self) -> OwnedChunk {
        OwnedChunk {
            data: self.data.to_vec(),
            time: self.time,
        }
    }
}

/// A [`Chunk`] copied out of the context buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnedChunk {
    pub data: Vec<u8>,
    pub time: i64,
}

impl OwnedChunk {
    pub fn as_chunk(&self) -> Chunk<'_> {
        Chunk::new(&self.data, self.time)
    }
}
