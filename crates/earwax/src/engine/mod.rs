//! Boundary to the external media engine.
//!
//! Container parsing, codec bitstream decoding and sample conversion are not
//! implemented in this crate. They are consumed through [`MediaEngine`] and its
//! associated types, which map one-to-one onto the primitives the decode
//! context needs:
//! - open a container and probe its streams
//! - find and open a decoder for a stream
//! - configure a resampler to 16-bit interleaved PCM
//! - read packets, decode (possibly partially) into frames, convert frames
//! - seek the container
//!
//! [`symphonia_engine::SymphoniaEngine`] is the production implementation.

pub mod symphonia_engine;

#[cfg(test)]
pub(crate) mod scripted;

use crate::error::EngineResult;

/// Generic I/O failure.
pub const STATUS_IO: i32 = -5;
/// Invalid argument or malformed data.
pub const STATUS_INVALID: i32 = -22;
/// Request outside the valid range.
pub const STATUS_RANGE: i32 = -34;
/// Operation not supported by the source or engine.
pub const STATUS_UNSUPPORTED: i32 = -38;

/// Kind of media carried by a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Subtitle,
    Data,
    Unknown,
}

/// Sample encoding of decoded or converted audio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleFormat {
    #[default]
    Unknown,
    U8,
    S16,
    S24,
    S32,
    F32,
    F64,
}

/// Layout of PCM on one side of a resampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    /// 0 when the container does not declare it; frames then decide.
    pub channels: u16,
    /// Engine-specific channel mask, 0 when unknown.
    pub channel_layout: u64,
    pub sample_format: SampleFormat,
}

/// Codec parameters copied out of a stream.
///
/// `native` holds whatever the engine needs to instantiate a decoder.
#[derive(Clone, Debug)]
pub struct CodecContext<P> {
    /// Human-readable codec identifier.
    pub codec_id: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: u64,
    pub sample_format: SampleFormat,
    /// Samples per channel in one frame, 0 when variable or unknown.
    pub frame_size: usize,
    /// Bits per second, 0 when unknown.
    pub bit_rate: i64,
    pub native: P,
}

impl<P> CodecContext<P> {
    /// PCM layout this codec decodes to.
    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            channel_layout: self.channel_layout,
            sample_format: self.sample_format,
        }
    }
}

/// One stream of a probed container.
#[derive(Clone, Debug)]
pub struct Stream<P> {
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: crate::info::Rational,
    pub start_time: i64,
    pub duration: i64,
    pub codec: CodecContext<P>,
}

/// Compressed data for one stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    /// Presentation timestamp in the stream's time base.
    pub pts: i64,
    pub duration: u64,
    pub data: Box<[u8]>,
}

/// Unconsumed tail of a [`Packet`] handed to a decoder.
#[derive(Clone, Copy, Debug)]
pub struct PacketView<'a> {
    pub stream_index: usize,
    pub pts: i64,
    pub duration: u64,
    pub data: &'a [u8],
}

/// Result of one decode call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStatus {
    /// Bytes of the submitted data the decoder used.
    pub consumed: usize,
    /// Whether the output frame now holds a complete frame.
    pub got_frame: bool,
}

/// Decoded audio in the decoder's native layout.
pub trait AudioFrame {
    fn samples_per_channel(&self) -> usize;
    fn channels(&self) -> usize;
    /// Presentation timestamp in the stream's time base.
    fn pts(&self) -> i64;
    /// Drop the frame's contents, keeping any allocation for reuse.
    fn clear(&mut self);
}

/// A demuxer over one opened source.
pub trait Container: Send {
    type Params: Clone + Send;

    /// Read enough of the source to populate [`Container::streams`].
    fn probe_streams(&mut self) -> EngineResult<()>;

    /// Streams in container order; empty before probing.
    fn streams(&self) -> &[Stream<Self::Params>];

    /// Next packet of any stream, `Ok(None)` once the source is exhausted.
    fn read_packet(&mut self) -> EngineResult<Option<Packet>>;

    /// Reposition the read cursor near `ts` of `stream_index`.
    ///
    /// With `backward`, lands on the nearest sync point at or before `ts`.
    /// Returns a non-negative status on success, negative on failure.
    fn seek(&mut self, stream_index: usize, ts: i64, backward: bool) -> i32;
}

pub trait AudioDecoder: Send {
    type Frame: AudioFrame;

    /// Decode from the head of `packet.data` into `frame`.
    ///
    /// May consume only part of the data; the caller resubmits the rest.
    fn decode(
        &mut self,
        packet: &PacketView<'_>,
        frame: &mut Self::Frame,
    ) -> EngineResult<DecodeStatus>;

    /// Discard internal state, e.g. after a seek.
    fn flush(&mut self);
}

pub trait Resampler: Send {
    type Frame: AudioFrame;

    /// Write `frame` into `out` as interleaved native-endian `i16`.
    ///
    /// `out` holds at least `samples_per_channel * channels * 2` bytes.
    /// Returns the number of samples per channel written.
    fn convert(&mut self, frame: &Self::Frame, out: &mut [u8]) -> EngineResult<usize>;
}

/// The external media engine.
pub trait MediaEngine: Send + Sync + 'static {
    type Params: Clone + Send;
    type Container: Container<Params = Self::Params>;
    /// Handle returned by decoder lookup.
    type Codec;
    type Frame: AudioFrame + Default + Send;
    type Decoder: AudioDecoder<Frame = Self::Frame>;
    type Resampler: Resampler<Frame = Self::Frame>;

    fn name(&self) -> &'static str;

    /// Process-wide setup, run on the first library acquisition.
    fn global_init(&self);

    /// Process-wide teardown, run when the last library handle is released.
    fn global_deinit(&self);

    fn open_container(&self, url: &str) -> EngineResult<Self::Container>;

    fn find_decoder(&self, codec: &CodecContext<Self::Params>) -> Option<Self::Codec>;

    fn open_decoder(
        &self,
        codec: Self::Codec,
        ctx: &CodecContext<Self::Params>,
    ) -> EngineResult<Self::Decoder>;

    fn configure_resampler(
        &self,
        input: PcmFormat,
        output: PcmFormat,
    ) -> EngineResult<Self::Resampler>;
}
