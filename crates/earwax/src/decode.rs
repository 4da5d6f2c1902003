//! Per-URL decode context.
//!
//! A [`DecodeContext`] owns everything needed to turn one audio stream of a
//! container into 16-bit interleaved PCM: the library handle, the container,
//! the decoder, the resampler, a decoded frame and a reusable output buffer.
//! Fields are declared in reverse acquisition order so that dropping the
//! context (or unwinding a failed construction) releases them newest first,
//! with the library handle last.

use std::fmt;
use std::sync::Arc;

use crate::chunk::{Chunk, OwnedChunk};
use crate::config::{DecodeConfig, StreamSelection};
use crate::engine::{
    AudioDecoder, AudioFrame, Container, MediaEngine, MediaKind, Packet, PacketView, PcmFormat,
    Resampler, SampleFormat, Stream,
};
use crate::error::{EngineResult, Error, Result};
use crate::info::StreamInfo;
use crate::lifecycle::{Library, LibraryHandle};

const BYTES_PER_SAMPLE: usize = 2;
/// Upper bound on the buffer allocated from container-declared sizes.
const MAX_INITIAL_BUFFER: usize = 16 * 1024 * 1024;

/// Packet being fed to the decoder, with a cursor over the bytes not yet consumed.
struct PendingPacket {
    packet: Packet,
    offset: usize,
}

impl PendingPacket {
    fn new(packet: Packet) -> Self {
        Self { packet, offset: 0 }
    }

    fn view(&self) -> PacketView<'_> {
        PacketView {
            stream_index: self.packet.stream_index,
            pts: self.packet.pts,
            duration: self.packet.duration,
            data: &self.packet.data[self.offset..],
        }
    }

    fn advance(&mut self, consumed: usize) {
        self.offset = (self.offset + consumed).min(self.packet.data.len());
    }

    fn exhaust(&mut self) {
        self.offset = self.packet.data.len();
    }

    fn is_exhausted(&self) -> bool {
        self.offset >= self.packet.data.len()
    }
}

enum Step {
    /// The frame holds decoded audio ready for conversion.
    Frame,
    /// Decode made progress or gave up on the packet; try again.
    Continue,
    /// Nothing left of the pending packet.
    NeedPacket,
}

/// Streaming decoder for one audio stream of one URL.
pub struct DecodeContext<E: MediaEngine> {
    buffer: Vec<u8>,
    frame: E::Frame,
    pending: Option<PendingPacket>,
    resampler: E::Resampler,
    decoder: E::Decoder,
    container: E::Container,
    stream_index: usize,
    finished: bool,
    info: StreamInfo,
    url: String,
    handle: LibraryHandle<E>,
}

impl<E: MediaEngine> DecodeContext<E> {
    /// Open `url` with the default [`DecodeConfig`].
    pub fn open(library: &Arc<Library<E>>, url: &str) -> Result<Self> {
        Self::open_with(library, url, &DecodeConfig::default())
    }

    /// Open `url`, select its audio stream and prepare decoding.
    ///
    /// Acquires a library handle for the lifetime of the context. On failure
    /// every resource acquired so far is released again, handle included.
    pub fn open_with(library: &Arc<Library<E>>, url: &str, config: &DecodeConfig) -> Result<Self> {
        let handle = library.acquire();
        let engine = handle.engine();

        let mut container = engine.open_container(url).map_err(|source| Error::Io {
            url: url.to_string(),
            source,
        })?;
        container.probe_streams().map_err(|source| Error::Io {
            url: url.to_string(),
            source,
        })?;

        let stream = select_stream(container.streams(), config.stream_selection)
            .cloned()
            .ok_or_else(|| Error::AudioStreamNotFound {
                url: url.to_string(),
            })?;

        let codec = engine
            .find_decoder(&stream.codec)
            .ok_or_else(|| Error::DecoderNotFound {
                codec: stream.codec.codec_id.clone(),
            })?;
        let decoder = engine
            .open_decoder(codec, &stream.codec)
            .map_err(Error::DecoderOpenFailed)?;

        let input = stream.codec.pcm_format();
        let output = PcmFormat {
            sample_format: SampleFormat::S16,
            ..input
        };
        let resampler = engine.configure_resampler(input, output)?;

        let buffer_len = initial_buffer_len(
            stream.codec.frame_size,
            config.buffer_padding_frames,
            stream.codec.channels,
        );
        let buffer = vec![0u8; buffer_len];

        let info = StreamInfo {
            bitrate: stream.codec.bit_rate,
            sample_rate: stream.codec.sample_rate,
            channels: stream.codec.channels,
            start_time: stream.start_time,
            duration: stream.duration,
            time_base: stream.time_base,
            codec: Some(stream.codec.codec_id.clone()),
        };

        tracing::info!(
            url,
            engine = engine.name(),
            stream = stream.index,
            codec = %stream.codec.codec_id,
            sample_rate = info.sample_rate,
            channels = info.channels,
            duration_secs = info.duration_secs(),
            "opened decode context"
        );

        Ok(Self {
            buffer,
            frame: E::Frame::default(),
            pending: None,
            resampler,
            decoder,
            container,
            stream_index: stream.index,
            finished: false,
            info,
            url: url.to_string(),
            handle,
        })
    }

    /// Produce the next chunk of PCM.
    ///
    /// Returns a zero-size chunk once the stream is exhausted, and keeps
    /// returning one on every later call until a successful [`seek`].
    /// The chunk borrows the context's buffer, which the next call reuses.
    ///
    /// [`seek`]: DecodeContext::seek
    pub fn spit(&mut self) -> Chunk<'_> {
        if self.finished {
            return Chunk::end();
        }
        loop {
            match self.decode_pending() {
                Step::Frame => match self.convert_frame() {
                    // An empty chunk would read as end of stream.
                    Ok(0) => tracing::trace!("skipping empty frame"),
                    Ok(size) => return Chunk::new(&self.buffer[..size], self.frame.pts()),
                    Err(e) => {
                        tracing::warn!(url = %self.url, error = %e, "dropping frame that failed conversion");
                    }
                },
                Step::Continue => {}
                Step::NeedPacket => {
                    if !self.next_packet() {
                        tracing::debug!(url = %self.url, "end of stream");
                        self.finished = true;
                        return Chunk::end();
                    }
                }
            }
        }
    }

    fn decode_pending(&mut self) -> Step {
        let Some(pending) = self.pending.as_mut() else {
            return Step::NeedPacket;
        };
        if pending.is_exhausted() {
            return Step::NeedPacket;
        }

        let view = pending.view();
        let submitted = view.data.len();
        match self.decoder.decode(&view, &mut self.frame) {
            Ok(status) => {
                pending.advance(status.consumed);
                if status.got_frame {
                    return Step::Frame;
                }
                // A decoder that neither consumes nor produces would spin forever.
                if status.consumed == 0 {
                    tracing::trace!(bytes = submitted, "decoder stalled, dropping packet remainder");
                    pending.exhaust();
                }
                Step::Continue
            }
            Err(e) => {
                tracing::debug!(error = %e, bytes = submitted, "decode failed, dropping packet remainder");
                pending.exhaust();
                Step::Continue
            }
        }
    }

    /// Load the next packet of the selected stream. Returns false at end of stream.
    fn next_packet(&mut self) -> bool {
        self.pending = None;
        self.frame.clear();
        loop {
            match self.container.read_packet() {
                Ok(Some(packet)) if packet.stream_index == self.stream_index => {
                    self.pending = Some(PendingPacket::new(packet));
                    return true;
                }
                Ok(Some(packet)) => {
                    tracing::trace!(stream = packet.stream_index, "skipping packet of another stream");
                }
                Ok(None) => return false,
                Err(e) => {
                    tracing::debug!(url = %self.url, error = %e, "read failed, treating as end of stream");
                    return false;
                }
            }
        }
    }

    /// Convert the current frame into the buffer; returns the byte count.
    fn convert_frame(&mut self) -> EngineResult<usize> {
        let samples = self.frame.samples_per_channel();
        let channels = self.frame.channels();
        let needed = samples * channels * BYTES_PER_SAMPLE;
        if self.buffer.len() < needed {
            tracing::debug!(
                from = self.buffer.len(),
                to = needed,
                "growing output buffer"
            );
            self.buffer.resize(needed, 0);
        }
        let written = self.resampler.convert(&self.frame, &mut self.buffer[..needed])?;
        Ok(written.min(samples) * channels * BYTES_PER_SAMPLE)
    }

    /// Stream information captured at open time.
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Index of the decoded stream within its container.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Reposition to `pts`, clamped into `[start_time, duration]`.
    ///
    /// Seeks backward to the nearest sync point at or before the target.
    /// On success the pending packet and decoder state are discarded and the
    /// engine's non-negative status is returned. A negative status comes back
    /// as [`Error::Seek`] and leaves the context as it was.
    pub fn seek(&mut self, pts: i64) -> Result<i32> {
        let target = self.info.clamp_pts(pts);
        let status = self.container.seek(self.stream_index, target, true);
        if status < 0 {
            tracing::warn!(url = %self.url, requested = pts, target, status, "seek failed");
            return Err(Error::Seek { status });
        }
        self.pending = None;
        self.frame.clear();
        self.decoder.flush();
        self.finished = false;
        tracing::debug!(url = %self.url, requested = pts, target, "seeked");
        Ok(status)
    }

    /// Pull chunks until end of stream, handing each to `f`. Returns the count.
    pub fn for_each_chunk<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(Chunk<'_>),
    {
        let mut count = 0;
        loop {
            let chunk = self.spit();
            if chunk.is_end() {
                return count;
            }
            f(chunk);
            count += 1;
        }
    }

    /// Iterate over copies of the remaining chunks.
    pub fn into_owned_chunks(self) -> OwnedChunks<E> {
        OwnedChunks { ctx: self }
    }

    /// Release the context. Equivalent to dropping it.
    pub fn close(self) {}
}

impl<E: MediaEngine> Drop for DecodeContext<E> {
    fn drop(&mut self) {
        tracing::debug!(url = %self.url, "closing decode context");
    }
}

impl<E: MediaEngine> fmt::Debug for DecodeContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeContext")
            .field("url", &self.url)
            .field("stream_index", &self.stream_index)
            .field("finished", &self.finished)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`DecodeContext::into_owned_chunks`].
pub struct OwnedChunks<E: MediaEngine> {
    ctx: DecodeContext<E>,
}

impl<E: MediaEngine> Iterator for OwnedChunks<E> {
    type Item = OwnedChunk;

    fn next(&mut self) -> Option<OwnedChunk> {
        let chunk = self.ctx.spit();
        (!chunk.is_end()).then(|| chunk.to_owned_chunk())
    }
}

/// Bytes for `frame_size + padding` samples per channel.
///
/// Returns 0 (grow on first frame) when the declared size overflows or
/// exceeds [`MAX_INITIAL_BUFFER`].
fn initial_buffer_len(frame_size: usize, padding: usize, channels: u16) -> usize {
    let len = frame_size
        .checked_add(padding)
        .and_then(|n| n.checked_mul(usize::from(channels)))
        .and_then(|n| n.checked_mul(BYTES_PER_SAMPLE));
    match len {
        Some(len) if len <= MAX_INITIAL_BUFFER => len,
        _ => {
            tracing::debug!(
                frame_size,
                channels,
                "declared frame size unusable, sizing buffer from frames"
            );
            0
        }
    }
}

fn select_stream<P>(streams: &[Stream<P>], selection: StreamSelection) -> Option<&Stream<P>> {
    let mut audio = streams.iter().filter(|s| s.kind == MediaKind::Audio);
    match selection {
        StreamSelection::Last => audio.last(),
        StreamSelection::First => audio.next(),
    }
}
