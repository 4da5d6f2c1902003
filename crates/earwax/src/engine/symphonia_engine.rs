//! Media engine backed by Symphonia.
//!
//! - containers: local paths, `file://` and `http(s)://` URLs, probed with
//!   `symphonia::default::get_probe()`
//! - decoders: looked up in `symphonia::default::get_codecs()`; every decoded
//!   buffer is staged as interleaved `f32`
//! - resampling: sample-format conversion to `i16` at the source rate/layout
//!
//! Symphonia decoders always consume a whole packet, so a decode call reports
//! the full remaining length as consumed.

use std::fs::File;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{
    CODEC_TYPE_NULL, CodecDescriptor, CodecParameters, Decoder, DecoderOptions,
};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::SampleFormat as SymphoniaSampleFormat;

use super::{
    AudioDecoder, AudioFrame, CodecContext, Container, DecodeStatus, MediaEngine, MediaKind,
    Packet, PacketView, PcmFormat, Resampler, STATUS_INVALID, STATUS_IO, STATUS_RANGE,
    STATUS_UNSUPPORTED, SampleFormat, Stream,
};
use crate::error::{EngineError, EngineResult};
use crate::http_source::{HttpRangeConfig, HttpRangeSource};
use crate::info::Rational;

const USER_AGENT: &str = concat!("earwax/", env!("CARGO_PKG_VERSION"));

/// Symphonia-backed [`MediaEngine`].
///
/// Global init creates the shared HTTP agent used for network sources;
/// global deinit drops it.
#[derive(Default)]
pub struct SymphoniaEngine {
    http: HttpRangeConfig,
    agent: RwLock<Option<ureq::Agent>>,
}

impl SymphoniaEngine {
    pub fn with_http_config(http: HttpRangeConfig) -> Self {
        Self {
            http,
            agent: RwLock::new(None),
        }
    }

    fn agent(&self) -> Option<ureq::Agent> {
        self.agent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MediaEngine for SymphoniaEngine {
    type Params = SymphoniaTrack;
    type Container = SymphoniaContainer;
    type Codec = &'static CodecDescriptor;
    type Frame = SymphoniaFrame;
    type Decoder = SymphoniaDecoder;
    type Resampler = SymphoniaResampler;

    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn global_init(&self) {
        let config = ureq::Agent::config_builder()
            .user_agent(USER_AGENT)
            .build();
        let agent = ureq::Agent::new_with_config(config);
        *self.agent.write().unwrap_or_else(PoisonError::into_inner) = Some(agent);
    }

    fn global_deinit(&self) {
        self.agent
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn open_container(&self, url: &str) -> EngineResult<SymphoniaContainer> {
        let mut hint = Hint::new();
        if let Some(ext) = extension_hint(url) {
            hint.with_extension(ext);
        }

        let source: Box<dyn MediaSource> = match resolve_location(url) {
            Location::Http(url) => {
                let agent = self
                    .agent()
                    .ok_or_else(|| EngineError::new(STATUS_IO, "network support not initialized"))?;
                let source = HttpRangeSource::open(agent, url.to_string(), self.http.clone())
                    .map_err(|e| EngineError::new(STATUS_IO, e.to_string()))?;
                Box::new(source)
            }
            Location::File(path) => {
                let file = File::open(path)
                    .map_err(|e| EngineError::new(STATUS_IO, format!("open {path:?}: {e}")))?;
                Box::new(file)
            }
        };

        Ok(SymphoniaContainer {
            unprobed: Some((source, hint)),
            reader: None,
            streams: Vec::new(),
        })
    }

    fn find_decoder(&self, codec: &CodecContext<SymphoniaTrack>) -> Option<&'static CodecDescriptor> {
        symphonia::default::get_codecs().get_codec(codec.native.params.codec)
    }

    fn open_decoder(
        &self,
        codec: &'static CodecDescriptor,
        ctx: &CodecContext<SymphoniaTrack>,
    ) -> EngineResult<SymphoniaDecoder> {
        let inner = (codec.inst_func)(&ctx.native.params, &DecoderOptions::default())
            .map_err(engine_error)?;
        Ok(SymphoniaDecoder {
            inner,
            track_id: ctx.native.id,
        })
    }

    fn configure_resampler(
        &self,
        input: PcmFormat,
        output: PcmFormat,
    ) -> EngineResult<SymphoniaResampler> {
        if output.sample_format != SampleFormat::S16 {
            return Err(EngineError::new(
                STATUS_UNSUPPORTED,
                "only 16-bit signed output is supported",
            ));
        }
        if output.sample_rate != input.sample_rate || output.channels != input.channels {
            return Err(EngineError::new(
                STATUS_UNSUPPORTED,
                "rate and layout conversion are not supported",
            ));
        }
        Ok(SymphoniaResampler { input })
    }
}

/// Track identity and parameters needed to build a decoder.
#[derive(Clone, Debug)]
pub struct SymphoniaTrack {
    pub id: u32,
    pub params: CodecParameters,
}

enum Location<'a> {
    Http(&'a str),
    File(&'a Path),
}

fn resolve_location(url: &str) -> Location<'_> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Location::Http(url)
    } else {
        Location::File(Path::new(url.strip_prefix("file://").unwrap_or(url)))
    }
}

/// File extension of a path or URL, ignoring query and fragment.
fn extension_hint(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

pub struct SymphoniaContainer {
    unprobed: Option<(Box<dyn MediaSource>, Hint)>,
    reader: Option<Box<dyn FormatReader>>,
    streams: Vec<Stream<SymphoniaTrack>>,
}

impl Container for SymphoniaContainer {
    type Params = SymphoniaTrack;

    fn probe_streams(&mut self) -> EngineResult<()> {
        let Some((source, hint)) = self.unprobed.take() else {
            return Ok(());
        };
        let byte_len = source.byte_len();
        let mss = MediaSourceStream::new(source, Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(engine_error)?;

        let reader = probed.format;
        self.streams = reader
            .tracks()
            .iter()
            .enumerate()
            .map(|(index, track)| stream_from_track(index, track, byte_len))
            .collect();
        self.reader = Some(reader);
        Ok(())
    }

    fn streams(&self) -> &[Stream<SymphoniaTrack>] {
        &self.streams
    }

    fn read_packet(&mut self) -> EngineResult<Option<Packet>> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(EngineError::new(STATUS_INVALID, "container not probed"));
        };
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(SymphoniaError::ResetRequired) => {
                tracing::debug!("track list changed mid-stream; ending");
                return Ok(None);
            }
            Err(e) => return Err(engine_error(e)),
        };

        let stream_index = self
            .streams
            .iter()
            .position(|s| s.codec.native.id == packet.track_id())
            .unwrap_or(usize::MAX);
        Ok(Some(Packet {
            stream_index,
            pts: packet.ts() as i64,
            duration: packet.dur(),
            data: packet.data,
        }))
    }

    fn seek(&mut self, stream_index: usize, ts: i64, backward: bool) -> i32 {
        let (Some(reader), Some(stream)) = (self.reader.as_mut(), self.streams.get(stream_index))
        else {
            return STATUS_INVALID;
        };
        let mode = if backward {
            SeekMode::Accurate
        } else {
            SeekMode::Coarse
        };
        let to = SeekTo::TimeStamp {
            ts: ts.max(0) as u64,
            track_id: stream.codec.native.id,
        };
        match reader.seek(mode, to) {
            Ok(seeked) => {
                tracing::debug!(
                    required_ts = seeked.required_ts,
                    actual_ts = seeked.actual_ts,
                    "container seeked"
                );
                0
            }
            Err(e) => {
                tracing::debug!("container seek failed: {e}");
                status_of(&e)
            }
        }
    }
}

fn stream_from_track(index: usize, track: &Track, byte_len: Option<u64>) -> Stream<SymphoniaTrack> {
    let params = &track.codec_params;
    let kind = if params.codec == CODEC_TYPE_NULL {
        MediaKind::Unknown
    } else {
        MediaKind::Audio
    };
    let sample_rate = params.sample_rate.unwrap_or(0);
    let time_base = params
        .time_base
        .map(|tb| Rational::new(tb.numer as i64, tb.denom as i64))
        .or_else(|| (sample_rate > 0).then(|| Rational::new(1, sample_rate as i64)))
        .unwrap_or_default();
    let duration = params
        .n_frames
        .map(|frames| frames_to_ts(frames, sample_rate, time_base))
        .unwrap_or(0);

    Stream {
        index,
        kind,
        time_base,
        start_time: params.start_ts as i64,
        duration,
        codec: CodecContext {
            codec_id: codec_name_from_params(params),
            sample_rate,
            channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
            channel_layout: params.channels.map(|c| c.bits() as u64).unwrap_or(0),
            sample_format: params
                .sample_format
                .map(sample_format_from)
                .unwrap_or_default(),
            frame_size: params.max_frames_per_packet.unwrap_or(0) as usize,
            bit_rate: estimate_bit_rate(byte_len, time_base.seconds(duration)),
            native: SymphoniaTrack {
                id: track.id,
                params: params.clone(),
            },
        },
    }
}

/// Convert a count of audio frames to `time_base` ticks.
fn frames_to_ts(frames: u64, sample_rate: u32, time_base: Rational) -> i64 {
    if sample_rate == 0 || time_base.num <= 0 || time_base.den <= 0 {
        return frames as i64;
    }
    let ticks = frames as i128 * time_base.den as i128
        / (sample_rate as i128 * time_base.num as i128);
    ticks.min(i64::MAX as i128) as i64
}

/// Average bits per second over the whole source, 0 when unknown.
fn estimate_bit_rate(byte_len: Option<u64>, seconds: f64) -> i64 {
    match byte_len {
        Some(len) if seconds > 0.0 => (len as f64 * 8.0 / seconds).round() as i64,
        _ => 0,
    }
}

fn sample_format_from(format: SymphoniaSampleFormat) -> SampleFormat {
    match format {
        SymphoniaSampleFormat::U8 | SymphoniaSampleFormat::S8 => SampleFormat::U8,
        SymphoniaSampleFormat::U16 | SymphoniaSampleFormat::S16 => SampleFormat::S16,
        SymphoniaSampleFormat::U24 | SymphoniaSampleFormat::S24 => SampleFormat::S24,
        SymphoniaSampleFormat::U32 | SymphoniaSampleFormat::S32 => SampleFormat::S32,
        SymphoniaSampleFormat::F32 => SampleFormat::F32,
        SymphoniaSampleFormat::F64 => SampleFormat::F64,
    }
}

/// Best-effort codec label used in stream info.
fn codec_name_from_params(params: &CodecParameters) -> String {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        other => {
            return symphonia::default::get_codecs()
                .get_codec(other)
                .map(|d| d.short_name.to_uppercase())
                .unwrap_or_else(|| format!("{other:?}"));
        }
    };
    name.to_string()
}

fn status_of(e: &SymphoniaError) -> i32 {
    match e {
        SymphoniaError::IoError(_) => STATUS_IO,
        SymphoniaError::SeekError(SeekErrorKind::OutOfRange) => STATUS_RANGE,
        SymphoniaError::SeekError(SeekErrorKind::InvalidTrack) => STATUS_INVALID,
        SymphoniaError::SeekError(_) => STATUS_UNSUPPORTED,
        SymphoniaError::Unsupported(_) => STATUS_UNSUPPORTED,
        SymphoniaError::LimitError(_) => STATUS_RANGE,
        _ => STATUS_INVALID,
    }
}

fn engine_error(e: SymphoniaError) -> EngineError {
    EngineError::new(status_of(&e), e.to_string())
}

/// A decoded buffer staged as interleaved `f32`.
#[derive(Default)]
pub struct SymphoniaFrame {
    buf: Option<SampleBuffer<f32>>,
    spec: Option<SignalSpec>,
    capacity_frames: usize,
    frames: usize,
    pts: i64,
}

impl SymphoniaFrame {
    fn stage(&mut self, decoded: AudioBufferRef<'_>, pts: i64) {
        let spec = *decoded.spec();
        let frames = decoded.frames();
        if self.spec != Some(spec) || self.capacity_frames < frames {
            self.buf = Some(SampleBuffer::new(frames as u64, spec));
            self.spec = Some(spec);
            self.capacity_frames = frames;
        }
        let Some(buf) = self.buf.as_mut() else {
            return;
        };
        buf.copy_interleaved_ref(decoded);
        self.frames = frames;
        self.pts = pts;
    }

    /// Interleaved samples of the staged frame.
    pub fn samples(&self) -> &[f32] {
        if self.frames == 0 {
            return &[];
        }
        self.buf.as_ref().map(|b| b.samples()).unwrap_or(&[])
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.map(|s| s.rate).unwrap_or(0)
    }
}

impl AudioFrame for SymphoniaFrame {
    fn samples_per_channel(&self) -> usize {
        self.frames
    }

    fn channels(&self) -> usize {
        self.spec.map(|s| s.channels.count()).unwrap_or(0)
    }

    fn pts(&self) -> i64 {
        self.pts
    }

    fn clear(&mut self) {
        self.frames = 0;
    }
}

pub struct SymphoniaDecoder {
    inner: Box<dyn Decoder>,
    track_id: u32,
}

impl AudioDecoder for SymphoniaDecoder {
    type Frame = SymphoniaFrame;

    fn decode(
        &mut self,
        packet: &PacketView<'_>,
        frame: &mut SymphoniaFrame,
    ) -> EngineResult<DecodeStatus> {
        let pkt = symphonia::core::formats::Packet::new_from_slice(
            self.track_id,
            packet.pts.max(0) as u64,
            packet.duration,
            packet.data,
        );
        match self.inner.decode(&pkt) {
            Ok(decoded) => {
                let got_frame = decoded.frames() > 0;
                if got_frame {
                    frame.stage(decoded, packet.pts);
                }
                Ok(DecodeStatus {
                    consumed: packet.data.len(),
                    got_frame,
                })
            }
            Err(SymphoniaError::ResetRequired) => {
                self.inner.reset();
                Err(EngineError::new(STATUS_INVALID, "decoder reset required"))
            }
            Err(e) => Err(engine_error(e)),
        }
    }

    fn flush(&mut self) {
        self.inner.reset();
    }
}

/// Converts staged `f32` frames to interleaved native-endian `i16`.
pub struct SymphoniaResampler {
    input: PcmFormat,
}

impl Resampler for SymphoniaResampler {
    type Frame = SymphoniaFrame;

    fn convert(&mut self, frame: &SymphoniaFrame, out: &mut [u8]) -> EngineResult<usize> {
        if self.input.channels != 0 && frame.channels() != self.input.channels as usize {
            return Err(EngineError::new(
                STATUS_INVALID,
                format!(
                    "frame has {} channels, resampler configured for {}",
                    frame.channels(),
                    self.input.channels
                ),
            ));
        }
        if self.input.sample_rate != 0 && frame.sample_rate() != self.input.sample_rate {
            return Err(EngineError::new(
                STATUS_INVALID,
                format!(
                    "frame rate {} Hz differs from configured {} Hz",
                    frame.sample_rate(),
                    self.input.sample_rate
                ),
            ));
        }
        for (dst, &sample) in out.chunks_exact_mut(2).zip(frame.samples()) {
            dst.copy_from_slice(&i16::from_sample(sample).to_ne_bytes());
        }
        Ok(frame.samples_per_channel())
    }
}
