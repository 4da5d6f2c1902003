//! Deterministic in-memory engine for unit tests.
//!
//! Packet bytes are decode instructions, one byte per decode call:
//! - `1..=0xED`: emit frame number `n` of the packet (`pts = packet.pts + (n - 1) * samples`)
//! - [`SKIP`]: consume the byte, no frame
//! - [`STALL`]: consume nothing, no frame
//! - [`BROKEN`]: fail the decode call
//!
//! Every resource drop and lifecycle call is appended to an [`EventLog`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::*;
use crate::error::EngineError;
use crate::info::Rational;

pub(crate) const SKIP: u8 = 0x00;
pub(crate) const STALL: u8 = 0xFF;
pub(crate) const BROKEN: u8 = 0xEE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Init,
    Deinit,
    ContainerOpened,
    ContainerDropped,
    DecoderDropped,
    ResamplerDropped,
    Seek(i64),
    Flush,
}

#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub(crate) fn count(&self, event: Event) -> usize {
        self.0.lock().unwrap().iter().filter(|e| **e == event).count()
    }

    pub(crate) fn snapshot(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    /// Events that release resources, in order.
    pub(crate) fn drops(&self) -> Vec<Event> {
        self.snapshot()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::ContainerDropped | Event::DecoderDropped | Event::ResamplerDropped
                )
            })
            .collect()
    }
}

/// Step at which the engine refuses to continue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Failure {
    Open,
    Probe,
    DecoderMissing,
    DecoderOpen,
    Resampler,
    /// `read_packet` errors once this many packets have been returned.
    ReadAfter(usize),
}

pub(crate) struct ScriptedEngine {
    events: EventLog,
    streams: Vec<Stream<()>>,
    packets: Vec<Packet>,
    samples_per_frame: usize,
    failure: Option<Failure>,
    seek_status: i32,
}

pub(crate) fn audio_stream(index: usize, channels: u16) -> Stream<()> {
    Stream {
        index,
        kind: MediaKind::Audio,
        time_base: Rational::new(1, 44_100),
        start_time: 0,
        duration: 0,
        codec: CodecContext {
            codec_id: format!("scripted-{index}"),
            sample_rate: 44_100,
            channels,
            channel_layout: 0,
            sample_format: SampleFormat::F32,
            frame_size: 1024,
            bit_rate: 1_411_200,
            native: (),
        },
    }
}

pub(crate) fn video_stream(index: usize) -> Stream<()> {
    let mut stream = audio_stream(index, 0);
    stream.kind = MediaKind::Video;
    stream.codec.sample_rate = 0;
    stream
}

pub(crate) fn packet(stream_index: usize, pts: i64, data: &[u8]) -> Packet {
    Packet {
        stream_index,
        pts,
        duration: 0,
        data: data.into(),
    }
}

impl ScriptedEngine {
    /// One stereo 44.1 kHz stream with `packets` single-frame packets of 1024 samples.
    pub(crate) fn stereo_44k(packets: usize) -> Self {
        let mut stream = audio_stream(0, 2);
        stream.duration = packets as i64 * 1024;
        Self {
            events: EventLog::default(),
            streams: vec![stream],
            packets: (0..packets)
                .map(|i| packet(0, i as i64 * 1024, &[1]))
                .collect(),
            samples_per_frame: 1024,
            failure: None,
            seek_status: 0,
        }
    }

    pub(crate) fn with_streams(mut self, streams: Vec<Stream<()>>) -> Self {
        self.streams = streams;
        self
    }

    pub(crate) fn with_packets(mut self, packets: Vec<Packet>) -> Self {
        self.packets = packets;
        self
    }

    pub(crate) fn with_samples_per_frame(mut self, samples: usize) -> Self {
        self.samples_per_frame = samples;
        self
    }

    pub(crate) fn with_span(mut self, start_time: i64, duration: i64) -> Self {
        for stream in &mut self.streams {
            stream.start_time = start_time;
            stream.duration = duration;
        }
        self
    }

    pub(crate) fn with_seek_status(mut self, status: i32) -> Self {
        self.seek_status = status;
        self
    }

    pub(crate) fn failing_at(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub(crate) fn events(&self) -> EventLog {
        self.events.clone()
    }

    fn fails_at(&self, failure: Failure) -> bool {
        self.failure == Some(failure)
    }
}

impl MediaEngine for ScriptedEngine {
    type Params = ();
    type Container = ScriptedContainer;
    type Codec = ();
    type Frame = ScriptedFrame;
    type Decoder = ScriptedDecoder;
    type Resampler = ScriptedResampler;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn global_init(&self) {
        self.events.push(Event::Init);
    }

    fn global_deinit(&self) {
        self.events.push(Event::Deinit);
    }

    fn open_container(&self, url: &str) -> EngineResult<ScriptedContainer> {
        if self.fails_at(Failure::Open) {
            return Err(EngineError::new(STATUS_IO, format!("cannot open {url}")));
        }
        self.events.push(Event::ContainerOpened);
        let read_limit = match self.failure {
            Some(Failure::ReadAfter(n)) => Some(n),
            _ => None,
        };
        Ok(ScriptedContainer {
            events: self.events.clone(),
            all_streams: self.streams.clone(),
            streams: Vec::new(),
            all_packets: self.packets.clone(),
            queue: VecDeque::new(),
            returned: 0,
            read_limit,
            fail_probe: self.fails_at(Failure::Probe),
            seek_status: self.seek_status,
        })
    }

    fn find_decoder(&self, _codec: &CodecContext<()>) -> Option<()> {
        (!self.fails_at(Failure::DecoderMissing)).then_some(())
    }

    fn open_decoder(&self, _codec: (), ctx: &CodecContext<()>) -> EngineResult<ScriptedDecoder> {
        if self.fails_at(Failure::DecoderOpen) {
            return Err(EngineError::new(STATUS_INVALID, "decoder rejected parameters"));
        }
        Ok(ScriptedDecoder {
            events: self.events.clone(),
            channels: ctx.channels as usize,
            samples_per_frame: self.samples_per_frame,
        })
    }

    fn configure_resampler(
        &self,
        input: PcmFormat,
        output: PcmFormat,
    ) -> EngineResult<ScriptedResampler> {
        if self.fails_at(Failure::Resampler) || output.sample_format != SampleFormat::S16 {
            return Err(EngineError::new(STATUS_UNSUPPORTED, "resampler unavailable"));
        }
        Ok(ScriptedResampler {
            events: self.events.clone(),
            channels: input.channels as usize,
        })
    }
}

pub(crate) struct ScriptedContainer {
    events: EventLog,
    all_streams: Vec<Stream<()>>,
    streams: Vec<Stream<()>>,
    all_packets: Vec<Packet>,
    queue: VecDeque<Packet>,
    returned: usize,
    read_limit: Option<usize>,
    fail_probe: bool,
    seek_status: i32,
}

impl Container for ScriptedContainer {
    type Params = ();

    fn probe_streams(&mut self) -> EngineResult<()> {
        if self.fail_probe {
            return Err(EngineError::new(STATUS_INVALID, "unrecognized container"));
        }
        self.streams = self.all_streams.clone();
        self.queue = self.all_packets.iter().cloned().collect();
        Ok(())
    }

    fn streams(&self) -> &[Stream<()>] {
        &self.streams
    }

    fn read_packet(&mut self) -> EngineResult<Option<Packet>> {
        if self.read_limit.is_some_and(|n| self.returned >= n) {
            return Err(EngineError::new(STATUS_IO, "connection reset"));
        }
        let packet = self.queue.pop_front();
        if packet.is_some() {
            self.returned += 1;
        }
        Ok(packet)
    }

    fn seek(&mut self, stream_index: usize, ts: i64, backward: bool) -> i32 {
        self.events.push(Event::Seek(ts));
        if self.seek_status < 0 {
            return self.seek_status;
        }
        let target = self
            .all_packets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.stream_index == stream_index)
            .filter(|(_, p)| if backward { p.pts <= ts } else { p.pts >= ts })
            .map(|(i, _)| i);
        let start = if backward { target.last() } else { target.min() };
        let start = start.unwrap_or(0);
        self.queue = self.all_packets[start..].iter().cloned().collect();
        self.seek_status
    }
}

impl Drop for ScriptedContainer {
    fn drop(&mut self) {
        self.events.push(Event::ContainerDropped);
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ScriptedFrame {
    samples: usize,
    channels: usize,
    pts: i64,
}

impl AudioFrame for ScriptedFrame {
    fn samples_per_channel(&self) -> usize {
        self.samples
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn pts(&self) -> i64 {
        self.pts
    }

    fn clear(&mut self) {
        self.samples = 0;
    }
}

pub(crate) struct ScriptedDecoder {
    events: EventLog,
    channels: usize,
    samples_per_frame: usize,
}

impl AudioDecoder for ScriptedDecoder {
    type Frame = ScriptedFrame;

    fn decode(
        &mut self,
        packet: &PacketView<'_>,
        frame: &mut ScriptedFrame,
    ) -> EngineResult<DecodeStatus> {
        let Some(&op) = packet.data.first() else {
            return Ok(DecodeStatus::default());
        };
        match op {
            STALL => Ok(DecodeStatus::default()),
            BROKEN => Err(EngineError::new(STATUS_INVALID, "corrupt frame")),
            SKIP => Ok(DecodeStatus {
                consumed: 1,
                got_frame: false,
            }),
            n => {
                frame.samples = self.samples_per_frame;
                frame.channels = self.channels;
                frame.pts = packet.pts + (n as i64 - 1) * self.samples_per_frame as i64;
                Ok(DecodeStatus {
                    consumed: 1,
                    got_frame: true,
                })
            }
        }
    }

    fn flush(&mut self) {
        self.events.push(Event::Flush);
    }
}

impl Drop for ScriptedDecoder {
    fn drop(&mut self) {
        self.events.push(Event::DecoderDropped);
    }
}

pub(crate) struct ScriptedResampler {
    events: EventLog,
    channels: usize,
}

impl Resampler for ScriptedResampler {
    type Frame = ScriptedFrame;

    /// Writes the frame's pts (truncated to `i16`) into every sample.
    fn convert(&mut self, frame: &ScriptedFrame, out: &mut [u8]) -> EngineResult<usize> {
        if frame.channels != self.channels {
            return Err(EngineError::new(STATUS_INVALID, "channel count changed"));
        }
        let bytes = frame.samples * frame.channels * 2;
        let value = (frame.pts as i16).to_ne_bytes();
        for sample in out[..bytes].chunks_exact_mut(2) {
            sample.copy_from_slice(&value);
        }
        Ok(frame.samples)
    }
}

impl Drop for ScriptedResampler {
    fn drop(&mut self) {
        self.events.push(Event::ResamplerDropped);
    }
}
