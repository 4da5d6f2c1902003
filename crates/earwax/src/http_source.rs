//! HTTP byte-range source for network URLs.
//!
//! Serves symphonia's [`MediaSource`] by fetching fixed-size blocks with
//! `Range` requests and keeping the most recent block in memory.

use std::io::{self, Read, Seek, SeekFrom};
use std::time::{Duration, Instant};

use symphonia::core::io::MediaSource;
use ureq::http::StatusCode;

/// Configuration for HTTP range fetching.
#[derive(Clone, Debug)]
pub struct HttpRangeConfig {
    /// Bytes per fetched block.
    pub block_size: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpRangeConfig {
    fn default() -> Self {
        Self {
            block_size: 512 * 1024,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Bytes of the resource starting at `start`.
#[derive(Debug, Default)]
struct Block {
    start: u64,
    bytes: Vec<u8>,
}

impl Block {
    fn end(&self) -> u64 {
        self.start.saturating_add(self.bytes.len() as u64)
    }

    /// Bytes from `pos` to the end of the block, if `pos` falls inside it.
    fn tail(&self, pos: u64) -> Option<&[u8]> {
        if pos < self.start || pos >= self.end() {
            return None;
        }
        Some(&self.bytes[(pos - self.start) as usize..])
    }
}

/// Seekable reader over a remote resource.
pub struct HttpRangeSource {
    agent: ureq::Agent,
    url: String,
    config: HttpRangeConfig,
    pos: u64,
    total: Option<u64>,
    block: Block,
}

impl HttpRangeSource {
    pub fn new(agent: ureq::Agent, url: String, config: HttpRangeConfig) -> Self {
        Self {
            agent,
            url,
            config,
            pos: 0,
            total: None,
            block: Block::default(),
        }
    }

    /// Create a source and confirm the resource is reachable.
    ///
    /// Issues a one-byte range probe so an unreachable URL fails here rather
    /// than on the first read.
    pub fn open(agent: ureq::Agent, url: String, config: HttpRangeConfig) -> io::Result<Self> {
        let mut source = Self::new(agent, url, config);
        source.total_len()?;
        Ok(source)
    }

    fn total_len(&mut self) -> io::Result<u64> {
        if let Some(total) = self.total {
            return Ok(total);
        }
        let block = self.fetch(0, 0)?;
        let total = self
            .total
            .ok_or_else(|| io::Error::other(format!("{}: content length unavailable", self.url)))?;
        self.block = block;
        Ok(total)
    }

    /// Fetch bytes `first..=last`, updating the known total length.
    fn fetch(&mut self, first: u64, last: u64) -> io::Result<Block> {
        let range = format!("bytes={first}-{last}");
        let started = Instant::now();
        let resp = self
            .agent
            .get(&self.url)
            .config()
            .timeout_per_call(Some(self.config.timeout))
            .build()
            .header("Range", &range)
            .call()
            .map_err(|e| io::Error::other(format!("range request {range} failed: {e}")))?;

        let status = resp.status();
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let content_range = header("Content-Range");
        let content_length = header("Content-Length").and_then(|s| s.parse::<u64>().ok());

        if status == StatusCode::OK && first > 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{}: server ignored range request", self.url),
            ));
        }
        if let Some(total) = total_from_headers(status, content_range.as_deref(), content_length)
        {
            self.total = Some(total);
        }

        let mut bytes = Vec::with_capacity(last.saturating_sub(first) as usize + 1);
        resp.into_body()
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| io::Error::other(format!("reading range {range} failed: {e}")))?;

        tracing::trace!(
            range = range.as_str(),
            bytes = bytes.len(),
            took_ms = started.elapsed().as_millis() as u64,
            "fetched http range"
        );
        Ok(Block {
            start: first,
            bytes,
        })
    }

    fn load_block_at_cursor(&mut self) -> io::Result<()> {
        let first = self.pos;
        let span = self.config.block_size.max(1) as u64;
        let mut last = first.saturating_add(span - 1);
        if let Some(total) = self.total.filter(|t| *t > 0) {
            last = last.min(total - 1);
        }
        self.block = self.fetch(first, last)?;
        Ok(())
    }
}

impl Read for HttpRangeSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.total.is_some_and(|t| self.pos >= t) {
            return Ok(0);
        }
        if self.block.tail(self.pos).is_none() {
            self.load_block_at_cursor()?;
        }
        let Some(tail) = self.block.tail(self.pos) else {
            return Ok(0);
        };
        let n = tail.len().min(out.len());
        out[..n].copy_from_slice(&tail[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => offset_by(self.pos, delta),
            SeekFrom::End(delta) => offset_by(self.total_len()?, delta),
        };
        Ok(self.pos)
    }
}

impl MediaSource for HttpRangeSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.total
    }
}

/// Total resource length advertised by a range response.
fn total_from_headers(
    status: StatusCode,
    content_range: Option<&str>,
    content_length: Option<u64>,
) -> Option<u64> {
    match status {
        // "bytes 0-0/12345"
        StatusCode::PARTIAL_CONTENT => content_range
            .and_then(|v| v.rsplit_once('/'))
            .and_then(|(_, total)| total.trim().parse().ok())
            .or(content_length),
        StatusCode::OK => content_length,
        _ => None,
    }
}

fn offset_by(base: u64, delta: i64) -> u64 {
    if delta < 0 {
        base.saturating_sub(delta.unsigned_abs())
    } else {
        base.saturating_add(delta as u64)
    }
}
