//! `earwax`: inspect and decode audio sources from the command line.
//!
//! ## Commands
//! - `info`: print the selected stream's information as JSON.
//! - `decode`: write 16-bit PCM to a WAV file, a raw file or stdout.
//! - `stress`: open and close one source from several threads and report the
//!   library handle count afterwards (should be back at zero).

mod cli;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use earwax::http_source::HttpRangeConfig;
use earwax::{DecodeConfig, DecodeContext, Library, StreamSelection, SymphoniaEngine};
use tracing_subscriber::EnvFilter;

type Ctx = DecodeContext<SymphoniaEngine>;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,earwax=info")
        }))
        .with_writer(io::stderr)
        .init();

    let engine = SymphoniaEngine::with_http_config(HttpRangeConfig {
        block_size: args.http_block_size,
        timeout: Duration::from_secs(args.http_timeout_secs),
    });
    let library = Library::new(engine);
    let config = DecodeConfig {
        stream_selection: if args.first_stream {
            StreamSelection::First
        } else {
            StreamSelection::Last
        },
        buffer_padding_frames: args.padding_frames,
    };

    match &args.cmd {
        cli::Command::Info { url } => {
            let ctx = open(&library, url, &config)?;
            println!("{}", serde_json::to_string_pretty(ctx.info())?);
        }
        cli::Command::Decode { url, output, seek } => {
            let mut ctx = open(&library, url, &config)?;
            if let Some(pts) = seek {
                ctx.seek(*pts).with_context(|| format!("seek to {pts}"))?;
            }
            let bytes = match output {
                Some(path) if is_wav(path) => decode_to_wav(&mut ctx, path)?,
                Some(path) => {
                    let file =
                        File::create(path).with_context(|| format!("create {path:?}"))?;
                    decode_raw(&mut ctx, BufWriter::new(file))?
                }
                None => decode_raw(&mut ctx, io::stdout().lock())?,
            };
            tracing::info!(bytes, "decode finished");
        }
        cli::Command::Stress {
            url,
            threads,
            iterations,
            chunks,
        } => stress(&library, url, &config, *threads, *iterations, *chunks)?,
    }

    Ok(())
}

fn open(library: &Arc<Library<SymphoniaEngine>>, url: &str, config: &DecodeConfig) -> Result<Ctx> {
    DecodeContext::open_with(library, url, config)
        .with_context(|| format!("open {url}"))
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

fn decode_raw<W: Write>(ctx: &mut Ctx, mut out: W) -> Result<u64> {
    let mut written = 0u64;
    loop {
        let chunk = ctx.spit();
        if chunk.is_end() {
            break;
        }
        out.write_all(chunk.data()).context("write pcm")?;
        written += chunk.size() as u64;
    }
    out.flush().context("flush output")?;
    Ok(written)
}

fn decode_to_wav(ctx: &mut Ctx, path: &Path) -> Result<u64> {
    let info = ctx.info();
    if info.channels == 0 || info.sample_rate == 0 {
        bail!("stream does not declare channels/sample rate; use raw output");
    }
    let spec = hound::WavSpec {
        channels: info.channels,
        sample_rate: info.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).with_context(|| format!("create {path:?}"))?;

    let mut written = 0u64;
    let mut result = Ok(());
    ctx.for_each_chunk(|chunk| {
        if result.is_err() {
            return;
        }
        for sample in chunk.samples() {
            if let Err(e) = writer.write_sample(sample) {
                result = Err(e);
                return;
            }
        }
        written += chunk.size() as u64;
    });
    result.context("write wav sample")?;
    writer.finalize().context("finalize wav")?;
    Ok(written)
}

struct StressReport {
    worker: usize,
    opened: usize,
    failed: usize,
    bytes: u64,
}

/// Hand a finished worker's report to the collector.
///
/// Returns false, after logging, when the collector has already gone away.
fn send_report(tx: &crossbeam_channel::Sender<StressReport>, report: StressReport) -> bool {
    let worker = report.worker;
    match tx.send(report) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(worker, "stress report dropped: {e}");
            false
        }
    }
}

fn stress(
    library: &Arc<Library<SymphoniaEngine>>,
    url: &str,
    config: &DecodeConfig,
    threads: usize,
    iterations: usize,
    chunks: usize,
) -> Result<()> {
    let started = Instant::now();
    let (tx, rx) = crossbeam_channel::unbounded();

    let workers: Vec<_> = (0..threads)
        .map(|worker| {
            let library = Arc::clone(library);
            let url = url.to_string();
            let config = config.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let mut report = StressReport {
                    worker,
                    opened: 0,
                    failed: 0,
                    bytes: 0,
                };
                for _ in 0..iterations {
                    match DecodeContext::open_with(&library, &url, &config) {
                        Ok(mut ctx) => {
                            report.opened += 1;
                            for _ in 0..chunks {
                                let chunk = ctx.spit();
                                if chunk.is_end() {
                                    break;
                                }
                                report.bytes += chunk.size() as u64;
                            }
                            ctx.close();
                        }
                        Err(e) => {
                            tracing::warn!(worker, code = e.code(), "open failed: {e}");
                            report.failed += 1;
                        }
                    }
                }
                send_report(&tx, report);
            })
        })
        .collect();
    drop(tx);

    let mut opened = 0;
    let mut failed = 0;
    for report in rx.iter() {
        tracing::debug!(
            worker = report.worker,
            opened = report.opened,
            failed = report.failed,
            bytes = report.bytes,
            "worker finished"
        );
        opened += report.opened;
        failed += report.failed;
    }
    for w in workers {
        if w.join().is_err() {
            bail!("stress worker panicked");
        }
    }

    let handles = library.handle_count();
    println!(
        "opened={opened} failed={failed} handles={handles} elapsed_ms={}",
        started.elapsed().as_millis()
    );
    if handles != 0 {
        bail!("{handles} library handles still outstanding");
    }
    Ok(())
}
