use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "earwax", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Decode the first audio stream instead of the last one
    #[arg(long, global = true)]
    pub first_stream: bool,

    /// Extra frames reserved in the output buffer beyond the codec frame size
    #[arg(long, global = true, default_value_t = 64)]
    pub padding_frames: usize,

    /// HTTP range request block size in bytes
    #[arg(long, global = true, default_value_t = 512 * 1024)]
    pub http_block_size: usize,

    /// HTTP per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    pub http_timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print stream information as JSON
    Info {
        /// Path or URL of the audio source
        url: String,
    },

    /// Decode to 16-bit PCM
    Decode {
        /// Path or URL of the audio source
        url: String,

        /// Output file; `.wav` gets a WAV header, anything else is raw PCM. Defaults to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Seek to this timestamp (stream time base units) before decoding
        #[arg(long)]
        seek: Option<i64>,
    },

    /// Open, decode and close the same source from many threads
    Stress {
        /// Path or URL of the audio source
        url: String,

        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// Open/close cycles per thread
        #[arg(long, default_value_t = 25)]
        iterations: usize,

        /// Chunks to pull per cycle
        #[arg(long, default_value_t = 8)]
        chunks: usize,
    },
}
