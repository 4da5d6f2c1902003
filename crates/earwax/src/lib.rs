//! Streaming audio decoding to 16-bit interleaved PCM.
//!
//! Open a URL (local path, `file://` or `http(s)://`) with [`open`], then pull
//! chunks with [`DecodeContext::spit`] until one comes back empty:
//!
//! ```no_run
//! let _library = earwax::init();
//! let mut ctx = earwax::open("song.flac")?;
//! loop {
//!     let chunk = ctx.spit();
//!     if chunk.is_end() {
//!         break;
//!     }
//!     println!("{} bytes at {}", chunk.size(), chunk.time());
//! }
//! # Ok::<(), earwax::Error>(())
//! ```
//!
//! Decoding itself is delegated to a [`MediaEngine`]; the process-wide
//! [`lifecycle::global`] library uses [`SymphoniaEngine`].

pub mod chunk;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod http_source;
pub mod info;
pub mod lifecycle;

pub use chunk::{Chunk, OwnedChunk};
pub use config::{DecodeConfig, StreamSelection};
pub use decode::{DecodeContext, OwnedChunks};
pub use engine::MediaEngine;
pub use engine::symphonia_engine::SymphoniaEngine;
pub use error::{EngineError, Error, Result};
pub use info::{Rational, StreamInfo};
pub use lifecycle::{Library, LibraryHandle};

/// Take a handle on the global library, initializing the engine on first use.
///
/// Contexts hold their own handle, so this is only needed to keep the engine
/// initialized between contexts.
pub fn init() -> LibraryHandle<SymphoniaEngine> {
    lifecycle::global().acquire()
}

/// Open `url` on the global library with the default configuration.
pub fn open(url: &str) -> Result<DecodeContext<SymphoniaEngine>> {
    DecodeContext::open(lifecycle::global(), url)
}

pub fn open_with(url: &str, config: &DecodeConfig) -> Result<DecodeContext<SymphoniaEngine>> {
    DecodeContext::open_with(lifecycle::global(), url, config)
}

/// Close the context in `slot`, if any, and leave `None` behind.
pub fn close<E: MediaEngine>(slot: &mut Option<DecodeContext<E>>) {
    if let Some(ctx) = slot.take() {
        ctx.close();
    }
}

/// Stream information for `ctx`, or an all-zero [`StreamInfo`] without one.
pub fn get_info<E: MediaEngine>(ctx: Option<&DecodeContext<E>>) -> StreamInfo {
    ctx.map(|ctx| ctx.info().clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::ScriptedEngine;

    #[test]
    fn get_info_without_context_is_zeroed() {
        let info = get_info::<SymphoniaEngine>(None);
        assert_eq!(info, StreamInfo::default());
        assert_eq!(info.time_base, Rational::new(0, 0));
    }

    #[test]
    fn get_info_copies_snapshot() {
        let library = Library::new(ScriptedEngine::stereo_44k(2));
        let ctx = DecodeContext::open(&library, "scripted://a").unwrap();
        assert_eq!(get_info(Some(&ctx)), *ctx.info());
    }

    #[test]
    fn close_is_idempotent() {
        let library = Library::new(ScriptedEngine::stereo_44k(1));
        let mut slot = Some(DecodeContext::open(&library, "scripted://a").unwrap());
        close(&mut slot);
        assert!(slot.is_none());
        assert_eq!(library.handle_count(), 0);
        close(&mut slot);
        assert_eq!(library.handle_count(), 0);
    }
}
