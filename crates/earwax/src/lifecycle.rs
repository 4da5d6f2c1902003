//! Reference-counted lifecycle of the media engine.
//!
//! The engine's process-wide setup runs when the handle count goes 0 → 1 and
//! its teardown when it goes 1 → 0. Both run under the same lock as the
//! counter update, so init and deinit never overlap each other or a count
//! change. Callers hold a [`LibraryHandle`]; dropping it is the release.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::engine::MediaEngine;
use crate::engine::symphonia_engine::SymphoniaEngine;

/// A media engine plus its handle count.
pub struct Library<E: MediaEngine> {
    engine: E,
    handles: Mutex<usize>,
}

impl<E: MediaEngine> Library<E> {
    pub fn new(engine: E) -> Arc<Self> {
        Arc::new(Self {
            engine,
            handles: Mutex::new(0),
        })
    }

    /// Take a handle, initializing the engine if this is the first one.
    pub fn acquire(self: &Arc<Self>) -> LibraryHandle<E> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if *handles == 0 {
            tracing::debug!(engine = self.engine.name(), "media engine init");
            self.engine.global_init();
        }
        *handles += 1;
        LibraryHandle {
            library: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(remaining) = handles.checked_sub(1) else {
            tracing::warn!(engine = self.engine.name(), "library released without a handle");
            return;
        };
        *handles = remaining;
        if remaining == 0 {
            tracing::debug!(engine = self.engine.name(), "media engine deinit");
            self.engine.global_deinit();
        }
    }

    /// Outstanding handles (best-effort snapshot).
    pub fn handle_count(&self) -> usize {
        *self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: MediaEngine> fmt::Debug for Library<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("engine", &self.engine.name())
            .field("handles", &self.handle_count())
            .finish()
    }
}

/// Proof that the engine is initialized; released on drop.
pub struct LibraryHandle<E: MediaEngine> {
    library: Arc<Library<E>>,
}

impl<E: MediaEngine> LibraryHandle<E> {
    pub fn engine(&self) -> &E {
        &self.library.engine
    }

    /// Release the handle now. Equivalent to dropping it.
    pub fn shutdown(self) {}
}

impl<E: MediaEngine> Clone for LibraryHandle<E> {
    /// Acquire a second, independent handle on the same library.
    fn clone(&self) -> Self {
        self.library.acquire()
    }
}

impl<E: MediaEngine> Drop for LibraryHandle<E> {
    fn drop(&mut self) {
        self.library.release();
    }
}

impl<E: MediaEngine> fmt::Debug for LibraryHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("library", &self.library)
            .finish()
    }
}

/// The process-wide library backed by the symphonia engine.
pub fn global() -> &'static Arc<Library<SymphoniaEngine>> {
    static GLOBAL: OnceLock<Arc<Library<SymphoniaEngine>>> = OnceLock::new();
    GLOBAL.get_or_init(|| Library::new(SymphoniaEngine::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::{Event, ScriptedEngine};
    use std::thread;

    #[test]
    fn first_acquire_inits_and_last_release_deinits() {
        let engine = ScriptedEngine::stereo_44k(1);
        let events = engine.events();
        let library = Library::new(engine);

        let a = library.acquire();
        let b = library.acquire();
        assert_eq!(library.handle_count(), 2);
        assert_eq!(events.count(Event::Init), 1);

        drop(a);
        assert_eq!(events.count(Event::Deinit), 0);
        b.shutdown();
        assert_eq!(library.handle_count(), 0);
        assert_eq!(events.count(Event::Deinit), 1);
    }

    #[test]
    fn reacquire_after_teardown_inits_again() {
        let engine = ScriptedEngine::stereo_44k(1);
        let events = engine.events();
        let library = Library::new(engine);

        drop(library.acquire());
        drop(library.acquire());
        assert_eq!(events.count(Event::Init), 2);
        assert_eq!(events.count(Event::Deinit), 2);
    }

    #[test]
    fn cloned_handle_counts_separately() {
        let library = Library::new(ScriptedEngine::stereo_44k(1));
        let a = library.acquire();
        let b = a.clone();
        assert_eq!(library.handle_count(), 2);
        drop(a);
        drop(b);
        assert_eq!(library.handle_count(), 0);
    }

    #[test]
    fn concurrent_handles_init_and_deinit_once() {
        let engine = ScriptedEngine::stereo_44k(1);
        let events = engine.events();
        let library = Library::new(engine);
        let anchor = library.acquire();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let library = library.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        drop(library.acquire());
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(library.handle_count(), 1);
        drop(anchor);
        assert_eq!(library.handle_count(), 0);
        assert_eq!(events.count(Event::Init), 1);
        assert_eq!(events.count(Event::Deinit), 1);
    }
}
