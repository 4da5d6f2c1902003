/// Which audio stream to decode when a container has several.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamSelection {
    /// Scan every stream; the last audio stream wins.
    #[default]
    Last,
    /// Stop at the first audio stream.
    First,
}

/// Decode tuning parameters applied when opening a context.
#[derive(Clone, Debug)]
pub struct DecodeConfig {
    pub stream_selection: StreamSelection,
    /// Extra samples per channel reserved in the output buffer beyond the
    /// codec's nominal frame size.
    pub buffer_padding_frames: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            stream_selection: StreamSelection::Last,
            buffer_padding_frames: 64,
        }
    }
}
