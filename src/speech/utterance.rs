//! Utterance configuration
//!
//! Everything the engine needs to render one piece of text, gathered into a
//! single value. The controller owns exactly one of these and mutates it in
//! place; engines only ever see it by reference.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Voice used when the caller never picks one
pub const DEFAULT_VOICE: &str = "default";

/// Where rendered audio goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum OutputTarget {
    /// Straight to the default audio device
    #[default]
    Playback,
}

/// Unit in which `start_position` is counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionType {
    #[default]
    Character,
    Word,
    Sentence,
}

/// How the engine should interpret the bytes of the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharsetMode {
    /// Let the engine detect the encoding
    #[default]
    Auto,
    Utf8,
    EightBit,
    WideChar,
}

/// Caller supplied identifier used to match completion events to an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceToken(pub u32);

/// Opaque handle forwarded to the engine alongside the text
#[derive(Clone)]
pub struct UserData(Arc<dyn Any + Send + Sync>);

impl UserData {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the handle as its concrete type, if it is one
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserData(..)")
    }
}

/// Configuration of the utterance a controller will speak
///
/// `text` and `size` are only reachable through methods so that setting the
/// text always recomputes the size. The pass-through fields are public and
/// meant to be changed through [`SpeechController::configure`].
///
/// [`SpeechController::configure`]: crate::speech::SpeechController::configure
#[derive(Debug, Clone)]
pub struct Utterance {
    text: String,

    /// Text length in bytes plus one terminator
    size: usize,

    /// Voice name handed verbatim to the engine
    pub voice: String,

    /// First unit of `text` to speak, counted in `position_type` units
    pub start_position: usize,

    pub position_type: PositionType,

    /// Character offset where speech stops, 0 for the end of the text
    pub end_position: usize,

    pub charset_mode: CharsetMode,

    /// Block in `play_audio` until the engine is idle
    pub synchronous: bool,

    pub utterance_token: Option<UtteranceToken>,

    pub user_data: Option<UserData>,

    output_target: OutputTarget,
}

impl Utterance {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            size: 1,
            voice: DEFAULT_VOICE.to_string(),
            start_position: 0,
            position_type: PositionType::default(),
            end_position: 0,
            charset_mode: CharsetMode::default(),
            synchronous: true,
            utterance_token: None,
            user_data: None,
            output_target: OutputTarget::default(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the text and recompute the size
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.size = self.text.len() + 1;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Override the declared size without touching the text
    pub fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    pub fn output_target(&self) -> OutputTarget {
        self.output_target
    }

    /// The part of the text an engine should actually speak
    ///
    /// Honors the declared size (cut back to a char boundary), then skips
    /// `start_position` units and stops at `end_position` characters.
    pub fn spoken_text(&self) -> &str {
        let mut cut = self.size.saturating_sub(1).min(self.text.len());
        while !self.text.is_char_boundary(cut) {
            cut -= 1;
        }
        let buffer = &self.text[..cut];

        let start = if self.start_position == 0 {
            0
        } else {
            let starts: Vec<usize> = match self.position_type {
                PositionType::Character => buffer.char_indices().map(|(i, _)| i).collect(),
                PositionType::Word => word_starts(buffer),
                PositionType::Sentence => sentence_starts(buffer),
            };
            starts
                .get(self.start_position)
                .copied()
                .unwrap_or(buffer.len())
        };

        let end = if self.end_position == 0 {
            buffer.len()
        } else {
            buffer
                .char_indices()
                .nth(self.end_position)
                .map(|(i, _)| i)
                .unwrap_or(buffer.len())
        };

        if start >= end {
            ""
        } else {
            &buffer[start..end]
        }
    }
}

impl Default for Utterance {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offsets of every word start
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            starts.push(i);
            in_word = true;
        }
    }
    starts
}

/// Byte offsets of every sentence start
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace.
fn sentence_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut expect_start = true;
    let mut after_terminator = false;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if after_terminator {
                expect_start = true;
            }
            after_terminator = false;
            continue;
        }
        if expect_start {
            starts.push(i);
            expect_start = false;
        }
        after_terminator = matches!(ch, '.' | '!' | '?');
    }
    starts
}
