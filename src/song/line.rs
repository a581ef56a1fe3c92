//! Document structure: spans, tokens, lines, and the song program.

use std::collections::HashMap;

use serde::Serialize;

use crate::chord::ChordSymbol;
use crate::error::ChordParseError;

use super::directive::Directive;

/// Location of a token in the source document: 0-based line index plus
/// byte offsets within that line. Used for highlighting and click-to-play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn contains(&self, line: usize, byte: usize) -> bool {
        self.line == line && (self.start..self.end).contains(&byte)
    }
}

/// One whitespace-delimited word of a chord line. An unparseable word
/// stays in the line as an invalid marker carrying its error.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordToken {
    pub text: String,
    pub span: Span,
    pub parsed: Result<ChordSymbol, ChordParseError>,
}

impl ChordToken {
    pub fn is_valid(&self) -> bool {
        self.parsed.is_ok()
    }

    pub fn symbol(&self) -> Option<&ChordSymbol> {
        self.parsed.as_ref().ok()
    }
}

/// A directive form with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveToken {
    pub directive: Directive,
    pub span: Span,
}

/// One classified line of the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// Mostly chords; every word became a token.
    Chord { tokens: Vec<ChordToken> },
    /// Lyrics or anything else playback ignores.
    Lyric { text: String },
    /// A line whose non-whitespace starts with `//`.
    Comment { text: String },
    /// Nothing but `{...}` forms.
    Directives { items: Vec<DirectiveToken> },
}

impl Line {
    pub fn chord_tokens(&self) -> &[ChordToken] {
        match self {
            Line::Chord { tokens } => tokens,
            _ => &[],
        }
    }

    pub fn directives(&self) -> &[DirectiveToken] {
        match self {
            Line::Directives { items } => items,
            _ => &[],
        }
    }
}

/// The virtual label that loops may target to return to the top.
pub const START_LABEL: &str = "@start";

/// A parsed document: classified lines plus the label table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongProgram {
    pub lines: Vec<Line>,
    /// Label name to line index; case-sensitive, last definition wins.
    pub labels: HashMap<String, usize>,
}

impl SongProgram {
    /// Look up a label. The virtual `@start` always maps to line 0.
    pub fn label(&self, name: &str) -> Option<usize> {
        if name == START_LABEL {
            return Some(0);
        }
        self.labels.get(name).copied()
    }

    /// Find the chord token covering a byte position, for click-to-play.
    pub fn token_at(&self, line: usize, byte: usize) -> Option<&ChordToken> {
        self.lines
            .get(line)?
            .chord_tokens()
            .iter()
            .find(|token| token.span.contains(line, byte))
    }

    /// Count of valid chord tokens in the whole document.
    pub fn chord_count(&self) -> usize {
        self.lines
            .iter()
            .map(|line| line.chord_tokens().iter().filter(|t| t.is_valid()).count())
            .sum()
    }
}
