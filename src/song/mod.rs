//! # Song Module
//!
//! The document model: directives, classified lines, and the
//! line-oriented parser that turns free text into a [`SongProgram`].

mod directive;
mod line;
mod parser;

pub use directive::{
    is_loop_target, parse_directive, Directive, TempoExpr, TimeSignature, DEFAULT_LOOP_COUNT,
    MAX_LOOP_COUNT,
};
pub use line::{ChordToken, DirectiveToken, Line, SongProgram, Span, START_LABEL};
pub use parser::{parse_song, CHORD_LINE_THRESHOLD};
