//! Line-oriented song parsing.
//!
//! Each line of a document is classified independently: comment,
//! directive line, chord line, or lyric. Chord lines are found with a
//! threshold test (at least 60% of countable words parse as chords), so
//! lyrics sprinkled with the odd chord-shaped word stay lyrics while a
//! progression with one typo is still a chord line, the typo marked
//! invalid.

use std::collections::HashMap;

use log::debug;

use crate::chord::{parse_chord, Notation};

use super::directive::parse_directive;
use super::line::{ChordToken, DirectiveToken, Line, SongProgram, Span};

/// Fraction of countable words that must parse as chords for a line to
/// classify as a chord line.
pub const CHORD_LINE_THRESHOLD: f64 = 0.6;

/// Parse a whole document into classified lines and a label table.
///
/// # Example
/// ```
/// use leadsheet::{parse_song, Line, Notation};
///
/// let program = parse_song("{bpm: 120}\nC  Am  F  G\nhello world", Notation::American);
/// assert!(matches!(program.lines[0], Line::Directives { .. }));
/// assert!(matches!(program.lines[1], Line::Chord { .. }));
/// assert!(matches!(program.lines[2], Line::Lyric { .. }));
/// ```
pub fn parse_song(text: &str, notation: Notation) -> SongProgram {
    let mut lines = Vec::new();
    let mut labels = HashMap::new();

    for (index, raw) in text.split('\n').enumerate() {
        let line = classify_line(raw, index, notation);
        for item in line.directives() {
            if let super::directive::Directive::Label(name) = &item.directive {
                // Redefinition is not an error; the last one wins
                labels.insert(name.clone(), index);
            }
        }
        lines.push(line);
    }
    debug!(
        "parsed {} lines, {} labels, {} chords",
        lines.len(),
        labels.len(),
        lines
            .iter()
            .map(|l| l.chord_tokens().len())
            .sum::<usize>()
    );
    SongProgram { lines, labels }
}

fn classify_line(raw: &str, index: usize, notation: Notation) -> Line {
    // A line is wholly a comment iff its non-whitespace starts with //
    if raw.trim_start().starts_with("//") {
        return Line::Comment {
            text: raw.to_string(),
        };
    }
    let effective = strip_comment(raw);

    if effective.trim().is_empty() {
        return Line::Lyric {
            text: raw.to_string(),
        };
    }

    if let Some(items) = directive_forms(effective, index, notation) {
        return Line::Directives { items };
    }

    let words = split_words(effective);
    let mut countable = 0usize;
    let mut valid = 0usize;
    for (_, _, word) in &words {
        if !counts_toward_ratio(word, notation) {
            continue;
        }
        countable += 1;
        if parse_chord(word, notation).is_ok() {
            valid += 1;
        }
    }
    if countable > 0 && valid as f64 / countable as f64 >= CHORD_LINE_THRESHOLD {
        let tokens = words
            .into_iter()
            .map(|(start, end, word)| ChordToken {
                parsed: parse_chord(word, notation),
                text: word.to_string(),
                span: Span { line: index, start, end },
            })
            .collect();
        Line::Chord { tokens }
    } else {
        Line::Lyric {
            text: raw.to_string(),
        }
    }
}

/// Cut the line at the first `//` that sits outside a `{...}` form.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'/' if depth == 0 && bytes.get(i + 1) == Some(&b'/') => {
                return &line[..i];
            }
            _ => {}
        }
        i += 1;
    }
    line
}

/// If the content is nothing but `{...}` forms, parse each of them.
/// Returns `None` when any other text is present, so the line classifies
/// as chords or lyrics instead.
fn directive_forms(effective: &str, index: usize, notation: Notation) -> Option<Vec<DirectiveToken>> {
    let bytes = effective.as_bytes();
    let mut items = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c != b'{' {
            return None;
        }
        let start = i;
        let close = effective[start..].find('}').map(|off| start + off)?;
        let inner = &effective[start + 1..close];
        let directive = match inner.split_once(':') {
            Some((name, value)) => parse_directive(name, value, notation),
            None => parse_directive(inner.trim(), "", notation),
        };
        items.push(DirectiveToken {
            directive,
            span: Span {
                line: index,
                start,
                end: close + 1,
            },
        });
        i = close + 1;
    }
    (!items.is_empty()).then_some(items)
}

/// Whitespace-split a line keeping byte offsets.
fn split_words(s: &str) -> Vec<(usize, usize, &str)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            if let Some(begin) = start.take() {
                words.push((begin, i, &s[begin..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(begin) = start {
        words.push((begin, s.len(), &s[begin..]));
    }
    words
}

/// Whether a word participates in the chord-line ratio. Punctuation-only
/// words never count; single letters that only read as roman numerals
/// count in Roman notation alone, so lyrics with a capital "I" stay
/// lyrics.
fn counts_toward_ratio(word: &str, notation: Notation) -> bool {
    if !word.chars().any(|c| c.is_alphanumeric()) {
        return false;
    }
    let mut chars = word.chars();
    let is_single_roman =
        matches!((chars.next(), chars.next()), (Some('I' | 'V' | 'i' | 'v'), None));
    !(is_single_roman && notation != Notation::Roman)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordSymbol;
    use crate::song::directive::{Directive, TempoExpr};

    fn parse(text: &str) -> SongProgram {
        parse_song(text, Notation::American)
    }

    #[test]
    fn test_chord_line_classification() {
        let program = parse("C  Am  F  G");
        let tokens = program.lines[0].chord_tokens();
        assert_eq!(tokens.len(), 4);
        assert!(tokens.iter().all(|t| t.is_valid()));
    }

    #[test]
    fn test_lyric_line_classification() {
        let program = parse("these are the words of the song");
        assert!(matches!(program.lines[0], Line::Lyric { .. }));
        // "I" alone is a lyric, not a roman chord line
        let program = parse("I saw her standing there");
        assert!(matches!(program.lines[0], Line::Lyric { .. }));
    }

    #[test]
    fn test_threshold_keeps_typo_lines() {
        // Three chords and one typo is still a chord line (75%)
        let program = parse("C  Am  Xyz9  G");
        let tokens = program.lines[0].chord_tokens();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens.iter().filter(|t| t.is_valid()).count(), 3);
        assert!(!tokens[2].is_valid());
        // One chord among four words is a lyric (25%)
        let program = parse("C is a chord");
        assert!(matches!(program.lines[0], Line::Lyric { .. }));
    }

    #[test]
    fn test_comment_lines() {
        let program = parse("  // a full comment line\nC G");
        assert!(matches!(program.lines[0], Line::Comment { .. }));
        assert_eq!(program.lines[1].chord_tokens().len(), 2);
    }

    #[test]
    fn test_trailing_comments_are_stripped() {
        let program = parse("C G // chorus riff");
        let tokens = program.lines[0].chord_tokens();
        assert_eq!(tokens.len(), 2);
        // A // inside a directive form does not start a comment
        let program = parse("{label: a__b} // real comment");
        assert!(matches!(program.lines[0], Line::Directives { .. }));
    }

    #[test]
    fn test_directive_lines() {
        let program = parse("{bpm: 120} {time: 3/4}");
        let items = program.lines[0].directives();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].directive,
            Directive::Tempo(TempoExpr::Absolute(120))
        );
        assert_eq!(items[0].span.start, 0);
        assert_eq!(items[0].span.end, 10);
    }

    #[test]
    fn test_malformed_directive_kept_invalid() {
        let program = parse("{bpm: notanumber}");
        let items = program.lines[0].directives();
        assert_eq!(items.len(), 1);
        assert!(!items[0].directive.is_valid());

        let program = parse("{nocolon}");
        let items = program.lines[0].directives();
        assert!(!items[0].directive.is_valid());
    }

    #[test]
    fn test_mixed_directive_and_chords_is_lyric() {
        // Directives must sit on their own line; mixed lines carry no
        // directive semantics
        let program = parse("{bpm: 120} C G");
        assert!(matches!(program.lines[0], Line::Lyric { .. }));
    }

    #[test]
    fn test_label_table() {
        let program = parse("{label: verse}\nC G\n{label: chorus}\nF G");
        assert_eq!(program.label("verse"), Some(0));
        assert_eq!(program.label("chorus"), Some(2));
        assert_eq!(program.label("@start"), Some(0));
        assert_eq!(program.label("bridge"), None);
        // Labels are case-sensitive
        assert_eq!(program.label("Verse"), None);
    }

    #[test]
    fn test_label_redefinition_last_wins() {
        let program = parse("{label: v}\nC\n{label: v}\nG");
        assert_eq!(program.label("v"), Some(2));
    }

    #[test]
    fn test_spans_map_back_to_source() {
        let text = "C  Am7  G/B";
        let program = parse(text);
        let tokens = program.lines[0].chord_tokens();
        for token in tokens {
            assert_eq!(&text[token.span.start..token.span.end], token.text);
        }
        assert!(program.token_at(0, 4).is_some());
        assert_eq!(program.token_at(0, 4).unwrap().text, "Am7");
        assert!(program.token_at(0, 1).is_none());
    }

    #[test]
    fn test_classification_is_per_line() {
        // Adding a lyric line above a chord line never reclassifies it
        let alone = parse("C  Am  F  G");
        let stacked = parse("la la la la\nC  Am  F  G");
        assert_eq!(alone.lines[0], {
            let mut line = stacked.lines[1].clone();
            if let Line::Chord { tokens } = &mut line {
                for t in tokens.iter_mut() {
                    t.span.line = 0;
                }
            }
            line
        });
    }

    #[test]
    fn test_nc_token_is_a_valid_chord_word() {
        let program = parse("C NC*2 G");
        let tokens = program.lines[0].chord_tokens();
        assert_eq!(tokens.len(), 3);
        assert!(tokens[1].is_valid());
        assert!(matches!(
            tokens[1].parsed,
            Ok(ChordSymbol::Rest { .. })
        ));
    }

    #[test]
    fn test_empty_and_blank_lines() {
        let program = parse("C\n\n   \nG");
        assert_eq!(program.lines.len(), 4);
        assert!(matches!(program.lines[1], Line::Lyric { .. }));
        assert!(matches!(program.lines[2], Line::Lyric { .. }));
    }
}
