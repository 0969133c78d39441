//! Label pattern directives.
//!
//! A pattern is a mix of literal text and tokens: `<label>` substitutes the
//! connection's own label, `<inc>` / `<inc start>` / `<inc start,step>`
//! substitutes a counter that advances every time a label is formatted.
//! Anything that does not parse as a token is kept as literal text.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0, space1},
    combinator::{map, map_res, opt},
    sequence::{delimited, preceded},
    IResult, Parser,
};

/// One element of a label pattern
#[derive(Debug, Clone, PartialEq)]
pub enum PatternPart {
    Literal(String),
    /// The connection's own label text
    Label,
    /// Auto-incrementing counter; `dp` is the number of decimal places
    /// inferred from the directive
    Counter { current: f64, inc: f64, dp: usize },
}

/// A parsed label pattern with live counter state.
///
/// Counter tokens post-increment: the current value is formatted, then
/// advanced. Each generation run owns its own pattern instance, so counter
/// state never leaks between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPattern {
    parts: Vec<PatternPart>,
}

impl Default for LabelPattern {
    fn default() -> Self {
        LabelPattern::plain()
    }
}

impl LabelPattern {
    /// The identity pattern: the label passes through unchanged
    pub fn plain() -> Self {
        LabelPattern {
            parts: vec![PatternPart::Label],
        }
    }

    /// Parse a pattern directive. Never fails; malformed tokens become
    /// literal text.
    pub fn parse(src: &str) -> Self {
        let mut parts: Vec<PatternPart> = Vec::new();
        let mut rest = src;
        while !rest.is_empty() {
            if let Ok((tail, part)) = token(rest) {
                parts.push(part);
                rest = tail;
                continue;
            }
            if let Ok((tail, lit)) = literal_run(rest) {
                push_literal(&mut parts, lit);
                rest = tail;
                continue;
            }
            // a '<' that does not open a valid token
            push_literal(&mut parts, "<");
            rest = &rest[1..];
        }
        LabelPattern { parts }
    }

    pub fn parts(&self) -> &[PatternPart] {
        &self.parts
    }

    /// Format a label through the pattern, advancing any counters
    pub fn apply(&mut self, label: &str) -> String {
        let mut out = String::new();
        for part in &mut self.parts {
            match part {
                PatternPart::Literal(text) => out.push_str(text),
                PatternPart::Label => out.push_str(label),
                PatternPart::Counter { current, inc, dp } => {
                    out.push_str(&format!("{:.*}", *dp, *current));
                    *current += *inc;
                }
            }
        }
        out
    }
}

fn push_literal(parts: &mut Vec<PatternPart>, text: &str) {
    if let Some(PatternPart::Literal(prev)) = parts.last_mut() {
        prev.push_str(text);
    } else {
        parts.push(PatternPart::Literal(text.to_string()));
    }
}

fn decimal_places(src: &str) -> usize {
    src.split_once('.').map_or(0, |(_, frac)| frac.len())
}

/// A decimal number plus the precision it was written with
fn number(input: &str) -> IResult<&str, (f64, usize)> {
    map_res(
        take_while1(|c: char| c.is_ascii_digit() || c == '.'),
        |text: &str| text.parse::<f64>().map(|value| (value, decimal_places(text))),
    )
    .parse(input)
}

fn counter(input: &str) -> IResult<&str, PatternPart> {
    map(
        preceded(
            tag("inc"),
            opt(preceded(
                space1,
                (number, opt(preceded((char(','), space0), number))),
            )),
        ),
        |args| match args {
            None => PatternPart::Counter {
                current: 1.0,
                inc: 1.0,
                dp: 0,
            },
            Some(((start, start_dp), None)) => PatternPart::Counter {
                current: start,
                inc: 1.0,
                dp: start_dp,
            },
            Some(((start, start_dp), Some((inc, inc_dp)))) => PatternPart::Counter {
                current: start,
                inc,
                dp: start_dp.max(inc_dp),
            },
        },
    )
    .parse(input)
}

fn token(input: &str) -> IResult<&str, PatternPart> {
    delimited(
        char('<'),
        alt((map(tag("label"), |_| PatternPart::Label), counter)),
        char('>'),
    )
    .parse(input)
}

fn literal_run(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != '<').parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_mixed_pattern() {
        let pattern = LabelPattern::parse("[<inc>] <label>");
        assert_eq!(
            pattern.parts(),
            &[
                PatternPart::Literal("[".to_string()),
                PatternPart::Counter {
                    current: 1.0,
                    inc: 1.0,
                    dp: 0
                },
                PatternPart::Literal("] ".to_string()),
                PatternPart::Label,
            ]
        );
    }

    #[test]
    fn test_counter_advances_per_label() {
        let mut pattern = LabelPattern::parse("<inc 2.5,0.5> <label>");
        assert_eq!(pattern.apply("first"), "2.5 first");
        assert_eq!(pattern.apply("second"), "3.0 second");
        assert_eq!(pattern.apply("third"), "3.5 third");
    }

    #[test]
    fn test_malformed_token_is_literal() {
        let pattern = LabelPattern::parse("a <dec> b");
        assert_eq!(
            pattern.parts(),
            &[PatternPart::Literal("a <dec> b".to_string())]
        );
    }

    #[test]
    fn test_plain_pattern_is_identity() {
        let mut pattern = LabelPattern::plain();
        assert_eq!(pattern.apply("hello"), "hello");
    }
}
