//! Prompt template expansion.
//!
//! Placeholders are matched in a single left-to-right pass, so a substituted
//! value is never rescanned and `$ARGUMENT_1` can never be clobbered by a
//! shorter `$ARGUMENT` match.
//!
//! | placeholder              | value                                                 |
//! |--------------------------|-------------------------------------------------------|
//! | `$INPUT`                 | natural string form of the candidate                  |
//! | `$INPUT[n]`              | n-th array element, empty when out of bounds          |
//! | `$INPUT[n:]`             | JSON array of elements from n, `[]` when out of bounds |
//! | `$INPUT["key"]`          | object field, empty when absent or not an object      |
//! | `$TASK_ID`               | numeric task id                                       |
//! | `$ARGUMENT`              | first element                                         |
//! | `$ARGUMENT_N`            | N-th element (1-based)                                |
//! | `$REMAINING_ARGUMENTS`   | elements 2.. joined with `", "`                       |
//!
//! Anything else, including tokens glued to identifier characters such as
//! `$INPUTX`, is copied through unchanged.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::candidate::{Candidate, CandidateData};
use crate::core::errors::InterpolationError;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\$(?:INPUT(?:\[(?:(\d+):|(\d+)|"([^"]*)")\])?|TASK_ID|REMAINING_ARGUMENTS|ARGUMENT(?:_(\d+))?)"#,
    )
    .expect("placeholder regex should compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'t> {
    Input,
    Index(usize),
    Slice(usize),
    Field(&'t str),
    TaskId,
    Argument,
    ArgumentN(usize),
    RemainingArguments,
}

impl<'t> Token<'t> {
    fn from_captures(caps: &Captures<'t>) -> Self {
        let text = caps.get(0).map_or("", |m| m.as_str());
        if let Some(start) = caps.get(1) {
            return Token::Slice(parse_position(start.as_str()));
        }
        if let Some(index) = caps.get(2) {
            return Token::Index(parse_position(index.as_str()));
        }
        if let Some(key) = caps.get(3) {
            return Token::Field(key.as_str());
        }
        if let Some(n) = caps.get(4) {
            return Token::ArgumentN(parse_position(n.as_str()));
        }
        match text {
            "$TASK_ID" => Token::TaskId,
            "$REMAINING_ARGUMENTS" => Token::RemainingArguments,
            "$ARGUMENT" => Token::Argument,
            _ => Token::Input,
        }
    }
}

// Overlong digit runs cannot index anything; treat them as out of bounds.
fn parse_position(digits: &str) -> usize {
    digits.parse().unwrap_or(usize::MAX)
}

/// Expand `template` against `candidate`.
///
/// All-or-nothing: the first typed accessor applied to the wrong shape aborts
/// the whole expansion.
pub fn interpolate_prompt(
    template: &str,
    candidate: &Candidate,
    task_id: u64,
) -> Result<String, InterpolationError> {
    let arguments = candidate.arguments();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        let text = whole.as_str();
        if !ends_at_boundary(template, whole.end(), text) {
            out.push_str(text);
            continue;
        }

        let token = Token::from_captures(&caps);
        match resolve(&token, text, candidate, &arguments, task_id)? {
            Some(value) => out.push_str(&value),
            None => out.push_str(text),
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// A word-like token must not continue into an identifier character.
fn ends_at_boundary(template: &str, end: usize, text: &str) -> bool {
    if text.ends_with(']') {
        return true;
    }
    match template[end..].chars().next() {
        Some(c) => !(c.is_ascii_alphanumeric() || c == '_'),
        None => true,
    }
}

/// `Ok(None)` leaves the placeholder verbatim.
fn resolve(
    token: &Token<'_>,
    text: &str,
    candidate: &Candidate,
    arguments: &[String],
    task_id: u64,
) -> Result<Option<String>, InterpolationError> {
    let value = match token {
        Token::Input => Some(candidate.as_input()),
        Token::Index(index) => {
            require_sequence(candidate, text)?;
            Some(candidate.element(*index).unwrap_or_default())
        }
        Token::Slice(start) => {
            require_sequence(candidate, text)?;
            Some(candidate.slice_from(*start).unwrap_or_else(|| "[]".to_string()))
        }
        // Missing keys are common and legitimate, so no shape check here.
        Token::Field(key) => Some(candidate.field(key).unwrap_or_default()),
        Token::TaskId => Some(task_id.to_string()),
        Token::Argument => arguments.first().cloned(),
        Token::ArgumentN(n) => n
            .checked_sub(1)
            .and_then(|i| arguments.get(i))
            .cloned(),
        Token::RemainingArguments => Some(if arguments.len() > 1 {
            arguments[1..].join(", ")
        } else {
            String::new()
        }),
    };
    Ok(value)
}

fn require_sequence(candidate: &Candidate, text: &str) -> Result<(), InterpolationError> {
    match candidate.data() {
        CandidateData::Sequence(_) => Ok(()),
        CandidateData::Scalar(_) | CandidateData::Mapping(_) => Err(InterpolationError {
            variable: text.to_string(),
            actual: candidate.shape(),
        }),
    }
}
