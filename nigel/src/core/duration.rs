//! Human duration strings such as `1h30m`, `45s` or `500ms`.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Result, anyhow};
use regex::Regex;

static PART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(ms|h|m|s)").expect("duration regex should compile"));

/// Parse a sequence of `<number><unit>` parts. A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(anyhow!("empty duration"));
    }

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in PART_RE.captures_iter(s) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() != consumed {
            return Err(anyhow!("invalid duration '{input}'"));
        }
        consumed = whole.end();
        let n: u64 = caps[1]
            .parse()
            .map_err(|_| anyhow!("duration value too large in '{input}'"))?;
        let part = match &caps[2] {
            "h" => Duration::from_secs(n.saturating_mul(3600)),
            "m" => Duration::from_secs(n.saturating_mul(60)),
            "s" => Duration::from_secs(n),
            _ => Duration::from_millis(n),
        };
        total = total.saturating_add(part);
    }
    if consumed != s.len() {
        return Err(anyhow!(
            "invalid duration '{input}' (expected e.g. 1h30m, 30m, 5s)"
        ));
    }
    Ok(total)
}
