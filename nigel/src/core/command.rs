//! Shell-command template expansion (`$CANDIDATE`, `$TASK_NAME`).

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::candidate::Candidate;

static COMMAND_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(CANDIDATE|TASK_NAME)").expect("command placeholder regex should compile")
});

/// Quote `s` for `bash -c` as a single-quoted word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

/// Replace `$CANDIDATE` with the shell-quoted key and `$TASK_NAME` verbatim.
pub fn interpolate_command(command: &str, candidate: &Candidate, task_name: &str) -> String {
    COMMAND_TOKEN_RE
        .replace_all(command, |caps: &Captures<'_>| match &caps[1] {
            "CANDIDATE" => shell_quote(candidate.key()),
            _ => task_name.to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::candidate::parse_candidates;

    fn expand(command: &str, key: &str, task: &str) -> String {
        interpolate_command(command, &Candidate::scalar(key), task)
    }

    #[test]
    fn replaces_candidate_and_task_name() {
        assert_eq!(expand("echo $CANDIDATE", "file.go:10", "lint"), "echo 'file.go:10'");
        assert_eq!(expand("run-$TASK_NAME.sh", "test", "build"), "run-build.sh");
        assert_eq!(expand("$TASK_NAME: $CANDIDATE", "error", "fix"), "fix: 'error'");
    }

    #[test]
    fn quotes_awkward_keys() {
        assert_eq!(
            expand("echo $CANDIDATE", "func (61.97%)", "test"),
            "echo 'func (61.97%)'"
        );
        assert_eq!(expand("echo $CANDIDATE", "", "test"), "echo ''");
        assert_eq!(
            expand("echo $CANDIDATE", "O'Reilly", "test"),
            r#"echo 'O'"'"'Reilly'"#
        );
    }

    #[test]
    fn array_candidates_use_json_key() {
        let c = parse_candidates(br#"[["file.go", "line 10"]]"#)
            .expect("parse")
            .remove(0);
        assert_eq!(
            interpolate_command("git commit -m fix $CANDIDATE", &c, "fix"),
            r#"git commit -m fix '["file.go","line 10"]'"#
        );
    }

    #[test]
    fn substituted_key_is_not_rescanned() {
        assert_eq!(
            expand("echo $CANDIDATE", "$TASK_NAME", "t"),
            "echo '$TASK_NAME'"
        );
    }
}
