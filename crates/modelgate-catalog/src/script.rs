//! Sibling launch-script parsing (catalog rule 1): a `.sh`/`.cmd`/`.bat`
//! file with the same stem as an artifact records the real invocation.

use regex::Regex;
use std::sync::OnceLock;

pub const SHELL_EXTENSIONS: &[&str] = &["sh", "cmd", "bat"];

fn model_flag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|\s)(-m|--model)\s+(\S+)").unwrap())
}

pub struct ScriptInvocation {
    /// The artifact path named by `-m`/`--model`.
    pub artifact_path: String,
    /// The invocation line with the model flag and its argument removed.
    pub flags: String,
}

/// Folds trailing backslash-continuations and drops comment lines,
/// starting at the script's first uncommented, non-empty line.
fn first_invocation_line(script: &str) -> Option<String> {
    let mut lines = script.lines().map(str::trim_end);
    let mut joined = String::new();
    for line in &mut lines {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        joined.push_str(trimmed);
        break;
    }
    if joined.is_empty() {
        return None;
    }
    while joined.ends_with('\\') {
        joined.truncate(joined.len() - 1);
        match lines.next() {
            Some(next) => {
                let next = next.trim();
                if next.starts_with('#') {
                    break;
                }
                joined.push(' ');
                joined.push_str(next);
            }
            None => break,
        }
    }
    Some(joined)
}

/// Parses a launch script's text and extracts the `-m`/`--model` artifact
/// path plus the remaining flag string.
pub fn parse(script: &str) -> Option<ScriptInvocation> {
    let line = first_invocation_line(script)?;
    let caps = model_flag_re().captures(&line)?;
    let artifact_path = caps.get(3)?.as_str().to_string();
    let whole_match = caps.get(0)?;
    let mut flags = String::with_capacity(line.len());
    flags.push_str(&line[..whole_match.start()]);
    flags.push_str(&line[whole_match.end()..]);
    Some(ScriptInvocation {
        artifact_path,
        flags: flags.split_whitespace().collect::<Vec<_>>().join(" "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_model_path_and_remaining_flags() {
        let script = "#!/bin/sh\n# comment\n./llama-server -m /models/a.gguf -c 4096 --port 8080\n";
        let parsed = parse(script).unwrap();
        assert_eq!(parsed.artifact_path, "/models/a.gguf");
        assert_eq!(parsed.flags, "./llama-server -c 4096 --port 8080");
    }

    #[test]
    fn folds_backslash_continuations() {
        let script = "llama-server \\\n  --model /m/a.gguf \\\n  -c 4096\n";
        let parsed = parse(script).unwrap();
        assert_eq!(parsed.artifact_path, "/m/a.gguf");
        assert_eq!(parsed.flags, "llama-server -c 4096");
    }

    #[test]
    fn scripts_without_a_model_flag_parse_to_none() {
        let script = "#!/bin/sh\nexec echo hello\n";
        assert!(parse(script).is_none());
    }
}
