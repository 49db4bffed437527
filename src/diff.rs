//! Unified diff helper shared by the Promotion Engine (preview) and the
//! Drift Analyzer (diff endpoint).

use similar::{Algorithm, ChangeTag, TextDiff};

/// Render a unified diff of `before` -> `after`, treating both as UTF-8
/// text (lossily, for non-UTF-8 content — configuration files are YAML and
/// expected to be text).
pub fn unified_diff(before: &[u8], after: &[u8]) -> String {
    let before = String::from_utf8_lossy(before);
    let after = String::from_utf8_lossy(after);

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(&before, &after);

    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push_str(change.as_str().unwrap_or(""));
        if !change.as_str().unwrap_or("").ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_added_and_removed_lines() {
        let diff = unified_diff(b"rate: 0.1\n", b"rate: 0.2\n");
        assert!(diff.contains("-rate: 0.1"));
        assert!(diff.contains("+rate: 0.2"));
    }

    #[test]
    fn identical_content_has_no_changed_lines() {
        let diff = unified_diff(b"rate: 0.1\n", b"rate: 0.1\n");
        assert!(!diff.contains('-'));
        assert!(!diff.contains('+'));
    }
}
