//! Submission stderr validation
//!
//! Remote shells print environment noise (locale warnings, login banners,
//! module loaders) on stderr. Such output must not fail a submission.

use regex_lite::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Locale warnings, e.g. `setlocale: LC_CTYPE: cannot change locale` or
/// perl's `Setting locale failed.`
const LOCALE_PATTERN: &str = r"(?i)set(ting)?\s?locale";

fn locale_regex() -> Option<&'static Regex> {
    static LOCALE: OnceLock<Option<Regex>> = OnceLock::new();
    LOCALE.get_or_init(|| Regex::new(LOCALE_PATTERN).ok()).as_ref()
}

/// Whether `stderr` indicates a real problem.
///
/// Blank output is never significant. Output in which a locale warning or
/// one of `ignore` (regexes) matches anywhere is treated as noise. Invalid
/// ignore patterns are skipped.
pub fn is_significant(stderr: &str, ignore: &[String]) -> bool {
    if stderr.trim().is_empty() {
        return false;
    }
    if locale_regex().is_some_and(|re| re.is_match(stderr)) {
        debug!("ignoring locale warning on stderr");
        return false;
    }
    for pattern in ignore {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(stderr) => {
                debug!(pattern = %pattern, "stderr matched ignore pattern");
                return false;
            }
            Ok(_) => {}
            Err(e) => debug!(pattern = %pattern, error = %e, "skipping invalid ignore pattern"),
        }
    }
    true
}
