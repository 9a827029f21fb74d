//! Normalization of free text captured by generic "failed" patterns.

/// Phrases that mean the captured text names no dependency at all.
const BOILERPLATE_ONLY: &[&str] = &["is wanted", "should be defined", "are broken", "is broken"];

/// Fragments removed wherever they appear, in order.
const STRIPPED: &[&str] = &[
    " works as expected",
    " and usability",
    " usability",
    " argument",
    " environment variable",
    " environment var",
    " presence",
    " support",
    " implementation is broken",
    " is broken",
    " files can be found",
    " can be found",
    " is declared",
    "whether to build ",
    "whether ",
    "library containing ",
    "x86_64-generic-linux-gnu-",
    "i686-generic-linux-gnu-",
    "'",
];

/// Strip configure-style boilerplate around a feature or variable name.
///
/// Returns an empty string when nothing derivable remains; callers treat that
/// as "no dependency".
pub fn cleanup_requirement(raw: &str) -> String {
    if BOILERPLATE_ONLY.iter().any(|phrase| raw.contains(phrase)) {
        return String::new();
    }
    let mut s = raw.strip_prefix("for ").unwrap_or(raw).to_string();
    for fragment in STRIPPED {
        s = s.replace(fragment, "");
    }
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_build_support_wrapper() {
        assert_eq!(cleanup_requirement("whether to build foo support"), "foo");
    }

    #[test]
    fn strips_leading_for_quotes_and_argument() {
        assert_eq!(cleanup_requirement("for 'bar' argument"), "bar");
    }

    #[test]
    fn boilerplate_phrases_yield_empty() {
        assert_eq!(cleanup_requirement("X is wanted"), "");
        assert_eq!(cleanup_requirement("HAVE_FOO should be defined"), "");
        assert_eq!(cleanup_requirement("the threads are broken"), "");
    }

    #[test]
    fn strips_target_triples() {
        assert_eq!(cleanup_requirement("x86_64-generic-linux-gnu-pkg-config"), "pkg-config");
        assert_eq!(cleanup_requirement("i686-generic-linux-gnu-gcc"), "gcc");
    }

    #[test]
    fn strips_library_containing_and_trims() {
        assert_eq!(cleanup_requirement("library containing  dlopen "), "dlopen");
    }

    #[test]
    fn plain_token_is_unchanged() {
        assert_eq!(cleanup_requirement("zlib"), "zlib");
    }

    #[test]
    fn only_leading_for_is_stripped() {
        assert_eq!(cleanup_requirement("fortran"), "fortran");
        assert_eq!(cleanup_requirement("check for x"), "check for x");
    }
}
