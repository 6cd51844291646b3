//! Deterministic text fixes for provider output

use std::sync::LazyLock;

use regex::Regex;

use super::contracts::Sanitizer;

static OPENING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:javascript|jsx?|typescript|tsx?)?[ \t]*\r?\n?").expect("opening fence regex is valid")
});

static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?```\s*").expect("closing fence regex is valid"));

static CLASS_NAME_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclassName=").expect("className regex is valid"));

/// Remove markdown code fences a provider wrapped around its code
pub fn strip_fences(raw: &str) -> String {
    let without_open = OPENING_FENCE.replace_all(raw, "");
    let without_close = CLOSING_FENCE.replace_all(&without_open, "");
    without_close.trim().to_string()
}

/// Rewrites JSX `className=` attributes into htm's `class=`
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmSanitizer;

impl Sanitizer for HtmSanitizer {
    fn sanitize(&self, code: &str) -> String {
        CLASS_NAME_ATTR.replace_all(code, "class=").into_owned()
    }

    fn addresses(&self, issue: &str) -> bool {
        issue.contains("className")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```javascript\nconst a = 1;\n```"), "const a = 1;");
        assert_eq!(strip_fences("```jsx\nconst a = 1;\n```\n"), "const a = 1;");
        assert_eq!(strip_fences("```\nconst a = 1;\n```"), "const a = 1;");
        assert_eq!(strip_fences("  const a = 1;  "), "const a = 1;");
    }

    #[test]
    fn test_rewrites_class_name() {
        let code = "return html`<div className=\"chart\"><span className=${cls}></span></div>`;";
        assert_eq!(
            HtmSanitizer.sanitize(code),
            "return html`<div class=\"chart\"><span class=${cls}></span></div>`;"
        );
    }

    #[test]
    fn test_leaves_unrelated_code_alone() {
        let code = "const myclassName = 1;\nel.className = 'x';";
        assert_eq!(HtmSanitizer.sanitize(code), code);
    }

    #[test]
    fn test_addresses_class_name_issues() {
        assert!(HtmSanitizer.addresses("Use 'class=' not 'className=' in htm templates"));
        assert!(!HtmSanitizer.addresses("Missing model.save_changes() call for exports"));
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(code in "[a-zA-Z =\"<>`${}.\n]{0,80}") {
            let once = HtmSanitizer.sanitize(&code);
            let twice = HtmSanitizer.sanitize(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_code_without_pattern_is_unchanged(code in "[a-z =\"<>`${}.\n]{0,80}") {
            // No uppercase letters, so `className=` cannot occur
            prop_assert_eq!(HtmSanitizer.sanitize(&code), code);
        }
    }
}
