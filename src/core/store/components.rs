//! Named-export extraction from widget source
//!
//! The result is informational (used to list sub-components in UIs), not
//! authoritative: it is a lexical scan, not a parse.

use std::sync::LazyLock;

use regex::Regex;

static DECLARED_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*export\s+(?:async\s+)?(?:function\*?|const|let|var|class)\s+([A-Za-z_$][\w$]*)")
        .expect("declared export regex is valid")
});

static EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*export\s*\{([^}]*)\}").expect("export list regex is valid"));

/// Extract named exports in source order, de-duplicated
///
/// `export default ...` is skipped; `export { a, b as c }` yields `a` and `c`.
pub fn extract_components(code: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for caps in DECLARED_EXPORT.captures_iter(code) {
        if let Some(name) = caps.get(1) {
            found.push((name.start(), name.as_str().to_string()));
        }
    }

    for caps in EXPORT_LIST.captures_iter(code) {
        let Some(list) = caps.get(1) else { continue };
        for item in list.as_str().split(',') {
            let exported = match item.split_once(" as ") {
                Some((_, alias)) => alias.trim(),
                None => item.trim(),
            };
            if exported.is_empty() || exported == "default" {
                continue;
            }
            found.push((list.start(), exported.to_string()));
        }
    }

    found.sort_by_key(|(offset, _)| *offset);

    let mut names: Vec<String> = Vec::new();
    for (_, name) in found {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_declared_exports() {
        let code = r#"
import * as d3 from "https://esm.sh/d3@7";

export function Legend({ html }) { return html`<div/>`; }
export const Tooltip = ({ html }) => html`<span/>`;
export class Scales {}
export default function Widget({ model, html, React }) {}
"#;
        assert_eq!(extract_components(code), vec!["Legend", "Tooltip", "Scales"]);
    }

    #[test]
    fn test_extracts_export_lists_with_aliases() {
        let code = "function a() {}\nfunction b() {}\nexport { a, b as Brush, Widget as default };\n";
        assert_eq!(extract_components(code), vec!["a", "Brush"]);
    }

    #[test]
    fn test_deduplicates_and_ignores_default_only_code() {
        let code = "export function A() {}\nexport { A };\n";
        assert_eq!(extract_components(code), vec!["A"]);
        assert!(extract_components("export default function Widget() {}").is_empty());
    }
}
