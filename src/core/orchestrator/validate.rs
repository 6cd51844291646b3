//! Heuristic validator for anywidget-style React modules
//!
//! A lexical check, not a parse: it looks for the handful of mistakes that
//! generated widgets make most often.

use std::sync::LazyLock;

use regex::Regex;

use super::contracts::{CheckOutcome, Validator};

static DEFAULT_EXPORT_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export\s+default\s+function\s*\w*\s*\(([^)]*)\)").expect("signature regex is valid")
});

static DESTRUCTURED_MODEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)export\s+default\s+function\s*\w*\s*\(\s*\{[^}]*\bmodel\b[^}]*\}")
        .expect("destructured model regex is valid")
});

static ESM_SH_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"from\s+["']https://esm\.sh/([^"']+)["']"#).expect("esm.sh import regex is valid")
});

/// Reference validator; any other [`Validator`] can be plugged in instead
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicValidator;

impl Validator for HeuristicValidator {
    fn validate(&self, code: &str, expected_exports: &[String], expected_imports: &[String]) -> CheckOutcome {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        if !code.contains("export default function") {
            issues.push("Missing 'export default function' declaration".to_string());
        } else {
            match DEFAULT_EXPORT_SIGNATURE.captures(code) {
                Some(caps) => {
                    let params = caps.get(1).map_or("", |m| m.as_str());
                    let injects_all = ["model", "html", "React"].iter().all(|p| params.contains(p));
                    if !injects_all && !DESTRUCTURED_MODEL.is_match(code) {
                        issues.push("Widget function must accept parameters { model, html, React }".to_string());
                    }
                }
                None => issues.push("Malformed widget function declaration".to_string()),
            }
        }

        let uses_html = code.contains("html`");
        if !uses_html {
            warnings.push("No html template usage found - are you using htm correctly?".to_string());
        }

        // Capitalized names are components, not state
        let state_exports: Vec<&String> = expected_exports
            .iter()
            .filter(|name| !name.starts_with(|c: char| c.is_uppercase()))
            .collect();
        for name in &state_exports {
            if !code.contains(&format!("model.set(\"{}\"", name)) && !code.contains(&format!("model.set('{}'", name)) {
                issues.push(format!("Export '{}' never set with model.set()", name));
            }
        }
        if !state_exports.is_empty() && !code.contains("model.save_changes()") {
            issues.push("Missing model.save_changes() call for exports".to_string());
        }

        for name in expected_imports {
            if !code.contains(&format!("model.on(\"change:{}\"", name)) && !code.contains(&format!("model.on('change:{}'", name)) {
                warnings.push(format!("Import '{}' not subscribed with model.on()", name));
            }
        }

        if code.contains("document.body") {
            issues.push("Direct document.body manipulation detected - use refs instead".to_string());
        }
        if code.contains("ReactDOM.render") {
            issues.push("ReactDOM.render not allowed - use html templates".to_string());
        }
        if uses_html && code.contains("className=") {
            issues.push("Use 'class=' not 'className=' in htm templates".to_string());
        }

        for caps in ESM_SH_IMPORT.captures_iter(code) {
            let Some(module) = caps.get(1) else { continue };
            // Scoped packages start with '@'; the version marker is the next one
            if !module.as_str().trim_start_matches('@').contains('@') {
                warnings.push(format!(
                    "CDN import '{}' missing version - should pin version (e.g., d3@7)",
                    module.as_str()
                ));
            }
        }

        CheckOutcome::from_findings(issues, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"import * as d3 from "https://esm.sh/d3@7";

export default function Widget({ model, html, React }) {
  const data = model.get("data") || [];
  React.useEffect(() => {
    model.set("selection", []);
    model.save_changes();
    const onChange = () => {};
    model.on("change:brush", onChange);
    return () => model.off("change:brush", onChange);
  }, []);
  return html`<div class="chart"></div>`;
}
"#;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_well_formed_widget_passes() {
        let outcome = HeuristicValidator.validate(GOOD, &names(&["selection"]), &names(&["brush"]));
        assert!(outcome.ok, "unexpected issues: {:?}", outcome.issues);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_missing_default_export() {
        let outcome = HeuristicValidator.validate("export function Widget() {}", &[], &[]);
        assert!(!outcome.ok);
        assert_eq!(outcome.issues, vec!["Missing 'export default function' declaration"]);
    }

    #[test]
    fn test_signature_must_inject_model() {
        let code = "export default function Widget(props) { return html`<div/>`; }";
        let outcome = HeuristicValidator.validate(code, &[], &[]);
        assert_eq!(outcome.issues, vec!["Widget function must accept parameters { model, html, React }"]);

        // Destructuring just `model` is accepted
        let code = "export default function Widget({ model }) { return html`<div/>`; }";
        assert!(HeuristicValidator.validate(code, &[], &[]).ok);
    }

    #[test]
    fn test_export_lifecycle() {
        let code = "export default function Widget({ model, html, React }) { return html`<div/>`; }";
        let outcome = HeuristicValidator.validate(code, &names(&["selection", "Legend"]), &[]);
        assert_eq!(
            outcome.issues,
            vec![
                "Export 'selection' never set with model.set()",
                "Missing model.save_changes() call for exports",
            ]
        );
    }

    #[test]
    fn test_pitfalls() {
        let code = "export default function Widget({ model, html, React }) {\n  document.body.appendChild(x);\n  ReactDOM.render(y);\n  return html`<div className=\"a\"></div>`;\n}";
        let outcome = HeuristicValidator.validate(code, &[], &[]);
        assert_eq!(outcome.issues.len(), 3);
        assert!(outcome.issues[2].contains("className"));
    }

    #[test]
    fn test_warnings_do_not_fail_validation() {
        let code = "import * as d3 from \"https://esm.sh/d3\";\nimport x from 'https://esm.sh/@observablehq/plot';\nexport default function Widget({ model, html, React }) { return null; }";
        let outcome = HeuristicValidator.validate(code, &[], &names(&["brush"]));
        assert!(outcome.ok);
        assert_eq!(outcome.warnings.len(), 4);
        assert!(outcome.warnings.iter().any(|w| w.contains("'d3'")));
        assert!(outcome.warnings.iter().any(|w| w.contains("@observablehq/plot")));
    }
}
