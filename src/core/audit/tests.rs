use std::cell::{Cell, RefCell};

use super::*;

/// Analyzer returning a canned report and recording what it was asked
struct ScriptedAnalyzer {
    report: AuditReport,
    fail: bool,
    calls: Cell<usize>,
    last_changed: RefCell<Option<Vec<usize>>>,
}

impl ScriptedAnalyzer {
    fn returning(report: AuditReport) -> Self {
        Self {
            report,
            fail: false,
            calls: Cell::new(0),
            last_changed: RefCell::new(None),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(AuditReport::default())
        }
    }
}

impl AuditAnalyzer for ScriptedAnalyzer {
    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<AuditReport, AnalyzerError> {
        self.calls.set(self.calls.get() + 1);
        *self.last_changed.borrow_mut() = request.changed_lines.map(|s| s.iter().copied().collect());
        if self.fail {
            return Err(AnalyzerError::Transport("connection reset".into()));
        }
        Ok(self.report.clone())
    }
}

/// Twelve lines of code, optionally with one line replaced
fn code(edit: Option<(usize, &str)>) -> String {
    (1..=12)
        .map(|n| match edit {
            Some((line, text)) if line == n => text.to_string(),
            _ => format!("const line{n} = {n};"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fp() -> Fingerprint {
    Fingerprint::new("f1")
}

fn initial_report() -> AuditReport {
    AuditReport::new(AuditLevel::Fast)
        .with_concern(Concern::new("C1", Location::lines([10, 11]), Impact::High, "unbounded loop"))
        .with_concern(Concern::new("C2", Location::lines([3]), Impact::Low, "magic number"))
        .with_concern(Concern::new("G1", Location::Global, Impact::Medium, "no error handling"))
        .with_question("Should empty data render a placeholder?")
}

fn first_audit() -> StoredAudit {
    let analyzer = ScriptedAnalyzer::returning(initial_report());
    AuditEngine::new(&analyzer)
        .run(&fp(), &code(None), AuditLevel::Fast, None, true)
        .unwrap()
        .audit
}

#[test]
fn test_first_audit_annotates_line_hashes() {
    let analyzer = ScriptedAnalyzer::returning(initial_report());
    let outcome = AuditEngine::new(&analyzer)
        .run(&fp(), &code(None), AuditLevel::Fast, None, true)
        .unwrap();

    assert!(outcome.fresh_analysis);
    assert_eq!(outcome.reused_count, 0);
    assert_eq!(outcome.updated_count, 3);
    assert!(analyzer.last_changed.borrow().is_none());

    let c1 = outcome.audit.report.concern("C1").unwrap();
    assert_eq!(c1.line_hashes.len(), 2);
    assert_eq!(
        c1.line_hashes.get(&10).map(String::as_str),
        outcome.audit.line_hashes.get(10)
    );
    assert!(outcome.audit.report.concern("G1").unwrap().line_hashes.is_empty());
}

#[test]
fn test_unchanged_code_reuses_report_without_analysis() {
    let previous = first_audit();
    let analyzer = ScriptedAnalyzer::returning(AuditReport::default());

    let outcome = AuditEngine::new(&analyzer)
        .run(&fp(), &code(None), AuditLevel::Fast, Some(&previous), true)
        .unwrap();

    assert_eq!(analyzer.calls.get(), 0);
    assert!(!outcome.fresh_analysis);
    assert_eq!(outcome.updated_count, 0);
    assert_eq!(outcome.reused_count, 3);
    assert_eq!(outcome.audit.report, previous.report);
    assert_eq!(
        serde_json::to_string(&outcome.audit.report).unwrap(),
        serde_json::to_string(&previous.report).unwrap()
    );
}

#[test]
fn test_single_line_edit_invalidates_only_its_concerns() {
    let previous = first_audit();
    let edited = code(Some((10, "while (true) {}")));
    // Fresh analysis only re-detects an unrelated issue on an untouched line
    let analyzer = ScriptedAnalyzer::returning(
        AuditReport::new(AuditLevel::Fast)
            .with_concern(Concern::new("C9", Location::lines([3]), Impact::Low, "duplicate of C2")),
    );

    let outcome = AuditEngine::new(&analyzer)
        .run(&fp(), &edited, AuditLevel::Fast, Some(&previous), true)
        .unwrap();

    assert_eq!(analyzer.calls.get(), 1);
    assert_eq!(*analyzer.last_changed.borrow(), Some(vec![10]));

    let mut stale = outcome.stale_ids.clone();
    stale.sort();
    assert_eq!(stale, vec!["C1".to_string(), "G1".to_string()]);

    let report = &outcome.audit.report;
    assert!(report.concern("C1").is_none());
    assert!(report.concern("G1").is_none());
    assert!(report.concern("C9").is_none());
    assert_eq!(report.concern("C2"), previous.report.concern("C2"));
    assert_eq!(outcome.reused_count, 1);
    assert_eq!(outcome.updated_count, 0);
}

#[test]
fn test_redetected_concern_is_kept_with_fresh_hashes() {
    let previous = first_audit();
    let edited = code(Some((10, "while (true) {}")));
    let analyzer = ScriptedAnalyzer::returning(
        AuditReport::new(AuditLevel::Fast)
            .with_concern(Concern::new("C1", Location::lines([10, 11]), Impact::High, "unbounded loop"))
            .with_concern(Concern::new("G2", Location::Global, Impact::Low, "file-level note"))
            .with_question("Should empty data render a placeholder?")
            .with_question("Is the loop intentional?"),
    );

    let outcome = AuditEngine::new(&analyzer)
        .run(&fp(), &edited, AuditLevel::Fast, Some(&previous), true)
        .unwrap();

    let c1 = outcome.audit.report.concern("C1").unwrap();
    assert_eq!(
        c1.line_hashes.get(&10).map(String::as_str),
        LineHashMap::from_code(&edited).get(10)
    );
    assert!(outcome.audit.report.concern("G2").is_some());
    assert_eq!(outcome.updated_count, 2);
    assert_eq!(
        outcome.audit.report.open_questions,
        vec![
            "Should empty data render a placeholder?".to_string(),
            "Is the loop intentional?".to_string(),
        ]
    );
}

#[test]
fn test_concerns_past_end_of_file_are_stale() {
    let previous = first_audit();
    let shorter: String = code(None).lines().take(10).collect::<Vec<_>>().join("\n");
    let analyzer = ScriptedAnalyzer::returning(
        AuditReport::new(AuditLevel::Fast)
            .with_concern(Concern::new("C5", Location::lines([11, 40]), Impact::Low, "beyond the end")),
    );

    let outcome = AuditEngine::new(&analyzer)
        .run(&fp(), &shorter, AuditLevel::Fast, Some(&previous), true)
        .unwrap();

    assert!(outcome.stale_ids.contains(&"C1".to_string()));
    assert!(outcome.audit.report.concern("C2").is_some());
    // Lines 11 and 40 do not exist any more, so the new concern has nothing left
    assert!(outcome.audit.report.concern("C5").is_none());
}

#[test]
fn test_reuse_disabled_analyzes_everything() {
    let previous = first_audit();
    let analyzer = ScriptedAnalyzer::returning(initial_report());

    let outcome = AuditEngine::new(&analyzer)
        .run(&fp(), &code(None), AuditLevel::Fast, Some(&previous), false)
        .unwrap();

    assert_eq!(analyzer.calls.get(), 1);
    assert!(analyzer.last_changed.borrow().is_none());
    assert_eq!(outcome.reused_count, 0);
    assert_eq!(outcome.updated_count, 3);
}

#[test]
fn test_previous_audit_at_other_level_is_ignored() {
    let previous = first_audit();
    let analyzer = ScriptedAnalyzer::returning(
        AuditReport::new(AuditLevel::Full).with_concern(
            Concern::new("F1", Location::Global, Impact::Medium, "state sync")
                .with_alternative("use model.on")
                .with_rationale("avoids polling"),
        ),
    );

    let outcome = AuditEngine::new(&analyzer)
        .run(&fp(), &code(None), AuditLevel::Full, Some(&previous), true)
        .unwrap();

    assert_eq!(outcome.reused_count, 0);
    assert_eq!(outcome.audit.level, AuditLevel::Full);
    let f1 = outcome.audit.report.concern("F1").unwrap();
    assert_eq!(f1.alternatives, vec!["use model.on".to_string()]);
}

#[test]
fn test_fast_audit_strips_full_only_fields() {
    let analyzer = ScriptedAnalyzer::returning(
        AuditReport::new(AuditLevel::Full).with_concern(
            Concern::new("F1", Location::lines([1]), Impact::Low, "naming")
                .with_alternative("rename")
                .with_rationale("clarity"),
        ),
    );
    let outcome = AuditEngine::new(&analyzer)
        .run(&fp(), &code(None), AuditLevel::Fast, None, true)
        .unwrap();

    let f1 = outcome.audit.report.concern("F1").unwrap();
    assert!(f1.alternatives.is_empty());
    assert!(f1.rationale.is_none());
}

#[test]
fn test_analyzer_failure_propagates() {
    let analyzer = ScriptedAnalyzer::failing();
    let err = AuditEngine::new(&analyzer)
        .run(&fp(), &code(None), AuditLevel::Fast, None, true)
        .unwrap_err();
    assert!(matches!(err, AuditError::Analyzer(AnalyzerError::Transport(_))));
}
