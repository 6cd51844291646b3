//! `widgetsmith validate` command - Check widget files for common mistakes
//!
//! Runs the same heuristic validator the generation loop uses. `--fix`
//! applies the deterministic cleanups (code fences, JSX attributes) in place
//! before validating.

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::args::{GlobalOpts, OutputFormat};
use crate::cli::helpers::{print_json, print_yaml};
use crate::core::orchestrator::{strip_fences, CheckOutcome, HeuristicValidator, HtmSanitizer, Sanitizer, Validator};
use crate::core::store::{extract_components, write_atomic};

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Widget files to validate
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Trait the widget must export (repeatable)
    #[arg(long = "export")]
    pub exports: Vec<String>,

    /// Trait the widget must subscribe to (repeatable)
    #[arg(long = "import")]
    pub imports: Vec<String>,

    /// Apply deterministic fixes in place before validating
    #[arg(long)]
    pub fix: bool,

    /// Warnings become errors
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Serialize)]
struct FileReport {
    path: PathBuf,
    ok: bool,
    fixed: bool,
    components: Vec<String>,
    issues: Vec<String>,
    warnings: Vec<String>,
}

pub fn run(args: ValidateArgs, global: &GlobalOpts) -> Result<()> {
    let mut reports = Vec::new();
    for path in &args.paths {
        reports.push(check_file(path, &args)?);
    }

    match global.format {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Yaml => print_yaml(&reports)?,
        OutputFormat::Tsv => {
            for report in &reports {
                for issue in &report.issues {
                    println!("{}\tissue\t{}", report.path.display(), issue);
                }
                for warning in &report.warnings {
                    println!("{}\twarning\t{}", report.path.display(), warning);
                }
            }
        }
        OutputFormat::Auto => print_reports(&reports, global.quiet),
    }

    let failed = reports.iter().filter(|r| !r.ok).count();
    if failed > 0 {
        return Err(miette::miette!("{} of {} file(s) failed validation", failed, reports.len()));
    }
    Ok(())
}

fn check_file(path: &Path, args: &ValidateArgs) -> Result<FileReport> {
    let original = fs::read_to_string(path)
        .map_err(|e| miette::miette!("Cannot read {}: {}", path.display(), e))?;

    let mut code = original.clone();
    let mut fixed = false;
    if args.fix {
        let cleaned = HtmSanitizer.sanitize(&strip_fences(&original));
        // Surrounding whitespace alone is not worth a rewrite
        if cleaned != original.trim() {
            code = format!("{}\n", cleaned);
            write_atomic(path, code.as_bytes()).into_diagnostic()?;
            fixed = true;
        }
    }

    let CheckOutcome { ok, issues, warnings } = HeuristicValidator.validate(&code, &args.exports, &args.imports);
    let ok = ok && !(args.strict && !warnings.is_empty());

    Ok(FileReport {
        path: path.to_path_buf(),
        ok,
        fixed,
        components: extract_components(&code),
        issues,
        warnings,
    })
}

fn print_reports(reports: &[FileReport], quiet: bool) {
    for report in reports {
        let mark = if report.ok {
            style("✓").green()
        } else {
            style("✗").red()
        };
        if quiet && report.ok {
            continue;
        }
        println!("{} {}", mark, style(report.path.display()).cyan());
        if report.fixed {
            println!("  {} applied automatic fixes", style("→").blue());
        }
        for issue in &report.issues {
            println!("  {} {}", style("error:").red(), issue);
        }
        if !quiet {
            for warning in &report.warnings {
                println!("  {} {}", style("warning:").yellow(), warning);
            }
            if !report.components.is_empty() {
                println!("  {} {}", style("components:").dim(), report.components.join(", "));
            }
        }
    }
}
