//! `widgetsmith audit` command - Inspect stored audit reports

use std::collections::BTreeSet;

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::args::{GlobalOpts, OutputFormat};
use crate::cli::helpers::{format_timestamp, open_project, print_json, print_yaml, truncate_str};
use crate::core::audit::{AuditLevel, AuditStore, Impact, StoredAudit};
use crate::core::store::ArtifactStore;
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// List stored audits, newest first
    List,

    /// Show the concerns of one audit
    Show {
        /// Fingerprint or unique fingerprint prefix
        fingerprint: String,

        /// Audit level (fast, full); the configured default_audit_level when omitted
        #[arg(long)]
        level: Option<AuditLevel>,
    },
}

pub fn run(cmd: AuditCommands, global: &GlobalOpts) -> Result<()> {
    let project = open_project(global)?;
    let audits = AuditStore::new(&project);
    let store = ArtifactStore::open(&project).into_diagnostic()?;

    match cmd {
        AuditCommands::List => run_list(&audits, &store, global),
        AuditCommands::Show { fingerprint, level } => {
            let level = level.unwrap_or_else(|| Config::load_for(Some(&project)).default_audit_level());
            run_show(&audits, &fingerprint, level, global)
        }
    }
}

fn run_list(audits: &AuditStore, store: &ArtifactStore, global: &GlobalOpts) -> Result<()> {
    let all = audits.list();

    match global.format {
        OutputFormat::Json => print_json(&all),
        OutputFormat::Yaml => print_yaml(&all),
        OutputFormat::Tsv => {
            for audit in &all {
                println!(
                    "{}\t{}\t{}\t{}",
                    audit.fingerprint,
                    audit.level,
                    audit.report.concerns.len(),
                    audit.created_at.to_rfc3339()
                );
            }
            Ok(())
        }
        OutputFormat::Auto => {
            if all.is_empty() {
                if !global.quiet {
                    println!("No stored audits found.");
                }
                return Ok(());
            }

            let mut builder = Builder::default();
            builder.push_record(["FINGERPRINT", "LEVEL", "CONCERNS", "CREATED", "WIDGET"]);
            for audit in &all {
                // Audits can outlive the artifact they were made for
                let widget = store
                    .by_fingerprint(&audit.fingerprint)
                    .map(|a| format!("{} v{}", a.label, a.version))
                    .unwrap_or_else(|| "-".to_string());
                builder.push_record([
                    audit.fingerprint.short().to_string(),
                    audit.level.to_string(),
                    audit.report.concerns.len().to_string(),
                    format_timestamp(&audit.created_at),
                    widget,
                ]);
            }
            println!("{}", builder.build().with(Style::markdown()));

            if !global.quiet {
                println!();
                println!("{} audit(s) found.", style(all.len()).cyan());
            }
            Ok(())
        }
    }
}

fn find_audit(audits: &AuditStore, prefix: &str, level: AuditLevel) -> Result<StoredAudit> {
    let mut matches: Vec<StoredAudit> = audits
        .list()
        .into_iter()
        .filter(|a| a.fingerprint.as_str().starts_with(prefix))
        .filter(|a| a.level == level)
        .collect();

    let fingerprints: BTreeSet<&str> = matches.iter().map(|a| a.fingerprint.as_str()).collect();
    if fingerprints.len() > 1 {
        return Err(miette::miette!(
            "Fingerprint prefix '{}' is ambiguous ({} audited artifacts match)",
            prefix,
            fingerprints.len()
        ));
    }

    if matches.is_empty() {
        return Err(miette::miette!("No stored {} audit matches '{}'", level, prefix));
    }
    Ok(matches.remove(0))
}

fn run_show(
    audits: &AuditStore,
    prefix: &str,
    level: AuditLevel,
    global: &GlobalOpts,
) -> Result<()> {
    let audit = find_audit(audits, prefix, level)?;

    match global.format {
        OutputFormat::Json => return print_json(&audit),
        OutputFormat::Yaml => return print_yaml(&audit.report),
        OutputFormat::Tsv => {
            for concern in &audit.report.concerns {
                println!(
                    "{}\t{}\t{}\t{}",
                    concern.id, concern.location, concern.impact, concern.summary
                );
            }
            return Ok(());
        }
        OutputFormat::Auto => {}
    }

    println!(
        "{} {} audit",
        style(audit.fingerprint.as_str()).cyan().bold(),
        audit.level
    );
    println!("{}", style("─".repeat(40)).dim());
    println!("  Created:  {}", format_timestamp(&audit.created_at));
    println!("  Concerns: {}", audit.report.concerns.len());

    for concern in &audit.report.concerns {
        let impact = match concern.impact {
            Impact::High => style(concern.impact.to_string()).red(),
            Impact::Medium => style(concern.impact.to_string()).yellow(),
            Impact::Low => style(concern.impact.to_string()).dim(),
        };
        println!();
        println!(
            "  {} [{}] {} {}",
            style(&concern.id).bold(),
            impact,
            style(format!("@{}", concern.location)).dim(),
            concern.summary
        );
        if let Some(details) = &concern.details {
            println!("    {}", truncate_str(details, 100));
        }
        for alternative in &concern.alternatives {
            println!("    {} {}", style("→").blue(), alternative);
        }
        if let Some(rationale) = &concern.rationale {
            println!("    {}", style(rationale).dim());
        }
    }

    if !audit.report.open_questions.is_empty() {
        println!();
        println!("  {}", style("Open questions:").bold());
        for question in &audit.report.open_questions {
            println!("    ? {}", question);
        }
    }

    Ok(())
}
