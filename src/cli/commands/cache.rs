//! `widgetsmith cache` command - Inspect and maintain the artifact cache
//!
//! The cache lives in `.widgetsmith/`: one code file per artifact under
//! `widgets/` and a JSON index under `index/` grouping artifacts by label.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::cli::args::{GlobalOpts, OutputFormat};
use crate::cli::commands::fingerprint::RequestArgs;
use crate::cli::helpers::{format_timestamp, open_project, print_json, print_yaml, truncate_str};
use crate::core::audit::AuditStore;
use crate::core::fingerprint::Fingerprint;
use crate::core::project::Project;
use crate::core::store::{resolve_label, ArtifactStore, ClearScope, LocatedArtifact};

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,

    /// List cached artifacts, newest first
    List {
        /// Only artifacts under this label
        #[arg(long, short = 'l')]
        label: Option<String>,

        /// Only artifacts created from this notebook
        #[arg(long)]
        notebook: Option<String>,

        /// Maximum number of artifacts to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Show the revision history of a label, oldest first
    History {
        /// Label to show
        label: String,
    },

    /// Show one artifact and its lineage
    Show {
        /// Fingerprint or unique fingerprint prefix
        fingerprint: String,

        /// Also print the stored code
        #[arg(long)]
        code: bool,
    },

    /// Check whether a request would hit the cache
    Lookup {
        #[command(flatten)]
        request: RequestArgs,

        /// Label the widget would be stored under
        #[arg(long, short = 'l')]
        label: Option<String>,
    },

    /// Remove cached artifacts or audit reports
    Clear {
        /// Remove every artifact
        #[arg(long, conflicts_with_all = ["label", "fingerprint"])]
        all: bool,

        /// Remove every stored audit report
        #[arg(long)]
        audits: bool,

        /// Remove every artifact under a label
        #[arg(long)]
        label: Option<String>,

        /// Remove a single artifact
        #[arg(long)]
        fingerprint: Option<String>,
    },
}

/// Flat artifact view for list/history output
#[derive(Debug, Serialize)]
struct ArtifactRow {
    fingerprint: String,
    label: String,
    version: u32,
    created_at: String,
    description: String,
    model: String,
    revision_parent: Option<String>,
    file: String,
}

impl From<&LocatedArtifact> for ArtifactRow {
    fn from(a: &LocatedArtifact) -> Self {
        Self {
            fingerprint: a.fingerprint.to_string(),
            label: a.label.clone(),
            version: a.version,
            created_at: a.created_at.to_rfc3339(),
            description: a.description.clone(),
            model: a.model.clone(),
            revision_parent: a.revision_parent.as_ref().map(|p| p.to_string()),
            file: a.file_name.clone(),
        }
    }
}

pub fn run(cmd: CacheCommands, global: &GlobalOpts) -> Result<()> {
    let project = open_project(global)?;
    let mut store = ArtifactStore::open(&project).into_diagnostic()?;

    match cmd {
        CacheCommands::Status => run_status(&store, &project),
        CacheCommands::List {
            label,
            notebook,
            limit,
        } => run_list(&store, label, notebook, limit, global),
        CacheCommands::History { label } => run_history(&store, &label, global),
        CacheCommands::Show { fingerprint, code } => run_show(&store, &fingerprint, code, global),
        CacheCommands::Lookup { request, label } => run_lookup(&store, &request, label.as_deref(), global),
        CacheCommands::Clear {
            all,
            audits,
            label,
            fingerprint,
        } => run_clear(&mut store, all, audits, label, fingerprint, global),
    }
}

fn run_status(store: &ArtifactStore, project: &Project) -> Result<()> {
    let stats = store.stats();
    let audit_count = AuditStore::new(project).list().len();

    println!("{}", style("Cache Status").bold());
    println!("{}", style("─".repeat(40)).dim());
    println!("  Index:      {}", project.index_file().display());
    println!("  Artifacts:  {}", style(stats.total_count).cyan());
    println!("  Labels:     {}", style(stats.label_count).cyan());
    println!("  Audits:     {}", style(audit_count).cyan());
    if let Some(oldest) = stats.oldest_created {
        println!("  Oldest:     {}", format_timestamp(&oldest));
    }
    if let Some(newest) = stats.newest_created {
        println!("  Newest:     {}", format_timestamp(&newest));
    }

    let notebooks = store.notebooks();
    if !notebooks.is_empty() {
        println!();
        println!("  {}", style("Notebooks:").bold());
        for notebook in notebooks {
            println!("    {}", notebook);
        }
    }

    Ok(())
}

fn run_list(
    store: &ArtifactStore,
    label: Option<String>,
    notebook: Option<String>,
    limit: usize,
    global: &GlobalOpts,
) -> Result<()> {
    let mut artifacts = match (&label, &notebook) {
        (Some(label), _) => store.artifacts_for_label(label),
        (None, Some(notebook)) => store.artifacts_for_notebook(notebook),
        (None, None) => store.recent(limit),
    };
    if let Some(notebook) = &notebook {
        artifacts.retain(|a| a.notebook_path.as_deref() == Some(notebook.as_str()));
    }
    artifacts.truncate(limit);

    print_artifacts(&artifacts, global)
}

fn run_history(store: &ArtifactStore, label: &str, global: &GlobalOpts) -> Result<()> {
    let chain = store.revision_chain(label);
    if chain.is_empty() {
        return Err(miette::miette!("No artifacts under label '{}'", label));
    }
    print_artifacts(&chain, global)
}

fn print_artifacts(artifacts: &[LocatedArtifact], global: &GlobalOpts) -> Result<()> {
    let rows: Vec<ArtifactRow> = artifacts.iter().map(ArtifactRow::from).collect();

    match global.format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Yaml => print_yaml(&rows),
        OutputFormat::Tsv => {
            for row in &rows {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    row.fingerprint, row.label, row.version, row.created_at, row.description
                );
            }
            Ok(())
        }
        OutputFormat::Auto => {
            if rows.is_empty() {
                if !global.quiet {
                    println!("No cached artifacts found.");
                }
                return Ok(());
            }

            let mut builder = Builder::default();
            builder.push_record(["FINGERPRINT", "LABEL", "VER", "CREATED", "DESCRIPTION"]);
            for a in artifacts {
                builder.push_record([
                    a.fingerprint.short().to_string(),
                    a.label.clone(),
                    a.version.to_string(),
                    format_timestamp(&a.created_at),
                    truncate_str(&a.description, 40),
                ]);
            }
            println!("{}", builder.build().with(Style::markdown()));

            if !global.quiet {
                println!();
                println!("{} artifact(s) found.", style(rows.len()).cyan());
            }
            Ok(())
        }
    }
}

fn run_show(store: &ArtifactStore, prefix: &str, with_code: bool, global: &GlobalOpts) -> Result<()> {
    let artifact = store
        .by_fingerprint_prefix(prefix)
        .ok_or_else(|| miette::miette!("No unique artifact matches '{}'", prefix))?;

    match global.format {
        OutputFormat::Json => return print_json(&artifact.artifact),
        OutputFormat::Yaml => return print_yaml(&artifact.artifact),
        OutputFormat::Tsv | OutputFormat::Auto => {}
    }

    println!("{}", style(artifact.fingerprint.as_str()).cyan().bold());
    println!("{}", style("─".repeat(40)).dim());
    println!("  Label:       {} (v{})", artifact.label, artifact.version);
    println!("  Created:     {}", format_timestamp(&artifact.created_at));
    println!("  Description: {}", artifact.description);
    if let Some(shape) = artifact.data_shape {
        println!("  Data shape:  {}", shape);
    }
    if !artifact.model.is_empty() {
        println!("  Model:       {}", artifact.model);
    }
    if let Some(theme) = &artifact.theme_name {
        println!("  Theme:       {}", theme);
    }
    if let Some(notebook) = &artifact.notebook_path {
        println!("  Notebook:    {}", notebook);
    }
    if !artifact.components.is_empty() {
        println!("  Components:  {}", artifact.components.join(", "));
    }
    if !artifact.is_complete() {
        println!("  {}", style("Unresolved issues:").red());
        for issue in &artifact.issues {
            println!("    - {}", issue);
        }
    }

    let path = store.code_path(&artifact);
    let present = path.exists();
    println!(
        "  File:        {}{}",
        path.display(),
        if present { String::new() } else { style(" (missing)").red().to_string() }
    );

    let lineage = store.lineage(&artifact.fingerprint);
    if lineage.len() > 1 {
        println!();
        println!("  {}", style("Lineage:").bold());
        for (depth, ancestor) in lineage.iter().enumerate() {
            println!(
                "    {}{} {}",
                "  ".repeat(depth),
                style(ancestor.fingerprint.short()).yellow(),
                truncate_str(&ancestor.description, 50)
            );
        }
    }

    if with_code {
        match store.load_code(&artifact) {
            Some(code) => {
                println!();
                print!("{}", code);
                if !code.ends_with('\n') {
                    println!();
                }
            }
            None => return Err(miette::miette!("Code file missing: {}", path.display())),
        }
    }

    Ok(())
}

fn run_lookup(
    store: &ArtifactStore,
    request: &RequestArgs,
    label: Option<&str>,
    global: &GlobalOpts,
) -> Result<()> {
    let spec = request.to_spec();
    let fingerprint = spec.fingerprint();

    if let Some(hit) = store.lookup(&spec, label) {
        if global.quiet {
            println!("{}", store.code_path(&hit).display());
        } else {
            println!(
                "{} Cache hit {} at {}/{}",
                style("✓").green(),
                style(hit.fingerprint.short()).cyan(),
                hit.label,
                hit.position
            );
            println!("  {}", store.code_path(&hit).display());
        }
        return Ok(());
    }

    let label = resolve_label(label);
    println!(
        "{} Cache miss {} (label {})",
        style("✗").red(),
        style(fingerprint.short()).cyan(),
        style(&label).yellow()
    );
    for reason in store.explain_miss(&spec, Some(&label)) {
        println!("  - {}", reason);
    }
    Ok(())
}

fn run_clear(
    store: &mut ArtifactStore,
    all: bool,
    audits: bool,
    label: Option<String>,
    fingerprint: Option<String>,
    global: &GlobalOpts,
) -> Result<()> {
    let mut scopes = Vec::new();
    if all {
        scopes.push(ClearScope::AllArtifacts);
    }
    if let Some(label) = label {
        scopes.push(ClearScope::Label(label));
    }
    if let Some(prefix) = fingerprint {
        let fp = store
            .by_fingerprint_prefix(&prefix)
            .map(|a| a.fingerprint.clone())
            .unwrap_or_else(|| Fingerprint::new(prefix));
        scopes.push(ClearScope::Fingerprint(fp));
    }
    if audits {
        scopes.push(ClearScope::AllAudits);
    }
    if scopes.is_empty() {
        return Err(miette::miette!(
            "Nothing to clear: pass --all, --audits, --label or --fingerprint"
        ));
    }

    for scope in &scopes {
        let removed = store.clear(scope).into_diagnostic()?;
        if !global.quiet {
            let what = match scope {
                ClearScope::AllArtifacts => "all artifacts".to_string(),
                ClearScope::AllAudits => "audit reports".to_string(),
                ClearScope::Label(label) => format!("label '{}'", label),
                ClearScope::Fingerprint(fp) => format!("artifact {}", fp.short()),
            };
            println!(
                "{} Cleared {} ({} file(s) removed)",
                style("✓").green(),
                what,
                removed
            );
        }
    }
    Ok(())
}
