//! `widgetsmith fingerprint` command - Compute a request's cache key

use console::style;
use miette::Result;

use crate::cli::args::{GlobalOpts, OutputFormat};
use crate::cli::helpers::{print_json, print_yaml};
use crate::core::fingerprint::{DataShape, RequestSpec};

/// The semantic parts of a widget request, as command-line flags
#[derive(clap::Args, Debug, Clone)]
pub struct RequestArgs {
    /// Natural-language description of the widget
    pub description: String,

    /// Number of rows in the primary data input
    #[arg(long, requires = "cols")]
    pub rows: Option<u64>,

    /// Number of columns in the primary data input
    #[arg(long, requires = "rows")]
    pub cols: Option<u64>,

    /// Exported trait as NAME=DESCRIPTION (repeatable)
    #[arg(long = "export", value_parser = parse_trait)]
    pub exports: Vec<(String, String)>,

    /// Imported trait as NAME=DESCRIPTION (repeatable)
    #[arg(long = "import", value_parser = parse_trait)]
    pub imports: Vec<(String, String)>,

    /// Theme description
    #[arg(long)]
    pub theme: Option<String>,
}

impl RequestArgs {
    pub fn to_spec(&self) -> RequestSpec {
        let mut spec = RequestSpec::new(self.description.clone());
        if let (Some(rows), Some(cols)) = (self.rows, self.cols) {
            spec = spec.with_data_shape(DataShape::new(rows, cols));
        }
        for (name, description) in &self.exports {
            spec = spec.with_export(name.clone(), description.clone());
        }
        for (name, description) in &self.imports {
            spec = spec.with_import(name.clone(), description.clone());
        }
        if let Some(theme) = &self.theme {
            spec = spec.with_theme(theme.clone());
        }
        spec
    }
}

fn parse_trait(raw: &str) -> Result<(String, String), String> {
    let (name, description) = raw.split_once('=').unwrap_or((raw, ""));
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Trait name missing in '{}'", raw));
    }
    Ok((name.to_string(), description.trim().to_string()))
}

#[derive(clap::Args, Debug)]
pub struct FingerprintArgs {
    #[command(flatten)]
    pub request: RequestArgs,
}

pub fn run(args: FingerprintArgs, global: &GlobalOpts) -> Result<()> {
    let breakdown = args.request.to_spec().breakdown();

    match global.format {
        OutputFormat::Json => print_json(&breakdown),
        OutputFormat::Yaml => print_yaml(&breakdown),
        OutputFormat::Tsv => {
            println!("{}", breakdown.fingerprint);
            Ok(())
        }
        OutputFormat::Auto => {
            if global.quiet {
                println!("{}", breakdown.fingerprint);
                return Ok(());
            }
            println!("{}", style(breakdown.fingerprint.as_str()).cyan().bold());
            println!("{}", style("─".repeat(40)).dim());
            println!("  Description: {}", breakdown.description);
            match breakdown.data_shape {
                Some(shape) => println!("  Data shape:  {}", shape),
                None => println!("  Data shape:  {}", style("none").dim()),
            }
            println!("  Exports:     {}", breakdown.exports_signature);
            println!("  Imports:     {}", breakdown.imports_signature);
            println!("  Theme:       {}", breakdown.theme_signature);
            Ok(())
        }
    }
}
