use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

// Import from stylecheck-core
use stylecheck_core::{
    ComplianceEngine, EngineConfig, ExtractedDocument, FileTemplateStore, StepProfiler, Template,
    TemplateStore, ToleranceConfig,
};

// Import CLI utilities
use stylecheck::output::{print_profile, print_summary, OutputFormat, ReportEnvelope};

#[derive(Parser)]
#[command(name = "stylecheck")]
#[command(about = "Check a document's paragraph formatting against a style template")]
struct Args {
    /// Extracted document (JSON paragraph list)
    #[arg(short, long, required_unless_present = "list_templates")]
    input: Option<PathBuf>,

    /// Template file (JSON or YAML)
    #[arg(long, conflicts_with = "template_dir")]
    template_file: Option<PathBuf>,

    /// Directory of templates, used with --template
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Template identifier inside --template-dir
    #[arg(short, long, requires = "template_dir")]
    template: Option<String>,

    /// Tolerance file (JSON); written with defaults when missing
    #[arg(long)]
    tolerance: Option<PathBuf>,

    /// Engine config file (YAML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Title of the first body paragraph, overrides the config
    #[arg(long)]
    body_anchor: Option<String>,

    /// Skip the external classifier fallback pass
    #[arg(long)]
    no_external: bool,

    /// Output file path (if not specified, auto-generated based on input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: report or summary
    #[arg(short = 'f', long, value_enum, default_value = "report")]
    format: OutputFormat,

    /// List the templates in --template-dir and exit
    #[arg(long, requires = "template_dir")]
    list_templates: bool,

    /// Print per-stage timings
    #[arg(long)]
    profile: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("❌ Check failed: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> Result<()> {
    println!("📐 Stylecheck");

    if args.list_templates {
        return list_templates(args);
    }

    let Some(input) = args.input.as_deref() else {
        bail!("--input is required");
    };
    let template = load_template(args)?;
    println!("📋 Template: {} ({} roles)", template.display_name(), template.roles.len());

    let tolerance = load_tolerance(args.tolerance.as_deref())?;

    let mut config = EngineConfig::load_with_fallback(args.config.as_deref())?;
    if let Some(config_path) = &args.config {
        println!("📋 Loaded config from: {}", config_path.display());
    } else {
        println!("📋 Using default config");
    }

    // Apply CLI overrides to config
    if let Some(anchor) = &args.body_anchor {
        config.body_anchor = Some(anchor.clone());
    }
    if args.no_external {
        config.external_classifier = None;
    }
    debug!(
        body_anchor = ?config.body_anchor,
        external = config.external_classifier.is_some(),
        "effective engine settings"
    );

    let raw = fs::read_to_string(input)
        .with_context(|| format!("Failed to read input: {}", input.display()))?;
    let document = ExtractedDocument::from_json_str(&raw)
        .with_context(|| format!("Invalid extracted document: {}", input.display()))?;
    println!("📄 Checking: {} ({} paragraphs)", input.display(), document.paragraphs.len());

    let engine = ComplianceEngine::from_config(config)?;
    let mut profiler = StepProfiler::new(args.profile);
    let report =
        engine.check_with_profiler(&document.paragraphs, &template, &tolerance, &mut profiler)?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(input));
    ReportEnvelope::new(input, &template, &report, args.format).save_to_file(&output_path)?;

    if report.is_compliant() {
        println!("✅ Document complies with the template");
    }
    print_summary(&report);
    print_profile(&profiler);
    println!("💾 Report saved to: {}", output_path.display());
    Ok(())
}

fn load_template(args: &Args) -> Result<Template> {
    if let Some(path) = &args.template_file {
        return Template::load_from_file(path)
            .with_context(|| format!("Failed to load template: {}", path.display()));
    }
    match (&args.template_dir, &args.template) {
        (Some(dir), Some(id)) => Ok(FileTemplateStore::new(dir).load(id)?),
        _ => bail!("pass --template-file, or --template-dir with --template"),
    }
}

fn list_templates(args: &Args) -> Result<()> {
    let Some(dir) = &args.template_dir else {
        bail!("--list-templates needs --template-dir");
    };
    let summaries = FileTemplateStore::new(dir).list()?;
    if summaries.is_empty() {
        println!("⚠️  No templates found in: {}", dir.display());
        return Ok(());
    }

    println!("\n📁 Templates in {}:", dir.display());
    for summary in summaries {
        let name = summary.name.as_deref().unwrap_or("-");
        let organization = summary
            .organization
            .as_deref()
            .map(|org| format!(" [{org}]"))
            .unwrap_or_default();
        println!(
            "  {:<24} {name}{organization} ({} roles)",
            summary.id, summary.role_count
        );
    }
    Ok(())
}

/// Missing tolerance files are synthesized with defaults and written back
fn load_tolerance(path: Option<&Path>) -> Result<ToleranceConfig> {
    let Some(path) = path else {
        println!("📏 Using default tolerances");
        return Ok(ToleranceConfig::default());
    };
    let (tolerance, synthesized) = ToleranceConfig::load_or_default(path)?;
    if synthesized {
        tolerance.save_to_file(path)?;
        println!("📏 Wrote default tolerances to: {}", path.display());
    } else {
        println!("📏 Loaded tolerances from: {}", path.display());
    }
    Ok(tolerance)
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    PathBuf::from(format!("{stem}_stylecheck.json"))
}
