use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use stylecheck_core::{
    Category, ComplianceReport, DiscrepancyKind, Severity, StepProfiler, Template,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Full report with every discrepancy and the assignment table
    Report,
    /// Scores and counts only
    Summary,
}

#[derive(Debug, Serialize)]
pub struct TemplateRef {
    pub id: String,
    pub name: Option<String>,
    pub organization: Option<String>,
}

impl From<&Template> for TemplateRef {
    fn from(template: &Template) -> Self {
        Self {
            id: template.id.clone(),
            name: template.metadata.name.clone(),
            organization: template.metadata.organization.clone(),
        }
    }
}

/// Scores and counts without the per-paragraph detail
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub schema_version: String,
    pub template_id: String,
    pub fingerprint: String,
    pub score: f64,
    pub max_score: f64,
    pub paragraph_count: usize,
    pub compliant_paragraphs: usize,
    pub unresolved_paragraphs: usize,
    pub discrepancy_count: usize,
    pub counts_by_category: BTreeMap<Category, usize>,
    pub counts_by_severity: BTreeMap<Severity, usize>,
    pub counts_by_role: BTreeMap<String, usize>,
}

impl From<&ComplianceReport> for ReportSummary {
    fn from(report: &ComplianceReport) -> Self {
        Self {
            schema_version: report.schema_version.clone(),
            template_id: report.template_id.clone(),
            fingerprint: report.fingerprint.clone(),
            score: report.score,
            max_score: report.max_score,
            paragraph_count: report.paragraph_count,
            compliant_paragraphs: report.compliant_paragraphs,
            unresolved_paragraphs: report.unresolved_count(),
            discrepancy_count: report.discrepancies.len(),
            counts_by_category: report.counts_by_category.clone(),
            counts_by_severity: report.counts_by_severity.clone(),
            counts_by_role: report.counts_by_role.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ReportBody<'a> {
    Full(&'a ComplianceReport),
    Summary(ReportSummary),
}

/// What the CLI writes to disk. The timestamp lives here so the report itself
/// stays byte-identical across runs.
#[derive(Debug, Serialize)]
pub struct ReportEnvelope<'a> {
    pub generated_at: DateTime<Utc>,
    pub input: String,
    pub template: TemplateRef,
    pub report: ReportBody<'a>,
}

impl<'a> ReportEnvelope<'a> {
    pub fn new(
        input: &Path,
        template: &Template,
        report: &'a ComplianceReport,
        format: OutputFormat,
    ) -> Self {
        let body = match format {
            OutputFormat::Report => ReportBody::Full(report),
            OutputFormat::Summary => ReportBody::Summary(ReportSummary::from(report)),
        };
        Self {
            generated_at: Utc::now(),
            input: input.display().to_string(),
            template: TemplateRef::from(template),
            report: body,
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }
}

pub fn print_summary(report: &ComplianceReport) {
    println!("📊 Compliance summary:");
    println!("   - Score: {:.1} / {:.1}", report.score, report.max_score);
    println!(
        "   - Paragraphs: {} ({} compliant, {} unresolved)",
        report.paragraph_count,
        report.compliant_paragraphs,
        report.unresolved_count()
    );
    println!("   - Discrepancies: {}", report.discrepancies.len());
    for (category, count) in &report.counts_by_category {
        println!("     {category:?}: {count}");
    }
    for (severity, count) in &report.counts_by_severity {
        println!("     {severity:?}: {count}");
    }

    let preview: Vec<_> = report.discrepancies.iter().take(5).collect();
    if !preview.is_empty() {
        println!("\n🔎 First discrepancies:");
        for discrepancy in preview {
            let what = match discrepancy.kind {
                DiscrepancyKind::UnassignedStyle => "no style role".to_string(),
                DiscrepancyKind::MissingAttribute
                | DiscrepancyKind::Mismatch
                | DiscrepancyKind::InvalidValue => discrepancy
                    .attribute_key
                    .as_ref()
                    .map(|key| key.to_string())
                    .unwrap_or_default(),
            };
            let values = match (&discrepancy.expected, &discrepancy.actual) {
                (Some(expected), Some(actual)) => format!(" expected {expected}, found {actual}"),
                (Some(expected), None) => format!(" expected {expected}, missing"),
                _ => String::new(),
            };
            println!(
                "   {} [{:?}] {what}{values} \"{}\"",
                discrepancy.locator, discrepancy.severity, discrepancy.text_preview
            );
        }
    }
}

pub fn print_profile(profiler: &StepProfiler) {
    let timings = profiler.timings();
    if timings.is_empty() {
        return;
    }

    println!("\n📊 Performance Summary:");
    let total = profiler.total();
    for (step, duration) in timings {
        let percentage = if total.is_zero() {
            0.0
        } else {
            (duration.as_secs_f64() / total.as_secs_f64()) * 100.0
        };
        println!(
            "   {:.<35} {:.0}ms ({:.1}%)",
            step,
            duration.as_millis(),
            percentage
        );
    }
    println!("   {:.<35} {:.0}ms", "Total", total.as_millis());
}
