use crate::config::ScoringConfig;
use crate::fingerprint::versions::REPORT_SCHEMA_VERSION;
use crate::types::{Assignment, ComplianceReport, Discrepancy, Severity};
use std::collections::{BTreeMap, BTreeSet};

/// Collects discrepancies into a scored, deterministically ordered report
pub struct ComplianceAggregator<'a> {
    scoring: &'a ScoringConfig,
}

impl<'a> ComplianceAggregator<'a> {
    pub fn new(scoring: &'a ScoringConfig) -> Self {
        Self { scoring }
    }

    pub fn penalty(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Minor => self.scoring.minor_penalty,
            Severity::Major => self.scoring.major_penalty,
        }
    }

    /// `max_score` minus severity-weighted penalties, floored at `min_score`
    pub fn score(&self, discrepancies: &[Discrepancy]) -> f64 {
        let penalties: f64 = discrepancies.iter().map(|d| self.penalty(d.severity)).sum();
        (self.scoring.max_score - penalties).max(self.scoring.min_score)
    }

    /// Template id and fingerprint are left empty for the caller to stamp
    pub fn aggregate(
        &self,
        mut discrepancies: Vec<Discrepancy>,
        mut assignments: Vec<Assignment>,
    ) -> ComplianceReport {
        discrepancies.sort_by(|a, b| {
            a.locator
                .cmp(&b.locator)
                .then_with(|| a.attribute_key.cmp(&b.attribute_key))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        assignments.sort_by_key(|assignment| assignment.locator);

        let mut counts_by_category = BTreeMap::new();
        let mut counts_by_severity = BTreeMap::new();
        let mut counts_by_role = BTreeMap::new();
        for discrepancy in &discrepancies {
            *counts_by_category.entry(discrepancy.category).or_insert(0) += 1;
            *counts_by_severity.entry(discrepancy.severity).or_insert(0) += 1;
            let role = discrepancy
                .role
                .clone()
                .unwrap_or_else(|| "(unassigned)".to_string());
            *counts_by_role.entry(role).or_insert(0) += 1;
        }

        let flagged: BTreeSet<_> = discrepancies.iter().map(|d| d.locator).collect();
        let compliant_paragraphs = assignments
            .iter()
            .filter(|assignment| !flagged.contains(&assignment.locator))
            .count();

        ComplianceReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            template_id: String::new(),
            fingerprint: String::new(),
            paragraph_count: assignments.len(),
            compliant_paragraphs,
            score: self.score(&discrepancies),
            max_score: self.scoring.max_score,
            counts_by_category,
            counts_by_severity,
            counts_by_role,
            discrepancies,
            assignments,
        }
    }
}
