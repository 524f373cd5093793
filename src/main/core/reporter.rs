use crate::api::traits::Reporter;
use crate::api::types::DiscoveryOutcome;

pub struct TextReporter;
pub struct JsonReporter;

impl Reporter for TextReporter {
    fn report(&self, outcome: &DiscoveryOutcome) -> String {
        let report = &outcome.report;
        let mut output = String::new();

        output.push_str("plan-engine discovery results\n");
        output.push_str(&"=".repeat(60));
        output.push('\n');
        output.push('\n');

        output.push_str(&format!(
            "  folders scanned: {}, files analyzed: {}\n",
            report.folders_scanned, report.files_analyzed
        ));
        output.push_str(&format!(
            "  epics: {} (index: {}, folders: {})\n",
            report.epics_discovered, report.epics_from_index, report.epics_from_folders
        ));
        output.push_str(&format!(
            "  features: {} (index: {}, folders: {})\n",
            report.features_discovered, report.features_from_index, report.features_from_folders
        ));
        output.push_str(&format!(
            "  related docs: {}\n",
            report.related_docs_cataloged
        ));

        if !report.conflicts.is_empty() {
            output.push_str(&format!("\n## Conflicts ({})\n", report.conflicts.len()));
            for conflict in &report.conflicts {
                output.push_str(&format!(
                    "  [{}] {}: {}\n",
                    conflict.conflict_type, conflict.key, conflict.resolution
                ));
                output.push_str(&format!("    -> {}\n", conflict.suggestion));
            }
        }

        if !outcome.assignments.is_empty() {
            output.push_str(&format!(
                "\n## Task keys ({})\n",
                outcome.assignments.len()
            ));
            for assignment in &outcome.assignments {
                let status = if !assignment.newly_generated {
                    "existing"
                } else if assignment.written_to_file {
                    "written"
                } else if assignment.write_error.is_some() {
                    "NOT WRITTEN"
                } else {
                    "dry-run"
                };
                output.push_str(&format!(
                    "  [{}] {}: {}\n",
                    status,
                    assignment.task_key,
                    assignment.file.display()
                ));
                if let Some(err) = &assignment.write_error {
                    output.push_str(&format!("    -> {}\n", err));
                }
            }
        }

        if !report.warnings.is_empty() {
            output.push_str(&format!("\n## Warnings ({})\n", report.warnings.len()));
            for warning in &report.warnings {
                output.push_str(&format!("  - {}\n", warning));
            }
        }

        if !report.errors.is_empty() {
            output.push_str(&format!("\n## Errors ({})\n", report.errors.len()));
            for issue in &report.errors {
                match &issue.path {
                    Some(path) => output.push_str(&format!(
                        "  [{}] {}: {}\n",
                        issue.kind,
                        path.display(),
                        issue.message
                    )),
                    None => output.push_str(&format!("  [{}] {}\n", issue.kind, issue.message)),
                }
                if let Some(suggestion) = &issue.suggestion {
                    output.push_str(&format!("    -> {}\n", suggestion));
                }
            }
        }

        output.push_str(&format!(
            "\n{} conflicts, {} warnings, {} errors\n",
            report.conflicts_detected,
            report.warnings.len(),
            report.errors.len(),
        ));

        output
    }
}

impl Reporter for JsonReporter {
    /// The JSON shape is the report itself; its field names are fixed for
    /// downstream tooling.
    fn report(&self, outcome: &DiscoveryOutcome) -> String {
        serde_json::to_string_pretty(&outcome.report).unwrap_or_else(|e| {
            format!("{{\"error\": \"JSON serialization failed: {}\"}}", e)
        })
    }
}
