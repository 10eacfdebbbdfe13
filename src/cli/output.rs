//! Output formatting for CLI

use event_ingest::ImportProgressReport;
use event_ingest::models::ImportFileStatus;

/// One-paragraph summary of an import for the terminal
pub fn format_summary(report: &ImportProgressReport, events: usize) -> String {
    let mut output = String::new();

    match report.status {
        ImportFileStatus::Completed => {
            output.push_str(&format!("✅ Import {} completed\n", report.import_id));
        }
        ImportFileStatus::Skipped => {
            output.push_str(&format!(
                "⏭️  Import {} skipped (duplicate resubmission)\n",
                report.import_id
            ));
        }
        ImportFileStatus::Failed => {
            output.push_str(&format!("❌ Import {} failed\n", report.import_id));
        }
        ImportFileStatus::Pending | ImportFileStatus::Processing => {
            output.push_str(&format!(
                "⏳ Import {} stopped at {:.0}%\n",
                report.import_id, report.progress.percentage
            ));
        }
    }

    output.push_str(&format!(
        "  Rows: {}/{}\n",
        report.progress.current, report.progress.total
    ));
    output.push_str(&format!("  Events created: {}\n", events));

    if let Some(job) = &report.current_job {
        output.push_str(&format!("  Stage: {}\n", job.stage));
        if let Some(error) = &job.last_error {
            output.push_str(&format!("  Last error: {}\n", error));
        }
    }

    output
}

pub fn to_pretty_json(report: &ImportProgressReport) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
