//! Renders a stored analysis envelope into a downloadable markdown
//! document. Pure function: structured analysis in, byte stream out.

use chrono::{DateTime, Utc};

use crate::services::htp::HtpReport;

const SUMMARY_HEADING: &str = "### overall summary";

/// Render the assessment document for one drawing.
///
/// When the safety override is active, the fixed warning text replaces the
/// AI-generated signal and report entirely; the end user never sees the
/// suppressed content.
pub fn render_markdown(report: &HtpReport, drawing_id: uuid::Uuid, submitted_at: DateTime<Utc>) -> Vec<u8> {
    let mut doc = String::new();

    doc.push_str("# HTP Drawing Assessment Report\n\n");
    doc.push_str(&format!("- Submission: `{drawing_id}`\n"));
    doc.push_str(&format!(
        "- Submitted at: {}\n\n",
        submitted_at.format("%Y-%m-%d %H:%M UTC")
    ));

    if let Some(fix_signal) = &report.fix_signal {
        doc.push_str(fix_signal);
        doc.push('\n');
    } else {
        doc.push_str("## Assessment Opinion\n\n");
        doc.push_str(&report.signal);
        doc.push_str("\n\n");

        let (detailed, summary) = split_summary(&report.final_report);
        doc.push_str("## Detailed Analysis\n\n");
        doc.push_str(detailed.trim());
        doc.push_str("\n\n");
        if let Some(summary) = summary {
            doc.push_str("## Summary\n\n");
            doc.push_str(summary.trim());
            doc.push_str("\n\n");
        }
    }

    doc.push_str(&format!(
        "---\n\nToken usage: {} total ({} prompt, {} completion)\n",
        report.usage.total, report.usage.prompt, report.usage.completion
    ));

    doc.into_bytes()
}

/// Split the final report at its "Overall Summary" heading, if present.
fn split_summary(final_report: &str) -> (&str, Option<&str>) {
    let lowered = final_report.to_lowercase();
    match lowered.find(SUMMARY_HEADING) {
        Some(index) => {
            let detailed = &final_report[..index];
            let summary = final_report[index + SUMMARY_HEADING.len()..].trim_start();
            (detailed, Some(summary))
        }
        None => (final_report, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::htp::{FIX_SIGNAL, StageOutcome, TokenUsage};

    fn sample_report(fix_signal: Option<String>) -> HtpReport {
        HtpReport {
            overall: StageOutcome::not_analyzed(),
            house: StageOutcome::not_analyzed(),
            tree: StageOutcome::not_analyzed(),
            person: StageOutcome {
                feature: "feature".to_string(),
                analysis: "analysis".to_string(),
            },
            merge: "merged narrative".to_string(),
            final_report:
                "Detailed interpretation here.\n\n### Overall Summary\nCalm and stable."
                    .to_string(),
            signal: "No warning signals.".to_string(),
            classification: Some(fix_signal.is_none()),
            fix_signal,
            usage: TokenUsage {
                total: 30,
                prompt: 20,
                completion: 10,
            },
        }
    }

    #[test]
    fn test_render_splits_summary_section() {
        let report = sample_report(None);
        let rendered =
            String::from_utf8(render_markdown(&report, uuid::Uuid::nil(), Utc::now())).unwrap();
        assert!(rendered.contains("## Detailed Analysis"));
        assert!(rendered.contains("Detailed interpretation here."));
        assert!(rendered.contains("## Summary"));
        assert!(rendered.contains("Calm and stable."));
        assert!(rendered.contains("No warning signals."));
        assert!(rendered.contains("30 total (20 prompt, 10 completion)"));
    }

    #[test]
    fn test_safety_override_replaces_model_output() {
        let report = sample_report(Some(FIX_SIGNAL.to_string()));
        let rendered =
            String::from_utf8(render_markdown(&report, uuid::Uuid::nil(), Utc::now())).unwrap();
        assert!(rendered.contains("IMPORTANT NOTICE"));
        // The suppressed model output must not leak into the document.
        assert!(!rendered.contains("Detailed interpretation here."));
        assert!(!rendered.contains("No warning signals."));
    }

    #[test]
    fn test_render_without_summary_heading() {
        let mut report = sample_report(None);
        report.final_report = "Only a body, no summary heading.".to_string();
        let rendered =
            String::from_utf8(render_markdown(&report, uuid::Uuid::nil(), Utc::now())).unwrap();
        assert!(rendered.contains("Only a body, no summary heading."));
        assert!(!rendered.contains("## Summary"));
    }
}
