//! Text (terminal) reporter

use super::RunSummary;
use crate::models::SecurityStatus;
use crate::orchestrator::OutcomeKind;
use anyhow::Result;
use console::style;

fn status_style(status: SecurityStatus) -> console::StyledObject<String> {
    let s = style(status.to_string());
    match status {
        SecurityStatus::VerifiedSecure => s.green(),
        SecurityStatus::Conditional => s.cyan(),
        SecurityStatus::UnderReview => s.yellow(),
        SecurityStatus::NotRecommended => s.red(),
    }
}

pub fn render(summary: &RunSummary) -> Result<String> {
    let mut out = String::new();

    out.push_str(&format!(
        "\n{} {}\n",
        style("mcpvet scan").bold(),
        style(&summary.run_id).dim()
    ));
    out.push_str(&format!(
        "{}\n",
        style("──────────────────────────────────────").dim()
    ));

    for row in &summary.versions {
        let target = format!("{}@{}", row.slug, row.version);
        let line = match &row.outcome {
            OutcomeKind::Scored {
                overall_score,
                status,
            } => format!(
                "  {:<40} {:>3}  {}",
                target,
                overall_score,
                status_style(*status)
            ),
            OutcomeKind::AwaitingScan { reason } => format!(
                "  {:<40} {}  {}",
                target,
                style("awaiting scan").yellow(),
                style(reason).dim()
            ),
            OutcomeKind::Error { message } => format!(
                "  {:<40} {}  {}",
                target,
                style("error").red().bold(),
                style(message).dim()
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }

    let c = &summary.counts;
    out.push_str(&format!(
        "\n{} {} versions: {} scored, {} awaiting scan ({} skipped), {} errors\n",
        style("Summary:").bold(),
        c.total,
        c.scored,
        c.awaiting_scan,
        c.skipped,
        c.errors
    ));
    out.push_str(&format!(
        "{}\n",
        style(format!("Results written to {}", summary.output)).dim()
    ));

    Ok(out)
}
