//! JSON reporter
//!
//! Outputs the full RunSummary as pretty-printed JSON.

use super::RunSummary;
use anyhow::Result;

pub fn render(summary: &RunSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_summary;

    #[test]
    fn test_json_render_valid() {
        let json_str = render(&test_summary()).expect("render JSON");
        let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("parse JSON");
        assert_eq!(parsed["counts"]["skipped"], 1);
        let versions = parsed["versions"].as_array().expect("versions array");
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[0]["outcome"], "scored");
        assert_eq!(versions[0]["overall_score"], 82);
        assert_eq!(versions[0]["status"], "conditional");
        assert_eq!(versions[1]["phase"], "skipped");
        assert_eq!(versions[2]["outcome"], "error");
    }
}
