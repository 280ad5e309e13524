use serde_json::{Value, json};

use super::TRACKED_AUDITS;
use crate::model::FormFactor;

/// Minimal Lighthouse report carrying the fields the report reader consumes.
pub(crate) fn report_json(
    url: &str,
    form_factor: FormFactor,
    performance: f64,
    interactive: f64,
    console_errors: &[&str],
) -> String {
    let mut audits = serde_json::Map::new();
    for audit in TRACKED_AUDITS {
        let value = if audit == "interactive" { interactive } else { 10.0 };
        audits.insert(
            audit.to_string(),
            json!({ "id": audit, "numericValue": value, "numericUnit": "millisecond" }),
        );
    }
    let items: Vec<Value> = console_errors
        .iter()
        .map(|description| json!({ "source": "console.error", "description": description }))
        .collect();
    audits.insert(
        "errors-in-console".to_string(),
        json!({ "id": "errors-in-console", "details": { "type": "table", "items": items } }),
    );

    json!({
        "requestedUrl": url,
        "finalUrl": url,
        "configSettings": { "formFactor": form_factor.as_str() },
        "categories": { "performance": { "id": "performance", "score": performance } },
        "audits": audits,
    })
    .to_string()
}
