//! Failure reporting.
//!
//! When `ERROR_REPORT_URL` is configured, a fatal run posts one JSON
//! document describing the failure to that URL. Reporting is best effort:
//! every problem in here is logged and swallowed so it can never mask the
//! error being reported.

use serde_json::json;

fn report_payload(error: &anyhow::Error, exit_code: u8) -> serde_json::Value {
    let chain: Vec<String> = error.chain().map(|cause| cause.to_string()).collect();
    json!({
        "program": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "message": chain.first().cloned().unwrap_or_default(),
        "chain": chain,
        "exit_code": exit_code,
    })
}

pub async fn send_failure_report(url: &str, error: &anyhow::Error, exit_code: u8) {
    let client = match reqwest::Client::builder().build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Could not build failure report client: {}", e);
            return;
        }
    };
    let payload = report_payload(error, exit_code);
    match client.post(url).json(&payload).send().await {
        Ok(response) if response.status().is_success() => {
            tracing::debug!("Failure report delivered");
        }
        Ok(response) => {
            tracing::warn!("Failure report rejected with HTTP {}", response.status());
        }
        Err(e) => {
            tracing::warn!("Could not deliver failure report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_report_payload_shape() {
        let error = Err::<(), _>(std::io::Error::other("disk full"))
            .context("Writing stories/alice/2023-09-01 6.05am.jpg")
            .unwrap_err();
        let payload = report_payload(&error, 99);
        assert_eq!(payload["program"], env!("CARGO_PKG_NAME"));
        assert_eq!(payload["exit_code"], 99);
        assert_eq!(
            payload["message"],
            "Writing stories/alice/2023-09-01 6.05am.jpg"
        );
        // Outermost context first, root cause last.
        let chain = payload["chain"].as_array().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1], "disk full");
    }
}
