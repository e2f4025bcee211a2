//! Usage-report forwarding
//!
//! Stateless companion to the audit-log shipper: pages through a REST usage
//! report via its `nextLink` cursor and forwards every page straight to the
//! ingestion sink. No watermarks, no resume, no fan-out.

use crate::sink::EventSink;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

/// One page of the usage-report API.
#[derive(Debug, Deserialize)]
pub struct UsagePage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

/// Follow the report from `first_url` until the cursor runs out, forwarding
/// each non-empty page as one batch. Returns the total record count.
pub async fn forward_usage_report(
    client: &reqwest::Client,
    sink: &dyn EventSink,
    first_url: &str,
) -> Result<u64> {
    let mut count = 0u64;
    let mut next = Some(first_url.to_string());

    while let Some(url) = next {
        debug!(url = %url, "fetching usage report page");

        let page: UsagePage = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Usage report request failed: {url}"))?
            .error_for_status()
            .context("Usage report endpoint returned an error")?
            .json()
            .await
            .context("Usage report page is not valid JSON")?;

        if !page.data.is_empty() {
            let payload =
                serde_json::to_string(&page.data).context("Failed to serialize usage page")?;
            sink.send(payload).await?;
            count += page.data.len() as u64;
        }

        next = page.next_link.filter(|link| !link.is_empty());
    }

    info!(records = count, "usage report forwarded");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_deserializes_with_missing_fields() {
        let page: UsagePage = serde_json::from_str(r#"{"data":[{"usage":1}]}"#).unwrap();
        assert!(page.id.is_none());
        assert!(page.next_link.is_none());
        assert_eq!(page.data.len(), 1);
    }

    #[test]
    fn test_page_deserializes_next_link() {
        let page: UsagePage =
            serde_json::from_str(r#"{"id":"p1","nextLink":"http://x/2","data":[]}"#).unwrap();
        assert_eq!(page.next_link.as_deref(), Some("http://x/2"));
    }
}
