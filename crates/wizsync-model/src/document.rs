//! Documents and scan progress as seen by the wizard

use crate::ids::RunId;
use serde::{Deserialize, Serialize};

/// Review decision on a discovered document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    /// Not yet reviewed
    #[default]
    Pending,
    /// Kept by the user
    Approved,
    /// Discarded by the user
    Rejected,
}

/// A document discovered for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Document identifier
    #[serde(alias = "_id")]
    pub id: String,
    /// Canonical URL
    pub url: String,
    /// Display title
    #[serde(default, alias = "titel")]
    pub title: String,
    /// Website the document was scraped from
    #[serde(default)]
    pub website_url: Option<String>,
    /// Document type (beleidsnota, verordening, ...)
    #[serde(default)]
    pub document_type: Option<String>,
    /// Publication date as reported by the source
    #[serde(default)]
    pub published_at: Option<String>,
    /// Review decision
    #[serde(default)]
    pub review_status: ReviewStatus,
}

/// Phase of a scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Queued on the server
    Pending,
    /// Scraping in progress
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped by the user
    Cancelled,
}

impl ScanStatus {
    /// Whether no further progress will be reported
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Progress report for a scan run
///
/// The push channel and the polling endpoint deliver this same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    /// Run being reported on
    pub run_id: RunId,
    /// Phase
    pub status: ScanStatus,
    /// Percentage complete, 0-100
    #[serde(default)]
    pub progress: u8,
    /// Documents found so far
    #[serde(default)]
    pub documents_found: u32,
    /// Human-readable current activity
    #[serde(default)]
    pub current_step: Option<String>,
    /// Failure description when `status` is `Failed`
    #[serde(default)]
    pub error: Option<String>,
}
