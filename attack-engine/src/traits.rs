//! Core traits for the attack engine

use crate::{AttackResultData, DispatchError, HttpRequestData, HttpResponseData};
use async_trait::async_trait;
use std::collections::HashMap;

/// Outbound HTTP client used by the repeater and the intruder
///
/// Implementations perform exactly one attempt per call.
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    /// Send a request and wait for the complete response
    async fn dispatch(&self, request: HttpRequestData) -> Result<HttpResponseData, DispatchError>;
}

/// Statistics for attack results
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AttackStatistics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
    pub min_response_time_ms: u64,
    pub max_response_time_ms: u64,
    pub status_code_distribution: HashMap<u16, u64>,
}

impl Default for AttackStatistics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            average_response_time_ms: 0.0,
            min_response_time_ms: 0,
            max_response_time_ms: 0,
            status_code_distribution: HashMap::new(),
        }
    }
}

impl AttackStatistics {
    /// Aggregate a result list
    ///
    /// `failed_requests` counts transport/parse errors only; non-2xx responses
    /// are neither successful nor failed.
    pub fn from_results(results: &[AttackResultData]) -> Self {
        let mut stats = Self::default();
        if results.is_empty() {
            return stats;
        }

        let mut total_elapsed = 0u64;
        stats.min_response_time_ms = u64::MAX;

        for result in results {
            stats.total_requests += 1;
            total_elapsed += result.elapsed_ms;
            stats.min_response_time_ms = stats.min_response_time_ms.min(result.elapsed_ms);
            stats.max_response_time_ms = stats.max_response_time_ms.max(result.elapsed_ms);

            match result.status_code() {
                Some(code) => {
                    *stats.status_code_distribution.entry(code).or_insert(0) += 1;
                    if result.is_success() {
                        stats.successful_requests += 1;
                    }
                }
                None => stats.failed_requests += 1,
            }
        }

        stats.average_response_time_ms = total_elapsed as f64 / stats.total_requests as f64;
        stats
    }

    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.successful_requests as f64 / self.total_requests as f64) * 100.0
        }
    }

    /// Get the most common status code
    pub fn most_common_status_code(&self) -> Option<u16> {
        self.status_code_distribution
            .iter()
            .max_by_key(|(code, count)| (**count, std::cmp::Reverse(**code)))
            .map(|(code, _)| *code)
    }
}
