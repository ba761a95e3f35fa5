use crate::client::{RetryPolicy, Transport};
use crate::error::FetchError;
use crate::query::{QuerySpec, RESULT_CEILING};
use serde::Deserialize;
use serde_json::Value;
use std::thread;
use tracing::{debug, info, warn};

/// One record as returned by the API: requested field name to value. Values
/// stay dynamic because the field list is caller-chosen.
pub type Patent = serde_json::Map<String, Value>;

/// One page of results plus the server's total match count. The count is
/// recomputed identically on every page of a stable query; only the first
/// page is actually asked for it.
#[derive(Debug)]
pub struct PageResult {
    pub total_count: u64,
    pub patents: Vec<Patent>,
}

#[derive(Deserialize)]
struct RawPage {
    total_patent_count: Option<u64>,
    #[serde(default)]
    patents: Option<Vec<Patent>>,
}

impl PageResult {
    fn from_body(body: &str) -> Result<Self, FetchError> {
        let raw: RawPage = serde_json::from_str(body)?;
        let total_count = raw
            .total_patent_count
            .ok_or_else(|| FetchError::MalformedResponse("missing `total_patent_count`".to_string()))?;
        let patents = match raw.patents {
            Some(patents) => patents,
            // The API reports an empty result set as a null `patents` list.
            None if total_count == 0 => Vec::new(),
            None => return Err(FetchError::MalformedResponse("missing `patents`".to_string())),
        };
        Ok(Self { total_count, patents })
    }
}

/// Count-driven pagination over an injected transport: probe the total,
/// then walk 1-based pages until that many records have been accumulated.
pub struct Fetcher<'a, T: Transport> {
    transport: &'a T,
    policy: RetryPolicy,
    confirm: Box<dyn FnMut(u16, &str) -> bool + 'a>,
}

impl<'a, T: Transport> Fetcher<'a, T> {
    /// Without a confirm hook an interactive policy aborts on first failure.
    pub fn new(transport: &'a T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            confirm: Box::new(|_, _| false),
        }
    }

    /// Hook consulted before reissuing a failed request when the policy is
    /// not automatic. Receives the response status and reason.
    pub fn with_confirm(mut self, confirm: impl FnMut(u16, &str) -> bool + 'a) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Total number of patents matching the date range, learned from a
    /// minimal probe query. Fails fast when the count reaches
    /// [`RESULT_CEILING`] so no page fetch is ever attempted for it.
    pub fn probe_count(&mut self, spec: &QuerySpec) -> Result<u64, FetchError> {
        let count = self.query_page(&spec.probe(), 1)?.total_count;
        debug!(count, "probe complete");
        if count >= RESULT_CEILING {
            return Err(FetchError::ResultSetTooLarge {
                count,
                ceiling: RESULT_CEILING,
            });
        }
        Ok(count)
    }

    /// All pages of `spec`, concatenated in page order then server order
    /// within each page. The final page coming back short is expected.
    pub fn fetch_all(&mut self, spec: &QuerySpec) -> Result<Vec<Patent>, FetchError> {
        info!(
            start = spec.range().start(),
            end = spec.range().end(),
            "querying"
        );
        let count = self.probe_count(spec)? as usize;
        let mut patents: Vec<Patent> = Vec::with_capacity(count);
        let mut page = 1;
        while patents.len() < count {
            let result = self.query_page(spec, page)?;
            if result.patents.is_empty() {
                // A short final page is normal; an empty page before the
                // count is reached would otherwise loop forever.
                return Err(FetchError::MalformedResponse(format!(
                    "page {page} came back empty with {} of {count} records fetched",
                    patents.len()
                )));
            }
            patents.extend(result.patents);
            debug!(page, fetched = patents.len(), total = count, "page appended");
            page += 1;
        }
        Ok(patents)
    }

    /// Exactly one page request per attempt, reissued per the retry policy
    /// until a success response terminates the loop for this page.
    pub fn query_page(&mut self, spec: &QuerySpec, page: usize) -> Result<PageResult, FetchError> {
        let payload = spec.payload(page);
        let mut attempts: u32 = 0;
        loop {
            let resp = self.transport.send(&payload)?;
            if resp.is_success() {
                return PageResult::from_body(&resp.body);
            }
            attempts += 1;
            warn!(
                status = resp.status,
                reason = %resp.reason,
                page,
                attempts,
                "page request failed"
            );
            if let Some(cap) = self.policy.max_retries {
                if attempts >= cap {
                    return Err(FetchError::RetriesExhausted { attempts });
                }
            }
            if self.policy.automatic {
                info!(delay_secs = self.policy.delay.as_secs_f64(), page, "retrying");
                thread::sleep(self.policy.delay);
            } else if !(self.confirm)(resp.status, &resp.reason) {
                return Err(FetchError::UserAborted);
            }
        }
    }
}
