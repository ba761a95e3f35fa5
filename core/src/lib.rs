pub mod client;
pub mod error;
pub mod fetch;
pub mod flatten;
pub mod query;

pub use client::{HttpResponse, HttpTransport, RetryPolicy, Transport, API_ENDPOINT};
pub use error::FetchError;
pub use fetch::{Fetcher, PageResult, Patent};
pub use flatten::{flatten_patents, Table, TableMap, MISSING_RELATION_EMITS_NULL_ROW, PARENT_TABLE};
pub use query::{DateRange, QuerySpec, PER_PAGE_MAX, PROBE_PER_PAGE, RESULT_CEILING};

/// Identifier column shared by every table; appended to the field list when
/// the caller leaves it out.
pub const PATENT_KEY: &str = "patent_number";

/// Fetch every patent granted in `[startdate, enddate)` and flatten the
/// result into relational tables keyed by `patent_number`.
///
/// Dates use the `YYYY-MM-DD` format, end exclusive. `confirm` is consulted
/// before reissuing a failed request when `policy` is not automatic; have it
/// return `false` to abort.
pub fn query_to_tables<'a, T: Transport>(
    transport: &'a T,
    fields: &[&str],
    startdate: &str,
    enddate: &str,
    per_page: usize,
    policy: RetryPolicy,
    confirm: impl FnMut(u16, &str) -> bool + 'a,
) -> Result<TableMap, FetchError> {
    let range = DateRange::parse(startdate, enddate)?;
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    let spec = QuerySpec::new(fields, range, per_page)?;
    let mut fetcher = Fetcher::new(transport, policy).with_confirm(confirm);
    let patents = fetcher.fetch_all(&spec)?;
    Ok(flatten_patents(&patents, spec.fields()))
}
