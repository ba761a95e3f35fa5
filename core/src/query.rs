use crate::error::FetchError;
use crate::PATENT_KEY;
use serde_json::{json, Value};
use time::macros::format_description;
use time::Date;

/// Server-imposed maximum page size.
pub const PER_PAGE_MAX: usize = 10_000;

/// Ceiling on the total match count one query may page through. The API has
/// a practical limit on pages serviceable per logical query, so a query this
/// wide fails fast instead of looping near-indefinitely.
pub const RESULT_CEILING: u64 = 100_000;

/// Page size of the count probe; its records are discarded.
pub const PROBE_PER_PAGE: usize = 25;

fn parse_date(value: &str) -> Result<Date, FetchError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(value, format).map_err(|_| FetchError::InvalidDate { value: value.to_string() })
}

/// Half-open grant-date window: `start` inclusive, `end` exclusive.
///
/// The strings are validated as calendar dates on construction and sent to
/// the server verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    start: String,
    end: String,
}

impl DateRange {
    pub fn parse(start: &str, end: &str) -> Result<Self, FetchError> {
        let first = parse_date(start)?;
        let last = parse_date(end)?;
        if first >= last {
            return Err(FetchError::InvalidQuery(format!(
                "start date {start} is not before end date {end}"
            )));
        }
        Ok(Self {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }
}

/// One fully-specified fetch: which fields, which window, how many per page.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    fields: Vec<String>,
    range: DateRange,
    per_page: usize,
}

impl QuerySpec {
    /// `patent_number` is appended when missing; every output table is keyed
    /// by it.
    pub fn new(mut fields: Vec<String>, range: DateRange, per_page: usize) -> Result<Self, FetchError> {
        if per_page == 0 || per_page > PER_PAGE_MAX {
            return Err(FetchError::InvalidQuery(format!(
                "per_page must be between 1 and {PER_PAGE_MAX}, got {per_page}"
            )));
        }
        if !fields.iter().any(|f| f == PATENT_KEY) {
            fields.push(PATENT_KEY.to_string());
        }
        Ok(Self { fields, range, per_page })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    /// Request body for one page of this query.
    pub fn payload(&self, page: usize) -> Value {
        json!({
            "q": { "_and": [
                { "_gte": { "patent_date": self.range.start() } },
                { "_lt": { "patent_date": self.range.end() } },
            ]},
            "f": self.fields,
            "o": { "page": page, "per_page": self.per_page },
        })
    }

    /// Minimal variant used to learn the total match count cheaply.
    pub(crate) fn probe(&self) -> QuerySpec {
        QuerySpec {
            fields: vec![PATENT_KEY.to_string()],
            range: self.range.clone(),
            per_page: PROBE_PER_PAGE,
        }
    }
}
