use crate::errors::Result;
use crate::filter::FilterSpec;
use crate::model::ServiceQuery;
use crate::ql::QueryParser;

/// Decides which filter governs a request.
///
/// An explicit non-empty `spec` wins and the query string is never parsed.
/// Otherwise a non-blank query string is handed to `parser`. With neither,
/// the result is `None`: callers must perform no search at all rather than
/// treat the request as "select everything".
pub fn resolve(query: &ServiceQuery, parser: &dyn QueryParser) -> Result<Option<FilterSpec>> {
    if let Some(spec) = query.spec.as_ref().filter(|s| !s.is_empty()) {
        return Ok(Some(spec.clone()));
    }
    if query.query.trim().is_empty() {
        return Ok(None);
    }
    parser.parse(&query.query).map(Some)
}
