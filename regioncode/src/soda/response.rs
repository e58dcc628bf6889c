use serde_json::Value;

use crate::cache::RegionCacheError;

/// Outcome of a remote dataset query.
#[derive(Debug, Clone, PartialEq)]
pub enum SodaResult {
    /// The backend answered; the body is `None` when it was not
    /// parseable JSON
    Response { status: u16, body: Option<Value> },
    /// The request never produced an HTTP response
    Failed(RegionCacheError),
}

/// Validates a query outcome against the status the caller expects.
///
/// - a transport failure propagates verbatim;
/// - the expected status with a JSON body yields that body;
/// - the expected status without a body is a JSON parse failure;
/// - any other status is an unexpected-response-code failure.
pub fn check_response(
    result: SodaResult,
    expected_status: u16,
) -> Result<Value, RegionCacheError> {
    match result {
        SodaResult::Failed(e) => Err(e),
        SodaResult::Response { status, body } if status == expected_status => {
            body.ok_or(RegionCacheError::JsonParse)
        }
        SodaResult::Response { status, .. } => {
            Err(RegionCacheError::UnexpectedResponseCode(status))
        }
    }
}
