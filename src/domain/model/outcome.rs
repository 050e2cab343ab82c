//! Per-item outcomes and batch status aggregation.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum RequestStatus {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "UPDATED")]
    Updated,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "NOT FOUND")]
    NotFound,
    #[serde(rename = "BAD REQUEST")]
    BadRequest,
    #[serde(rename = "SERVER ERROR")]
    ServerError,
    #[serde(rename = "DELETED")]
    Deleted,
}

impl RequestStatus {
    /// Status code reported inside the outcome for this request status.
    pub fn status_code(&self) -> u16 {
        match self {
            RequestStatus::Created => 201,
            RequestStatus::Updated | RequestStatus::Success | RequestStatus::Deleted => 200,
            RequestStatus::NotFound => 404,
            RequestStatus::BadRequest => 400,
            RequestStatus::ServerError => 500,
        }
    }
}

/// Whether an item counts towards the accepted or rejected side of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Accepted,
    Rejected,
}

/// A single field-level error, as reported to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error: error.into(),
        }
    }
}

/// The unit returned per input item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct OutcomeRecord {
    pub identifier: String,
    pub request_status: RequestStatus,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
}

impl OutcomeRecord {
    pub fn new(identifier: impl Into<String>, request_status: RequestStatus) -> Self {
        Self {
            identifier: identifier.into(),
            request_status,
            status_code: request_status.status_code(),
            message: None,
            data: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    /// `BAD REQUEST` carrying field errors as its data.
    pub fn bad_request(identifier: impl Into<String>, errors: &[FieldError]) -> Self {
        OutcomeRecord::new(identifier, RequestStatus::BadRequest)
            .with_data(serde_json::to_value(errors).unwrap_or(JsonValue::Null))
    }
}

/// Aggregate HTTP status for a batch given which sides saw at least one item.
pub fn aggregate_status(any_accepted: bool, any_rejected: bool) -> u16 {
    match (any_accepted, any_rejected) {
        (true, false) => 200,
        (true, true) => 207,
        (false, _) => 400,
    }
}

/// Ordered per-item outcomes plus the aggregate status.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub outcomes: Vec<OutcomeRecord>,
    accepted: usize,
    rejected: usize,
}

impl BatchResult {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(n),
            accepted: 0,
            rejected: 0,
        }
    }

    pub fn push(&mut self, outcome: OutcomeRecord, classification: Classification) {
        match classification {
            Classification::Accepted => self.accepted += 1,
            Classification::Rejected => self.rejected += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn status(&self) -> u16 {
        aggregate_status(self.accepted > 0, self.rejected > 0)
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aggregate_status_table() {
        assert_eq!(aggregate_status(false, false), 400);
        assert_eq!(aggregate_status(false, true), 400);
        assert_eq!(aggregate_status(true, true), 207);
        assert_eq!(aggregate_status(true, false), 200);
    }

    #[test]
    fn batch_status_is_multi_status_only_when_mixed() {
        let mut batch = BatchResult::default();
        assert_eq!(batch.status(), 400);

        batch.push(OutcomeRecord::new("A", RequestStatus::Created), Classification::Accepted);
        assert_eq!(batch.status(), 200);

        batch.push(OutcomeRecord::new("B", RequestStatus::BadRequest), Classification::Rejected);
        assert_eq!(batch.status(), 207);
        assert_eq!(batch.accepted_count(), 1);
    }

    #[test]
    fn wire_shape() {
        let outcome = OutcomeRecord::new("F1", RequestStatus::NotFound).with_message("family F1 not found.");
        let wire = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            wire,
            json!({
                "identifier": "F1",
                "request_status": "NOT FOUND",
                "status_code": 404,
                "message": "family F1 not found."
            })
        );

        let errors = vec![FieldError::new("Consanguinity", "\"\" is not one of [\"Present\"]")];
        let wire = serde_json::to_value(OutcomeRecord::bad_request("F2", &errors)).unwrap();
        assert_eq!(wire["request_status"], "BAD REQUEST");
        assert_eq!(wire["status_code"], 400);
        assert_eq!(wire["data"][0]["field"], "Consanguinity");
        assert!(wire.get("message").is_none());
    }
}
