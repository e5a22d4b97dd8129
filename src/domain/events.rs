//! Job status events and their text framing.

use crate::domain::jobs::JobResult;
use serde::Serialize;

pub const EVENT_NAME: &str = "status";
pub const SUCCESS_ID: i64 = 0;
pub const FAILURE_ID: i64 = -1;

pub const SUCCESS_MESSAGE: &str = "Processing completed";
pub const FAILURE_MESSAGE: &str = "Error";

#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// `id` starts at 1 and strictly increases within a job.
    Progress { id: u64, message: String },
    Success(JobResult),
    Failure(String),
}

/// JSON carried in the `data` field.
#[derive(Debug, Serialize)]
pub struct StatusPayload<'a> {
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl StatusEvent {
    pub fn id(&self) -> i64 {
        match self {
            StatusEvent::Progress { id, .. } => *id as i64,
            StatusEvent::Success(_) => SUCCESS_ID,
            StatusEvent::Failure(_) => FAILURE_ID,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusEvent::Progress { .. })
    }

    pub fn payload(&self) -> StatusPayload<'_> {
        match self {
            StatusEvent::Progress { message, .. } => StatusPayload {
                message,
                url: None,
                error: None,
            },
            StatusEvent::Success(result) => StatusPayload {
                message: SUCCESS_MESSAGE,
                url: Some(result),
                error: None,
            },
            StatusEvent::Failure(error) => StatusPayload {
                message: FAILURE_MESSAGE,
                url: None,
                error: Some(error),
            },
        }
    }

    pub fn data(&self) -> String {
        serde_json::to_string(&self.payload()).unwrap_or_else(|e| {
            format!(r#"{{"message":"{}","error":"serialization failed: {}"}}"#, FAILURE_MESSAGE, e)
        })
    }

    /// `id:<int>\nevent:status\ndata:<json>\n\n`
    pub fn encode(&self) -> String {
        format!("id:{}\nevent:{}\ndata:{}\n\n", self.id(), EVENT_NAME, self.data())
    }
}
