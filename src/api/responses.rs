use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    checker::FreshnessChecker,
    models::{
        references::{FoodClass, ReferenceState},
        verdict::Verdict,
    },
    state::{Activity, ModelStatus},
};

#[derive(Serialize)]
pub(crate) struct ApiResponse<T: Serialize> {
    pub(crate) success: bool,
    pub(crate) data: Option<T>,
    pub(crate) error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

// Implement IntoResponse for ApiResponse
impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = if self.success {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };

        let body = json!({
            "success": self.success,
            "data": self.data,
            "error": self.error,
        });

        (status, Json(body)).into_response()
    }
}

/// What a client sees of one session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionSnapshot {
    pub(crate) id: Uuid,
    pub(crate) message: String,
    pub(crate) model: ModelStatus,
    pub(crate) busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) fresh_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rotten_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) references: Option<ReferenceState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) verdict: Option<VerdictView>,
}

impl SessionSnapshot {
    pub(crate) fn new(id: Uuid, checker: &FreshnessChecker, model: ModelStatus) -> Self {
        let references = checker.references();
        Self {
            id,
            message: checker.message().to_string(),
            model,
            busy: false,
            fresh_count: Some(references.len(FoodClass::Fresh)),
            rotten_count: Some(references.len(FoodClass::Rotten)),
            references: Some(references.state()),
            verdict: checker.last_verdict().cloned().map(VerdictView::from),
        }
    }

    /// Snapshot of a session whose lock is held by a running operation.
    pub(crate) fn busy(id: Uuid, activity: Activity, model: ModelStatus) -> Self {
        Self {
            id,
            message: activity.message().to_string(),
            model,
            busy: true,
            fresh_count: None,
            rotten_count: None,
            references: None,
            verdict: None,
        }
    }
}

/// A verdict plus its display strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerdictView {
    #[serde(flatten)]
    pub(crate) verdict: Verdict,
    pub(crate) label: &'static str,
    pub(crate) headline: &'static str,
    pub(crate) confidence_percent: String,
}

impl From<Verdict> for VerdictView {
    fn from(verdict: Verdict) -> Self {
        Self {
            label: verdict.label(),
            headline: verdict.headline(),
            confidence_percent: verdict.confidence_percent(),
            verdict,
        }
    }
}

/// Body of the health endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct HealthReport {
    pub(crate) status: &'static str,
    pub(crate) version: &'static str,
    pub(crate) built: &'static str,
    pub(crate) model: ModelStatus,
    pub(crate) sessions: usize,
    pub(crate) tip: &'static str,
}
