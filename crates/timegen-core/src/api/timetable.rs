use std::sync::Arc;

use serde_json::json;
use timegen_types::{DataEnvelope, GenerateResult, GeneratedTimetable};

use super::{ApiError, ensure_authorized};
use crate::gateway::{ApiRequest, AuthGateway};
use crate::validation;

/// AI generation and retrieval of generated timetables.
#[derive(Debug, Clone)]
pub struct TimetableService {
    gateway: Arc<AuthGateway>,
}

impl TimetableService {
    pub fn new(gateway: Arc<AuthGateway>) -> Self {
        Self { gateway }
    }

    /// Asks the server to generate a timetable from a free-form prompt.
    pub async fn generate_with_ai(&self, prompt: &str) -> Result<GenerateResult, ApiError> {
        let prompt = validation::validate_prompt(prompt)?;
        tracing::debug!(chars = prompt.len(), "Requesting AI generation");

        let request = ApiRequest::post("timetable/generate-ai").json(json!({ "prompt": prompt }));
        let response = self.gateway.call(&request).await?;
        let response = ensure_authorized(response, "Failed to generate timetable")?;
        response.json().map_err(ApiError::Decode)
    }

    pub async fn list_generated(&self) -> Result<Vec<GeneratedTimetable>, ApiError> {
        let response = self
            .gateway
            .call(&ApiRequest::get("timetable/generated"))
            .await?;
        let response = ensure_authorized(response, "Failed to fetch timetables")?;
        let envelope: DataEnvelope<Vec<GeneratedTimetable>> =
            response.json().map_err(ApiError::Decode)?;
        Ok(envelope.data)
    }

    pub async fn get_generated(&self, id: &str) -> Result<GeneratedTimetable, ApiError> {
        let response = self
            .gateway
            .call(&ApiRequest::get(format!("timetable/generated/{}", path_segment(id))))
            .await?;
        let response = ensure_authorized(response, "Failed to fetch timetable")?;
        let envelope: DataEnvelope<GeneratedTimetable> =
            response.json().map_err(ApiError::Decode)?;
        Ok(envelope.data)
    }

    /// Server-rendered printable HTML for a stored timetable.
    pub async fn export_html(&self, id: &str) -> Result<String, ApiError> {
        let response = self
            .gateway
            .call(&ApiRequest::get(format!(
                "timetable/generated/{}/html",
                path_segment(id)
            )))
            .await?;
        let response = ensure_authorized(response, "Failed to export timetable")?;
        Ok(response.text())
    }
}

/// Keeps an id from escaping its path segment.
fn path_segment(id: &str) -> String {
    url::form_urlencoded::byte_serialize(id.trim().as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
