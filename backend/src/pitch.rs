use reqwest::Client;
use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use shared::models::{PitchRequest, PitchResponse};
use shared::validation::{validate_pitch_request, ValidationError};

use crate::retry::{run_with_retry, RetryError, RetryPolicy, Transient};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const SYSTEM_PROMPT: &str = "You are a theatrical and flamboyant contest announcer for a Mummy Costume competition. \
Your task is to write a short, punchy 30-second pitch script for a team. \
The script MUST include the team number and mention the collected items in an over-the-top, dramatic, or funny way, matching the requested tone. \
Use ALL CAPS and strong language suitable for a stage show.";

const SILENT_SPIRITS: &str = "Failed to generate pitch. The spirits are silent!";
const COSMIC_DISTURBANCE: &str = "A cosmic disturbance prevented the pitch generation. Check your network.";

#[derive(Debug, thiserror::Error)]
pub enum PitchError {
    #[error("Pitch generation is not configured")]
    NotConfigured,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("Possible profanity detected in items: {0}")]
    Inappropriate(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("text backend returned status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("response contained no text")]
    Empty,
}

impl Transient for PitchError {
    fn is_transient(&self) -> bool {
        match self {
            PitchError::Transport(_) => true,
            PitchError::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

impl PitchError {
    pub fn user_message(&self) -> String {
        match self {
            PitchError::Empty | PitchError::Malformed(_) => SILENT_SPIRITS.to_string(),
            PitchError::Transport(_) | PitchError::Status(_) => COSMIC_DISTURBANCE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<RetryError<PitchError>> for PitchError {
    fn from(e: RetryError<PitchError>) -> Self {
        e.into_inner()
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    system_instruction: Content<'a>,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub fn build_user_prompt(request: &PitchRequest) -> String {
    format!(
        "Generate a pitch script for Team #{}. The team's collected accessories are: {}. The required tone is: {}.",
        request.team_number,
        request.items_collected.trim(),
        request.tone.describe()
    )
}

/// Pulls `candidates[0].content.parts[0].text` out of a generateContent body.
pub fn extract_script(body: &str) -> Result<String, PitchError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| PitchError::Malformed(e.to_string()))?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(PitchError::Empty)
}

pub struct PitchGenerator {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    retry: RetryPolicy,
}

impl PitchGenerator {
    pub fn new(api_key: Option<String>, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            retry,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn generate(&self, request: &PitchRequest) -> Result<PitchResponse, PitchError> {
        validate_pitch_request(request)?;
        if request.items_collected.is_inappropriate() {
            return Err(PitchError::Inappropriate(request.items_collected.clone()));
        }
        let Some(api_key) = &self.api_key else {
            warn!("Pitch requested but GEMINI_API_KEY is not configured");
            return Err(PitchError::NotConfigured);
        };

        let prompt = build_user_prompt(request);
        let payload = GenerateRequest {
            contents: [Content { parts: [Part { text: &prompt }] }],
            system_instruction: Content { parts: [Part { text: SYSTEM_PROMPT }] },
        };
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let (client, url, payload) = (&self.client, url.as_str(), &payload);

        let body = run_with_retry(&self.retry, "generate_pitch", || async move {
            let response = client
                .post(url)
                .header("x-goog-api-key", api_key.as_str())
                .json(payload)
                .send()
                .await
                .map_err(|e| PitchError::Transport(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(PitchError::Status(status.as_u16()));
            }
            response.text().await.map_err(|e| PitchError::Transport(e.to_string()))
        })
        .await?;

        let script = extract_script(&body)?;
        debug!(team = request.team_number, chars = script.len(), "pitch generated");
        Ok(PitchResponse { team_number: request.team_number, script })
    }
}
