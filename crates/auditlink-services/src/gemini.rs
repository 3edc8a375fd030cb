//! Generative analysis client.
//!
//! Three prompts share one `generateContent` endpoint: contract generation
//! (free text), security audit (structured JSON) and plain-language
//! explanation.

use std::sync::LazyLock;

use auditlink_core::config::GeminiConfig;
use auditlink_core::{AuditResult, Issue};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const CODE_GENERATION_PROMPT: &str = "You are an expert Solidity smart contract developer. Your task is to generate clean, secure, and well-documented Solidity code based on user requirements.

IMPORTANT INSTRUCTIONS:
1. Return ONLY the Solidity code - no explanations, no markdown formatting, no JSON structure
2. Include proper SPDX license identifier and pragma statements
3. Focus on security and gas optimization
4. Use modern Solidity syntax (0.8.x)
5. Include proper error handling and access controls

Generate clean, pure Solidity code without extra explanations:";

const CODE_AUDIT_PROMPT: &str = r#"You are an expert Solidity smart contract security auditor. Audit the given Solidity code and provide a comprehensive security analysis.

IMPORTANT INSTRUCTIONS:
1. Analyze the code for common vulnerabilities including reentrancy, access control issues, integer overflow/underflow, unsafe delegatecall, timestamp dependence, oracle manipulation, and gas optimization opportunities.
2. Provide a summary of the contract's purpose and the overall security posture.
3. List all identified issues with a severity level ('low', 'medium', 'high', 'critical').
4. Provide actionable recommendations to fix the identified issues.
5. List any gas optimization opportunities.
6. Return ONLY a raw JSON object with the following structure. Do NOT wrap it in markdown.

JSON Structure:
{
  "issues": [{ "type": string, "severity": "low" | "medium" | "high" | "critical", "description": string, "lineNumber": number? }],
  "recommendations": string[],
  "gasOptimization": string[],
  "summary": string
}

Now, audit the following Solidity code:"#;

const CONTRACT_EXPLANATION_PROMPT: &str = "You are an expert Solidity smart contract developer and technical writer. Given the following Solidity code, explain in 3-4 concise, clear sentences what this contract does, its main features, and its purpose. Do not include code, markdown, or extra formatting, just a plain, human-readable explanation for a non-technical user.";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Generated code is never scored above this.
pub const GENERATED_SCORE_CAP: u8 = 95;

static FENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*\r?\n?").expect("static regex is valid")
});

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("Generative AI API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Generative AI returned no candidates")]
    EmptyCandidates,

    /// The structured audit response is not the expected JSON.
    #[error("Malformed audit response: {0}")]
    MalformedAudit(String),

    #[error("Nothing to analyze: input is empty")]
    EmptyInput,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for GeminiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
    safety_settings: [SafetySetting; 4],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

impl GenerationConfig {
    const CODE: Self = Self {
        temperature: 0.2,
        top_k: 1,
        top_p: 0.8,
        max_output_tokens: 8192,
    };
    const AUDIT: Self = Self {
        temperature: 0.1,
        top_k: 1,
        top_p: 1.0,
        max_output_tokens: 8192,
    };
    const EXPLANATION: Self = Self {
        temperature: 0.2,
        top_k: 1,
        top_p: 0.8,
        max_output_tokens: 512,
    };
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

const fn safety_settings() -> [SafetySetting; 4] {
    const THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";
    [
        SafetySetting {
            category: "HARM_CATEGORY_HARASSMENT",
            threshold: THRESHOLD,
        },
        SafetySetting {
            category: "HARM_CATEGORY_HATE_SPEECH",
            threshold: THRESHOLD,
        },
        SafetySetting {
            category: "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            threshold: THRESHOLD,
        },
        SafetySetting {
            category: "HARM_CATEGORY_DANGEROUS_CONTENT",
            threshold: THRESHOLD,
        },
    ]
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Structured audit as the model returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAudit {
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    gas_optimization: Option<Vec<String>>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    contract_type: Option<String>,
    #[serde(default)]
    security_analysis: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContract {
    pub code: String,
    pub score: u8,
}

#[derive(Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, GeminiError> {
        if config.endpoint.trim().is_empty() {
            return Err(GeminiError::Config("gemini.endpoint is empty".into()));
        }
        if config.api_key.is_empty() {
            return Err(GeminiError::Config("gemini.api_key is empty".into()));
        }

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim().to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Send one prompt and return the first candidate's text.
    async fn generate(&self, prompt: &str, config: GenerationConfig) -> Result<String, GeminiError> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: config,
            safety_settings: safety_settings(),
        };
        debug!(prompt_bytes = prompt.len(), "Calling generative AI endpoint");

        let resp = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let data: GenerateResponse = resp.json().await?;
        data.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or(GeminiError::EmptyCandidates)
    }

    /// Generate a contract from a natural-language request.
    pub async fn generate_contract(&self, request: &str) -> Result<GeneratedContract, GeminiError> {
        if request.trim().is_empty() {
            return Err(GeminiError::EmptyInput);
        }
        let prompt = format!("{CODE_GENERATION_PROMPT}\n\nUser Request: {request}");
        let text = self.generate(&prompt, GenerationConfig::CODE).await?;
        let code = strip_code_fences(&text);
        let score = heuristic_score(&code);
        info!(score, lines = code.lines().count(), "Contract generated");
        Ok(GeneratedContract { code, score })
    }

    /// Direct audit of raw source. The score derives from the returned issues.
    pub async fn audit_code(&self, code: &str) -> Result<AuditResult, GeminiError> {
        if code.trim().is_empty() {
            return Err(GeminiError::EmptyInput);
        }
        let prompt = format!("{CODE_AUDIT_PROMPT}\n\n{code}");
        let text = self.generate(&prompt, GenerationConfig::AUDIT).await?;
        let result = parse_audit(&text)?;
        info!(
            score = result.score,
            issues = result.issues.len(),
            "Direct audit completed"
        );
        Ok(result)
    }

    /// Short plain-language explanation of what a contract does.
    pub async fn explain_contract(&self, code: &str) -> Result<String, GeminiError> {
        if code.trim().is_empty() {
            return Err(GeminiError::EmptyInput);
        }
        let prompt = format!("{CONTRACT_EXPLANATION_PROMPT}\n\n{code}");
        let text = self.generate(&prompt, GenerationConfig::EXPLANATION).await?;
        Ok(text.trim().to_string())
    }
}

/// Drop markdown fence lines (```` ```lang ```` and ```` ``` ````).
pub fn strip_code_fences(text: &str) -> String {
    FENCE_LINE.replace_all(text.trim(), "").trim().to_string()
}

/// Parse a structured audit response into a scored result.
///
/// Unknown severities and non-JSON bodies are errors, never an empty audit.
pub fn parse_audit(text: &str) -> Result<AuditResult, GeminiError> {
    let json = strip_code_fences(text);
    let raw: RawAudit =
        serde_json::from_str(&json).map_err(|e| GeminiError::MalformedAudit(e.to_string()))?;
    let mut result = AuditResult::from_findings(
        raw.issues,
        raw.recommendations,
        raw.gas_optimization,
        raw.summary,
    );
    result.contract_type = raw.contract_type;
    result.security_analysis = raw.security_analysis;
    Ok(result)
}

/// Rough security score for generated code, from the safeguards it mentions.
pub fn heuristic_score(code: &str) -> u8 {
    let has = |needles: &[&str]| needles.iter().any(|n| code.contains(n));
    let mut score: u8 = 75;
    if has(&["modifier"]) {
        score += 5;
    }
    if has(&["owner", "Ownable"]) {
        score += 5;
    }
    if has(&["ReentrancyGuard", "nonReentrant"]) {
        score += 8;
    }
    if has(&["AccessControl", "onlyOwner"]) {
        score += 5;
    }
    if has(&["SafeMath", "unchecked"]) {
        score += 2;
    }
    if code.lines().count() > 50 {
        score += 3;
    }
    score.min(GENERATED_SCORE_CAP)
}

#[cfg(test)]
#[path = "gemini_tests.rs"]
mod tests;
