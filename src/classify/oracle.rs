//! Severity oracle: provider abstraction + concrete adapters.
//!
//! * `OpenAiOracle`: OpenAI-compatible Chat Completions.
//! * `GeminiOracle`: Google Gemini `generateContent`.
//! * `MockOracle`: deterministic keyword rules, for tests and local runs.
//! * `DisabledOracle`: always fails; the worker skips scheduling when it is active.
//!
//! Every adapter returns the model text to `parse_verdict`, which extracts the JSON
//! object `{severity, reasoning}` (optionally wrapped in markdown fences).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::store::Severity;

/// Label produced by an oracle. `severity` is never `Unclassified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub severity: Severity,
    pub reason: String,
}

pub type OracleFuture<'a> = Pin<Box<dyn Future<Output = Result<Classification>> + Send + 'a>>;

pub trait SeverityOracle: Send + Sync {
    fn classify<'a>(&'a self, title: &'a str, summary: &'a str) -> OracleFuture<'a>;
    /// Provider name for logs and status.
    fn name(&self) -> &'static str;
    /// `false` means calls can never succeed, so nothing should be scheduled.
    fn enabled(&self) -> bool {
        true
    }
}

pub type DynOracle = Arc<dyn SeverityOracle>;

const REASON_MAX_CHARS: usize = 150;

const USER_AGENT: &str = "secnews-aggregator/0.1";

/// Factory: build an oracle according to config and environment.
///
/// * `AI_TEST_MODE=mock` forces the mock oracle.
/// * `openai` / `gemini` without a resolvable key degrade to disabled (logged).
/// * Unknown providers are a configuration error.
pub fn build_oracle(cfg: &ClassifierConfig) -> Result<DynOracle> {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Arc::new(MockOracle));
    }

    match cfg.provider.as_str() {
        "disabled" | "none" | "" => Ok(Arc::new(DisabledOracle)),
        "mock" => Ok(Arc::new(MockOracle)),
        "openai" | "gemini" => {
            let Some(key) = cfg.resolve_api_key() else {
                tracing::warn!(
                    target: "classify",
                    provider = %cfg.provider,
                    "no API key configured; classification disabled"
                );
                return Ok(Arc::new(DisabledOracle));
            };
            if cfg.provider == "openai" {
                Ok(Arc::new(OpenAiOracle::new(
                    key,
                    cfg.model.as_deref(),
                    cfg.base_url.as_deref(),
                    cfg.call_timeout(),
                )?))
            } else {
                Ok(Arc::new(GeminiOracle::new(
                    key,
                    cfg.model.as_deref(),
                    cfg.base_url.as_deref(),
                    cfg.call_timeout(),
                )?))
            }
        }
        other => bail!("unsupported classifier provider `{other}`"),
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .timeout(timeout)
        .build()
        .context("building oracle HTTP client")
}

/// Prompt shared by the remote adapters.
pub fn build_prompt(title: &str, summary: &str) -> String {
    format!(
        r#"You are a cybersecurity expert. Analyze the following cybersecurity news article and classify its severity level based on industry standards.

Article Title: {title}
Article Description: {summary}

Classification criteria:
- HIGH: Critical vulnerabilities, active exploits, widespread attacks, data breaches affecting many users, zero-day vulnerabilities, ransomware campaigns, nation-state attacks
- MEDIUM: Important security updates, newly discovered vulnerabilities (not yet exploited), significant security incidents, emerging threats, security tool releases
- LOW: General security news, minor updates, educational content, security tips, company announcements, minor patches

Provide your response in the following JSON format only (no additional text):
{{
    "severity": "HIGH" or "MEDIUM" or "LOW",
    "reasoning": "Brief explanation (max 100 characters) why this classification was chosen"
}}"#
    )
}

// ------------------------------------------------------------
// Response parsing
// ------------------------------------------------------------

/// Pull a JSON object out of model text: ```json fences, bare fences, then `{..}`.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&text[start..=end]),
        _ => None,
    }
}

#[derive(Deserialize)]
struct Verdict {
    severity: Option<String>,
    reasoning: Option<String>,
}

/// Parse model output into a label. Unknown severity words map to MEDIUM;
/// missing fields or invalid JSON are errors.
pub fn parse_verdict(text: &str) -> Result<Classification> {
    let json = extract_json(text).ok_or_else(|| anyhow!("no JSON object in oracle response"))?;
    let v: Verdict = serde_json::from_str(json).context("invalid JSON in oracle response")?;
    let (Some(severity), Some(reasoning)) = (v.severity, v.reasoning) else {
        bail!("oracle response misses `severity` or `reasoning`");
    };
    let severity = match severity.parse::<Severity>() {
        Ok(s) if s.is_classified() => s,
        _ => Severity::Medium,
    };
    let reason = sanitize_reason(&reasoning);
    if reason.is_empty() {
        bail!("oracle returned an empty reasoning");
    }
    Ok(Classification { severity, reason })
}

/// Single line, control characters removed, whitespace collapsed, at most 150 chars.
pub fn sanitize_reason(input: &str) -> String {
    let mut out = String::with_capacity(REASON_MAX_CHARS);
    let mut prev_space = false;
    let mut n = 0;
    for ch in input.chars() {
        let c = if ch.is_whitespace() || ch.is_control() {
            ' '
        } else {
            ch
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
                n += 1;
            }
            prev_space = true;
        } else {
            out.push(c);
            n += 1;
            prev_space = false;
        }
        if n >= REASON_MAX_CHARS {
            break;
        }
    }
    out.trim().to_string()
}

// ------------------------------------------------------------
// OpenAI-compatible
// ------------------------------------------------------------

pub struct OpenAiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiOracle {
    pub fn new(
        api_key: String,
        model: Option<&str>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            api_key,
            model: model.unwrap_or("gpt-4o-mini").to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl SeverityOracle for OpenAiOracle {
    fn classify<'a>(&'a self, title: &'a str, summary: &'a str) -> OracleFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let prompt = build_prompt(title, summary);
            let req = Req {
                model: &self.model,
                messages: vec![Msg {
                    role: "user",
                    content: &prompt,
                }],
                temperature: 0.0,
                max_tokens: 150,
            };

            let resp = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .context("openai request failed")?;
            let status = resp.status();
            if !status.is_success() {
                bail!("openai returned http status {status}");
            }
            let body: Resp = resp.json().await.context("openai response body")?;
            let content = body
                .choices
                .first()
                .map(|c| c.message.content.as_str())
                .ok_or_else(|| anyhow!("openai response has no choices"))?;
            parse_verdict(content)
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Gemini
// ------------------------------------------------------------

pub struct GeminiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiOracle {
    pub fn new(
        api_key: String,
        model: Option<&str>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            api_key,
            model: model.unwrap_or("gemini-2.5-flash").to_string(),
            base_url: base_url
                .unwrap_or("https://generativelanguage.googleapis.com/v1beta")
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl SeverityOracle for GeminiOracle {
    fn classify<'a>(&'a self, title: &'a str, summary: &'a str) -> OracleFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Part<'a> {
                text: &'a str,
            }
            #[derive(Serialize)]
            struct Content<'a> {
                parts: Vec<Part<'a>>,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                contents: Vec<Content<'a>>,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                candidates: Vec<Candidate>,
            }
            #[derive(Deserialize)]
            struct Candidate {
                content: CandidateContent,
            }
            #[derive(Deserialize)]
            struct CandidateContent {
                #[serde(default)]
                parts: Vec<CandidatePart>,
            }
            #[derive(Deserialize)]
            struct CandidatePart {
                #[serde(default)]
                text: String,
            }

            let prompt = build_prompt(title, summary);
            let req = Req {
                contents: vec![Content {
                    parts: vec![Part { text: &prompt }],
                }],
            };

            let model = self.model.trim_start_matches("models/");
            let resp = self
                .http
                .post(format!("{}/models/{model}:generateContent", self.base_url))
                .header("x-goog-api-key", &self.api_key)
                .json(&req)
                .send()
                .await
                .context("gemini request failed")?;
            let status = resp.status();
            if !status.is_success() {
                bail!("gemini returned http status {status}");
            }
            let body: Resp = resp.json().await.context("gemini response body")?;
            let text: String = body
                .candidates
                .first()
                .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect())
                .ok_or_else(|| anyhow!("gemini response has no candidates"))?;
            parse_verdict(&text)
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// Mock + disabled
// ------------------------------------------------------------

/// Keyword rules over the title and summary. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockOracle;

impl MockOracle {
    pub fn label(title: &str, summary: &str) -> Classification {
        const HIGH: &[&str] = &[
            "zero-day",
            "0-day",
            "ransomware",
            "actively exploited",
            "breach",
            "nation-state",
        ];
        const LOW: &[&str] = &["tips", "how to", "webinar", "announces", "guide"];

        let text = format!("{title} {summary}").to_lowercase();
        let (severity, reason) = if let Some(k) = HIGH.iter().find(|k| text.contains(*k)) {
            (Severity::High, format!("mock: mentions {k}"))
        } else if let Some(k) = LOW.iter().find(|k| text.contains(*k)) {
            (Severity::Low, format!("mock: mentions {k}"))
        } else {
            (Severity::Medium, "mock: no strong signal".to_string())
        };
        Classification { severity, reason }
    }
}

impl SeverityOracle for MockOracle {
    fn classify<'a>(&'a self, title: &'a str, summary: &'a str) -> OracleFuture<'a> {
        let out = Self::label(title, summary);
        Box::pin(async move { Ok(out) })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOracle;

impl SeverityOracle for DisabledOracle {
    fn classify<'a>(&'a self, _title: &'a str, _summary: &'a str) -> OracleFuture<'a> {
        Box::pin(async { Err(anyhow!("classification is disabled")) })
    }

    fn name(&self) -> &'static str {
        "disabled"
    }

    fn enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_in_fences_parses() {
        let text = "Sure!\n```json\n{\"severity\": \"high\", \"reasoning\": \"Active\\nexploitation\"}\n```";
        let c = parse_verdict(text).unwrap();
        assert_eq!(c.severity, Severity::High);
        assert_eq!(c.reason, "Active exploitation");
    }

    #[test]
    fn unknown_label_maps_to_medium() {
        let c = parse_verdict(r#"{"severity": "CRITICAL", "reasoning": "bad"}"#).unwrap();
        assert_eq!(c.severity, Severity::Medium);
        let c = parse_verdict(r#"{"severity": "unclassified", "reasoning": "x"}"#).unwrap();
        assert_eq!(c.severity, Severity::Medium);
    }

    #[test]
    fn missing_fields_or_garbage_fail() {
        assert!(parse_verdict(r#"{"severity": "LOW"}"#).is_err());
        assert!(parse_verdict("no json here").is_err());
        assert!(parse_verdict("{not json}").is_err());
    }

    #[test]
    fn reason_is_capped_and_single_line() {
        let long = format!("line one\n\tline two {}", "x".repeat(400));
        let r = sanitize_reason(&long);
        assert!(r.chars().count() <= REASON_MAX_CHARS);
        assert!(r.starts_with("line one line two"));
        assert!(!r.contains('\n'));
    }

    #[test]
    fn mock_oracle_is_deterministic() {
        let a = MockOracle::label("Ransomware hits hospital", "");
        assert_eq!(a.severity, Severity::High);
        assert_eq!(a, MockOracle::label("Ransomware hits hospital", ""));
        assert_eq!(MockOracle::label("Five tips for MFA", "").severity, Severity::Low);
        assert_eq!(MockOracle::label("Chrome update", "").severity, Severity::Medium);
    }
}
