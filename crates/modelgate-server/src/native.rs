//! Typed input schema for the legacy native `POST /completion` envelope
//! (spec §6, §9 "define an explicit input schema ... and reject mismatches
//! as InvalidInput"). Unlike the OpenAI-style routes, which forward the
//! inbound body byte-exact (only `model` rewrite + strip-filter applied),
//! this endpoint's body is fully deserialized and validated before it is
//! re-encoded for the worker.

use serde::{Deserialize, Serialize};

const MAX_PROMPT_BYTES: usize = 1 << 20;
const MAX_STOP_SEQUENCES: usize = 16;
const MAX_STOP_SEQUENCE_BYTES: usize = 256;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sampler {
    Greedy,
    TopK,
    TopP,
    Typical,
    MinP,
    Mirostat,
    MirostatV2,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeCompletionRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_n_predict")]
    pub n_predict: i32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: i32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub samplers: Vec<Sampler>,
    #[serde(default)]
    pub grammar: Option<String>,
}

fn default_n_predict() -> i32 {
    -1
}
fn default_temperature() -> f32 {
    0.8
}
fn default_top_p() -> f32 {
    0.95
}
fn default_top_k() -> i32 {
    40
}
fn default_repeat_penalty() -> f32 {
    1.1
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("prompt exceeds the maximum size of {MAX_PROMPT_BYTES} bytes")]
    PromptTooLarge,
    #[error("at most {MAX_STOP_SEQUENCES} stop sequences are permitted")]
    TooManyStopSequences,
    #[error("a stop sequence exceeds the maximum size of {MAX_STOP_SEQUENCE_BYTES} bytes")]
    StopSequenceTooLarge,
    #[error("temperature must be within [0.0, 2.0]")]
    TemperatureOutOfRange,
    #[error("top_p must be within [0.0, 1.0]")]
    TopPOutOfRange,
    #[error("n_predict must be -1 (unbounded) or non-negative")]
    NPredictOutOfRange,
}

impl NativeCompletionRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.len() > MAX_PROMPT_BYTES {
            return Err(ValidationError::PromptTooLarge);
        }
        if self.stop.len() > MAX_STOP_SEQUENCES {
            return Err(ValidationError::TooManyStopSequences);
        }
        if self.stop.iter().any(|s| s.len() > MAX_STOP_SEQUENCE_BYTES) {
            return Err(ValidationError::StopSequenceTooLarge);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::TemperatureOutOfRange);
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ValidationError::TopPOutOfRange);
        }
        if self.n_predict < -1 {
            return Err(ValidationError::NPredictOutOfRange);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_a_minimal_body() {
        let req: NativeCompletionRequest = serde_json::from_str(r#"{"prompt":"hi"}"#).unwrap();
        assert_eq!(req.n_predict, -1);
        assert_eq!(req.top_k, 40);
        req.validate().unwrap();
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let req: NativeCompletionRequest =
            serde_json::from_str(r#"{"prompt":"hi","temperature":9.0}"#).unwrap();
        assert!(matches!(req.validate(), Err(ValidationError::TemperatureOutOfRange)));
    }

    #[test]
    fn too_many_stop_sequences_is_rejected() {
        let stops: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        let body = serde_json::json!({"prompt": "hi", "stop": stops});
        let req: NativeCompletionRequest = serde_json::from_value(body).unwrap();
        assert!(matches!(req.validate(), Err(ValidationError::TooManyStopSequences)));
    }

    #[test]
    fn malformed_body_fails_to_deserialize() {
        let err = serde_json::from_str::<NativeCompletionRequest>(r#"{"n_predict": "not a number"}"#);
        assert!(err.is_err());
    }
}
