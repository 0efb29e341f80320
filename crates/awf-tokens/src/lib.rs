//! Side-channel token-usage extraction for streamed upstream responses.
//!
//! Reads usage counts out of a response body without altering what the
//! client receives: callers hand the extractor a *copy* of each chunk
//! already passed through, so a parse failure can never affect the
//! response. SSE mode splits incrementally on raw `\n` bytes with a carried
//! partial line, so a chunk boundary never corrupts a multi-byte character.

use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// Which upstream's JSON/SSE usage shape to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageShape {
    Anthropic,
    /// Shared by OpenAI and Copilot (Copilot proxies the OpenAI chat shape).
    OpenAI,
}

fn is_compressed(content_encoding: Option<&str>) -> bool {
    match content_encoding {
        Some(enc) => {
            let enc = enc.trim().to_ascii_lowercase();
            matches!(enc.as_str(), "gzip" | "br" | "deflate")
        }
        None => false,
    }
}

enum Mode {
    Skipped,
    Buffered(Vec<u8>),
    Sse(SseState),
}

pub struct TokenExtractor {
    shape: UsageShape,
    mode: Mode,
}

impl TokenExtractor {
    pub fn new(shape: UsageShape, content_type: &str, content_encoding: Option<&str>) -> Self {
        if is_compressed(content_encoding) {
            return Self { shape, mode: Mode::Skipped };
        }
        let mode = if content_type.to_ascii_lowercase().contains("text/event-stream") {
            Mode::Sse(SseState::default())
        } else {
            Mode::Buffered(Vec::new())
        };
        Self { shape, mode }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        match &mut self.mode {
            Mode::Skipped => {}
            Mode::Buffered(buf) => buf.extend_from_slice(chunk),
            Mode::Sse(state) => state.push(chunk, self.shape),
        }
    }

    pub fn finish(self) -> TokenCounts {
        match self.mode {
            Mode::Skipped => TokenCounts::default(),
            Mode::Buffered(buf) => parse_buffered(self.shape, &buf),
            Mode::Sse(state) => state.finish(self.shape),
        }
    }
}

fn parse_buffered(shape: UsageShape, buf: &[u8]) -> TokenCounts {
    let Ok(value) = serde_json::from_slice::<Value>(buf) else {
        return TokenCounts::default();
    };
    let Some(usage) = value.get("usage") else {
        return TokenCounts::default();
    };
    extract_from_usage_value(shape, usage).unwrap_or_default()
}

fn extract_from_usage_value(shape: UsageShape, usage: &Value) -> Option<TokenCounts> {
    match shape {
        UsageShape::Anthropic => {
            let input = usage.get("input_tokens").and_then(Value::as_u64)?;
            let output = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
            Some(TokenCounts {
                input,
                output,
                total: input + output,
            })
        }
        UsageShape::OpenAI => {
            let input = usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
            let output = usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0);
            let total = usage
                .get("total_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(input + output);
            Some(TokenCounts { input, output, total })
        }
    }
}

#[derive(Default)]
struct SseState {
    buffer: Vec<u8>,
    input: Option<u64>,
    output: Option<u64>,
    total: Option<u64>,
}

impl SseState {
    fn push(&mut self, chunk: &[u8], shape: UsageShape) {
        self.buffer.extend_from_slice(chunk);
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line, shape);
        }
    }

    fn process_line(&mut self, line: &[u8], shape: UsageShape) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(rest) = line.strip_prefix("data:") else {
            return;
        };
        let payload = rest.trim_start();
        if payload.is_empty() || payload == "[DONE]" {
            return;
        }
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return;
        };
        match shape {
            UsageShape::Anthropic => {
                if let Some(v) = value
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    self.input = Some(v);
                }
                if let Some(v) = value
                    .get("usage")
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(Value::as_u64)
                {
                    self.output = Some(v);
                }
            }
            UsageShape::OpenAI => {
                if let Some(usage) = value.get("usage") {
                    if let Some(v) = usage.get("prompt_tokens").and_then(Value::as_u64) {
                        self.input = Some(v);
                    }
                    if let Some(v) = usage.get("completion_tokens").and_then(Value::as_u64) {
                        self.output = Some(v);
                    }
                    if let Some(v) = usage.get("total_tokens").and_then(Value::as_u64) {
                        self.total = Some(v);
                    }
                }
            }
        }
    }

    fn finish(mut self, shape: UsageShape) -> TokenCounts {
        if !self.buffer.is_empty() {
            let remaining = std::mem::take(&mut self.buffer);
            self.process_line(&remaining, shape);
        }
        let input = self.input.unwrap_or(0);
        let output = self.output.unwrap_or(0);
        let total = self.total.unwrap_or(input + output);
        TokenCounts { input, output, total }
    }
}
