use serde::{Deserialize, Serialize};

/// The closed set of upstream LLM providers this sidecar fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderID {
    OpenAI,
    Anthropic,
    Copilot,
}

impl ProviderID {
    pub const ALL: [ProviderID; 3] = [ProviderID::OpenAI, ProviderID::Anthropic, ProviderID::Copilot];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderID::OpenAI => "openai",
            ProviderID::Anthropic => "anthropic",
            ProviderID::Copilot => "copilot",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "openai" => Some(ProviderID::OpenAI),
            "anthropic" => Some(ProviderID::Anthropic),
            "copilot" => Some(ProviderID::Copilot),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Alias for call sites that prefer this exact casing.
pub type ProviderId = ProviderID;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for p in ProviderID::ALL {
            assert_eq!(ProviderID::parse(p.as_str()), Some(p));
        }
    }

    #[test]
    fn unknown_provider_is_none() {
        assert_eq!(ProviderID::parse("gemini"), None);
    }
}
