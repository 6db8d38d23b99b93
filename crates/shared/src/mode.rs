//! Chat modes and the per-mode behaviour profile.
//!
//! The three modes share one controller; everything that differs between them
//! lives in [`ModeProfile`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::settings::TimingSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Plain question/answer against `/send`
    #[default]
    Basic,
    /// Model selection and token usage stats against `/send_completion`
    Completion,
    /// Model selection with persisted client-side history against `/send_llm`
    Llm,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Basic => "basic",
            ChatMode::Completion => "completion",
            ChatMode::Llm => "llm",
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            ChatMode::Basic => Endpoint::Send,
            ChatMode::Completion => Endpoint::SendCompletion,
            ChatMode::Llm => Endpoint::SendLlm,
        }
    }

    pub fn profile(&self, timing: &TimingSettings) -> ModeProfile {
        let placeholder_delay = Duration::from_millis(timing.placeholder_delay_ms);
        match self {
            ChatMode::Basic => ModeProfile {
                mode: *self,
                endpoint: self.endpoint(),
                uses_history: false,
                sends_model: false,
                persists: false,
                shows_usage_stats: false,
                placeholder_delay,
                status_lines: StatusLinePolicy::Interval(timing.interval_secs.normalized()),
            },
            ChatMode::Completion => ModeProfile {
                mode: *self,
                endpoint: self.endpoint(),
                uses_history: false,
                sends_model: true,
                persists: false,
                shows_usage_stats: true,
                placeholder_delay,
                status_lines: StatusLinePolicy::Suppressed,
            },
            ChatMode::Llm => ModeProfile {
                mode: *self,
                endpoint: self.endpoint(),
                uses_history: true,
                sends_model: true,
                persists: true,
                shows_usage_stats: false,
                placeholder_delay,
                status_lines: StatusLinePolicy::TwoShot(timing.two_shot_secs.normalized()),
            },
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" | "chat" => Ok(ChatMode::Basic),
            "completion" => Ok(ChatMode::Completion),
            "llm" => Ok(ChatMode::Llm),
            other => Err(anyhow::anyhow!(
                "unknown mode '{}' (expected basic, completion or llm)",
                other
            )),
        }
    }
}

/// Backend routes, all POST
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Send,
    SendCompletion,
    SendLlm,
    Models,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Send => "/send",
            Endpoint::SendCompletion => "/send_completion",
            Endpoint::SendLlm => "/send_llm",
            Endpoint::Models => "/models",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Inclusive range of whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondsRange {
    pub min: u64,
    pub max: u64,
}

impl SecondsRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// At least one second, and `max >= min`.
    pub fn normalized(&self) -> Self {
        let min = self.min.max(1);
        Self {
            min,
            max: self.max.max(min),
        }
    }
}

/// How status lines are staged while a request is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLinePolicy {
    /// One repeating interval, period drawn once per request from the range
    Interval(SecondsRange),
    /// Two one-shot lines: first at `r1`, second at `r1 + r2`
    TwoShot(SecondsRange),
    /// Placeholder only
    Suppressed,
}

/// Everything that distinguishes one chat mode from another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    pub mode: ChatMode,
    pub endpoint: Endpoint,
    /// Send the transcript as `history`
    pub uses_history: bool,
    /// Send the selected model identifier
    pub sends_model: bool,
    /// Mirror the transcript to durable storage
    pub persists: bool,
    pub shows_usage_stats: bool,
    pub placeholder_delay: Duration,
    pub status_lines: StatusLinePolicy,
}
