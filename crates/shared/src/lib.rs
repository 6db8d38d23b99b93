pub mod message;
pub mod mode;

pub use message::{HistoryTurn, Message, Role, Usage};
pub use mode::{ChatMode, Endpoint, ModeProfile, SecondsRange, StatusLinePolicy};

pub mod settings {
    use crate::mode::{ChatMode, SecondsRange};
    use serde::{Deserialize, Serialize};
    use std::fs;
    use std::path::Path;

    /// Model the backend dedicates to embeddings; never offered for chat
    pub const EMBEDDING_MODEL: &str = "text-embedding-ada-002";

    fn default_true() -> bool {
        true
    }

    /// Delays used to stage the "thinking" UI
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TimingSettings {
        /// Delay before the typing placeholder appears
        pub placeholder_delay_ms: u64,
        /// Period range of the repeating status line (basic mode)
        pub interval_secs: SecondsRange,
        /// Offset range of each one-shot status line (llm mode)
        pub two_shot_secs: SecondsRange,
    }

    impl Default for TimingSettings {
        fn default() -> Self {
            Self {
                placeholder_delay_ms: 800,
                interval_secs: SecondsRange::new(8, 12),
                two_shot_secs: SecondsRange::new(5, 10),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ClientSettings {
        pub base_url: String,
        pub mode: ChatMode,
        /// Used until the model catalog has been loaded
        pub default_model: String,
        #[serde(default = "default_excluded_model")]
        pub excluded_model: String,
        pub request_timeout_secs: u64,
        /// Append an error entry when a request fails at the transport level
        #[serde(default = "default_true")]
        pub surface_transport_errors: bool,
        /// Storage key of the persisted llm transcript
        pub session_key: String,
        #[serde(default)]
        pub timing: TimingSettings,
    }

    fn default_excluded_model() -> String {
        EMBEDDING_MODEL.to_string()
    }

    impl Default for ClientSettings {
        fn default() -> Self {
            Self {
                base_url: "http://127.0.0.1:8000".into(),
                mode: ChatMode::Basic,
                default_model: "gpt-3.5-turbo".into(),
                excluded_model: default_excluded_model(),
                request_timeout_secs: 120,
                surface_transport_errors: true,
                session_key: "mindchat.llm.session".into(),
                timing: TimingSettings::default(),
            }
        }
    }

    impl ClientSettings {
        /// Read settings from a JSON file. A missing file gives the defaults;
        /// a malformed one is logged and replaced by the defaults.
        pub fn load(path: &Path) -> Self {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not read settings");
                    return Self::default();
                }
            };
            match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring malformed settings");
                    Self::default()
                }
            }
        }

        /// Apply `MINDCHAT_BASE_URL` and `MINDCHAT_MODE`.
        pub fn apply_env_overrides(&mut self) {
            self.apply_overrides(
                std::env::var("MINDCHAT_BASE_URL").ok(),
                std::env::var("MINDCHAT_MODE").ok(),
            );
        }

        fn apply_overrides(&mut self, base_url: Option<String>, mode: Option<String>) {
            if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
                self.base_url = url.trim().to_string();
            }
            if let Some(raw) = mode {
                match raw.parse::<ChatMode>() {
                    Ok(mode) => self.mode = mode,
                    Err(e) => tracing::warn!(error = %e, "ignoring MINDCHAT_MODE"),
                }
            }
        }
    }

}
