//! Line-oriented terminal front end for the conversation controller.

use conversation::ChatView;
use shared::{Message, Role, Usage};
use std::io::{self, IsTerminal, Write};

use crate::simple_md::render_markdown;

const PROMPT: &str = "> ";
const BOUNDARY_RULE: &str = "────────";
const PLACEHOLDER: &str = "mind › …";

/// ANSI: cursor up one line, clear it
const ERASE_PREVIOUS_LINE: &str = "\x1b[1A\x1b[2K\r";
/// ANSI: clear the current line
const ERASE_CURRENT_LINE: &str = "\x1b[2K\r";

pub struct ConsoleView<W: Write> {
    out: W,
    ansi: bool,
    input_enabled: bool,
    /// A prompt is on screen with nothing typed after it
    prompt_visible: bool,
    /// The placeholder is the last line printed
    placeholder_last: bool,
}

impl ConsoleView<io::Stdout> {
    pub fn stdout() -> Self {
        let ansi = io::stdout().is_terminal();
        Self::new(io::stdout(), ansi)
    }
}

impl<W: Write> ConsoleView<W> {
    pub fn new(out: W, ansi: bool) -> Self {
        Self {
            out,
            ansi,
            input_enabled: true,
            prompt_visible: false,
            placeholder_last: false,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn write_raw(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()) {
            tracing::debug!(error = %e, "console write failed");
        }
    }

    /// Print a block of lines, first taking down a dangling prompt.
    fn write_block(&mut self, text: &str) {
        if self.prompt_visible {
            if self.ansi {
                self.write_raw(ERASE_CURRENT_LINE);
            } else {
                self.write_raw("\n");
            }
            self.prompt_visible = false;
        }
        self.write_raw(text);
        self.write_raw("\n");
        self.placeholder_last = false;
    }

    fn show_prompt(&mut self) {
        if self.input_enabled && !self.prompt_visible {
            self.write_raw(PROMPT);
            self.prompt_visible = true;
        }
        let _ = self.out.flush();
    }
}

fn prefixed(prefix: &str, body: &str) -> String {
    let indent = " ".repeat(prefix.chars().count());
    let mut out = String::new();
    for (i, line) in body.lines().enumerate() {
        if i == 0 {
            out.push_str(prefix);
        } else {
            out.push('\n');
            out.push_str(&indent);
        }
        out.push_str(line);
    }
    if out.is_empty() {
        out.push_str(prefix.trim_end());
    }
    out
}

impl<W: Write> ChatView for ConsoleView<W> {
    fn render_message(&mut self, _index: usize, message: &Message) {
        match message.role {
            Role::User => {
                // Replace the echoed "> text" line with the prefixed entry.
                if self.prompt_visible && self.ansi {
                    self.write_raw(ERASE_PREVIOUS_LINE);
                    self.prompt_visible = false;
                }
                self.write_block(&prefixed("you › ", &message.content));
            }
            Role::Assistant => {
                let mut text = prefixed("mind › ", &render_markdown(&message.content));
                if let Some(model) = &message.model {
                    text.push_str(&format!("\n       [{}]", model));
                }
                self.write_block(&text);
            }
            Role::Error => self.write_block(&prefixed("error › ", &message.content)),
            Role::Loading => {
                self.write_block(PLACEHOLDER);
                self.placeholder_last = true;
            }
            Role::Boundary => {
                let rule = format!("{} {} {}", BOUNDARY_RULE, message.content, BOUNDARY_RULE);
                self.write_block(&rule);
            }
        }
    }

    fn remove_transient(&mut self) {
        if self.placeholder_last && self.ansi {
            self.write_raw(ERASE_PREVIOUS_LINE);
        }
        self.placeholder_last = false;
    }

    fn render_status_line(&mut self, text: &str) {
        // The placeholder stays the bottom line so it can still be erased.
        let lift_placeholder = self.placeholder_last && self.ansi;
        if lift_placeholder {
            self.write_raw(ERASE_PREVIOUS_LINE);
        }
        self.write_block(&format!("  · {}", text));
        if lift_placeholder {
            self.write_block(PLACEHOLDER);
            self.placeholder_last = true;
        }
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
        if enabled {
            self.show_prompt();
        }
    }

    fn scroll_to_latest(&mut self) {
        self.show_prompt();
    }

    fn populate_model_options(&mut self, models: &[String], selected: Option<&str>) {
        if models.is_empty() {
            return;
        }
        let listing: Vec<String> = models
            .iter()
            .map(|m| {
                if Some(m.as_str()) == selected {
                    format!("[{}]", m)
                } else {
                    m.clone()
                }
            })
            .collect();
        self.write_block(&format!("models: {}", listing.join("  ")));
        self.show_prompt();
    }

    fn show_usage(&mut self, usage: Option<&Usage>) {
        if let Some(u) = usage {
            self.write_block(&format!(
                "tokens: prompt {} · completion {} · total {}",
                u.prompt_tokens, u.completion_tokens, u.total_tokens
            ));
        }
    }

    fn clear(&mut self) {
        if self.ansi {
            self.write_raw("\x1b[2J\x1b[H");
        } else {
            self.write_raw("\n");
        }
        self.prompt_visible = false;
        self.placeholder_last = false;
    }
}
