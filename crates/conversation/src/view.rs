use shared::{Message, Usage};

/// Presentation layer driven by the controller.
///
/// Implementations only draw; they never call back into the controller.
/// Input reaches the controller as [`crate::ControllerEvent`]s instead.
pub trait ChatView {
    /// Draw the transcript entry at `index`.
    fn render_message(&mut self, index: usize, message: &Message);

    /// Take down the loading placeholder, if one is shown.
    fn remove_transient(&mut self);

    fn render_status_line(&mut self, text: &str);

    fn set_input_enabled(&mut self, enabled: bool);

    fn scroll_to_latest(&mut self);

    fn populate_model_options(&mut self, models: &[String], selected: Option<&str>);

    /// `None` hides the statistics.
    fn show_usage(&mut self, usage: Option<&Usage>);

    /// Remove everything drawn so far.
    fn clear(&mut self);
}
