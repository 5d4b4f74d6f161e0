/// Shown instead of an empty result when a rewrite succeeds with no content.
pub const NO_RESULT_PLACEHOLDER: &str = "No rewritten text received";

/// Lifecycle snapshot of one rewrite client.
///
/// `result_text` only grows while a request streams and is emptied when the
/// next request is accepted. `in_flight` spans acceptance to resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestState {
    pub input_text: String,
    pub result_text: String,
    pub error_message: Option<String>,
    pub in_flight: bool,
}

impl RequestState {
    pub fn has_result(&self) -> bool {
        !self.result_text.is_empty()
    }
}

/// How a successful submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Stream finished with this text (also left in `result_text`).
    Completed(String),
    /// Stream finished blank; `result_text` holds [`NO_RESULT_PLACEHOLDER`].
    Empty,
}
