// Stop condition checking for the decode loop

/// Chat-turn markers that end an answer even when the model does not emit
/// an end-of-generation token.
pub const CHAT_TURN_MARKERS: &[&str] = &[
    "<|im_end|>",
    "<|endoftext|>",
    "<|eot_id|>",
    "<end_of_turn>",
    "</s>",
    "<|end|>",
];

pub fn default_stop_markers() -> Vec<String> {
    CHAT_TURN_MARKERS.iter().map(|m| m.to_string()).collect()
}

/// Result of stop condition check
#[derive(Debug, PartialEq, Eq)]
pub struct StopConditionResult {
    pub should_stop: bool,
    /// Bytes of an already-emitted partial marker to remove from the end of the response
    pub partial_to_remove: usize,
    pub matched_token: Option<String>,
}

impl StopConditionResult {
    pub fn no_stop() -> Self {
        Self {
            should_stop: false,
            partial_to_remove: 0,
            matched_token: None,
        }
    }

    pub fn stop_now(matched: String) -> Self {
        Self {
            should_stop: true,
            partial_to_remove: 0,
            matched_token: Some(matched),
        }
    }

    pub fn stop_with_removal(bytes_to_remove: usize, matched: String) -> Self {
        Self {
            should_stop: true,
            partial_to_remove: bytes_to_remove,
            matched_token: Some(matched),
        }
    }

    /// Fold the stopping token into `response`, leaving the text before the marker.
    pub fn finish(&self, response: &mut String, new_token: &str) {
        if self.partial_to_remove > 0 {
            let keep = response.len().saturating_sub(self.partial_to_remove);
            response.truncate(keep);
            return;
        }

        response.push_str(new_token);
        let trimmed_len = response.trim_end().len();
        response.truncate(trimmed_len);
        if let Some(marker) = &self.matched_token {
            if response.ends_with(marker.as_str()) {
                let keep = response.len() - marker.len();
                response.truncate(keep);
            }
        }
    }
}

/// Check whether appending `new_token` to `response` completes a stop marker.
///
/// Markers only count at the end of the text. When the marker was split across
/// tokens, `partial_to_remove` tells the caller how much of the already
/// accumulated response belongs to it. The new token itself is never appended
/// on a stop.
pub fn check_stop_conditions(
    response: &str,
    new_token: &str,
    stop_tokens: &[String],
) -> StopConditionResult {
    let test_response = format!("{response}{new_token}");
    let trimmed = test_response.trim_end();

    for stop_token in stop_tokens {
        if stop_token.is_empty() {
            continue;
        }

        if !trimmed.ends_with(stop_token.as_str()) {
            continue;
        }

        // Portion of the marker already sitting in `response`
        let carried = stop_token.len().saturating_sub(new_token.trim_end().len());
        if carried > 0 && response.trim_end().ends_with(&stop_token[..carried]) {
            let trailing_ws = response.len() - response.trim_end().len();
            return StopConditionResult::stop_with_removal(
                carried + trailing_ws,
                stop_token.clone(),
            );
        }
        return StopConditionResult::stop_now(stop_token.clone());
    }

    StopConditionResult::no_stop()
}

/// Remove a trailing stop marker (or a prefix of one at least two bytes long)
/// left in the final text, e.g. when the token budget ran out mid-marker.
pub fn trim_partial_marker(text: &str, stop_tokens: &[String]) -> String {
    let trimmed = text.trim_end();
    for stop_token in stop_tokens {
        // "</s>" prefixes collide with ordinary markup
        let min_len = if stop_token == "</s>" { stop_token.len() } else { 2 };
        for len in (min_len..=stop_token.len()).rev() {
            let Some(prefix) = stop_token.get(..len) else {
                continue;
            };
            if trimmed.ends_with(prefix) {
                return trimmed[..trimmed.len() - len].to_string();
            }
        }
    }
    text.to_string()
}
