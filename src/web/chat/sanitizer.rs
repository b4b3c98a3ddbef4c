// Post-processing of raw decoder output into a single clean answer

use lazy_static::lazy_static;
use regex::Regex;

const THINK_OPEN: &str = "<think>";
const ANSWER_MARKER: &str = "Output:";
const ECHO_MARKER: &str = "Text:";

lazy_static! {
    static ref THINK_BLOCK: Regex = Regex::new(r"(?s)<think>.*?</think>").unwrap();
}

/// Clean raw model output. Total: never fails, `None` and `""` both give `""`.
///
/// Stages run strictly in order:
/// 1. reasoning blocks (`<think>...</think>`) are removed; output that opens
///    with `<think>` and never closes it was cut off mid-reasoning and is
///    dropped entirely, while a literal `<think>` inside an answer is kept;
/// 2. if the answer marker `Output:` is present, the first non-blank section
///    after it is kept, up to its first blank line;
/// 3. if the echo marker `Text:` repeats, the text is cut before the repetition;
/// 4. surrounding whitespace is trimmed.
pub fn clean(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    if raw.is_empty() {
        return String::new();
    }

    let text = strip_reasoning(raw);
    let text = extract_first_answer(&text);
    let text = cut_echo_loop(text);
    text.trim().to_string()
}

fn strip_reasoning(raw: &str) -> String {
    let mut text = raw.to_string();
    loop {
        let stripped = THINK_BLOCK.replace_all(&text, "");
        if stripped.len() == text.len() {
            break;
        }
        text = stripped.into_owned();
    }

    // Only an opener at the very start is unfinished reasoning
    if text.trim_start().starts_with(THINK_OPEN) {
        text.clear();
    }
    text
}

fn extract_first_answer(text: &str) -> &str {
    if !text.contains(ANSWER_MARKER) {
        return text;
    }

    text.split(ANSWER_MARKER)
        .skip(1)
        .map(str::trim)
        .find(|part| !part.is_empty())
        .map(|part| part.split("\n\n").next().unwrap_or(part))
        .unwrap_or(text)
}

fn cut_echo_loop(text: &str) -> &str {
    if text.matches(ECHO_MARKER).count() <= 1 {
        return text;
    }

    match text.find(ECHO_MARKER) {
        Some(0) => match text[ECHO_MARKER.len()..].find(ECHO_MARKER) {
            Some(rel) => text[..ECHO_MARKER.len() + rel].trim(),
            None => text,
        },
        Some(idx) => text[..idx].trim(),
        None => text,
    }
}
