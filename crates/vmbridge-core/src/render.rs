//! Rendering of execution output for a size-limited message transport.
//!
//! Output is wrapped in a language-tagged code fence. When the fenced text
//! would exceed the byte budget, the raw text is cut and an ellipsis marker
//! appended so that the fence itself always survives intact.

/// Byte budget of a single transport message.
pub const MESSAGE_BUDGET: usize = 2000;

/// Marker appended to truncated output.
pub const ELLIPSIS: &str = "(...)";

/// Rendering of an empty result.
///
/// A bare fence with a language tag would be shown as the tag itself, so the
/// empty marker carries no language.
pub const EMPTY_BLOCK: &str = "```\n```";

const FENCE: &str = "```";

/// Wrap `text` in a code fence, truncating it to fit within `budget` bytes.
pub fn code_block(text: &str, language: &str, budget: usize) -> String {
    if text.is_empty() {
        return EMPTY_BLOCK.to_string();
    }

    let prefix = format!("{FENCE}{language}\n");
    let wrapped_len = prefix.len() + text.len() + FENCE.len();
    if wrapped_len <= budget {
        return format!("{prefix}{text}{FENCE}");
    }

    let allowed = budget.saturating_sub(prefix.len() + FENCE.len() + ELLIPSIS.len());
    let cut = floor_char_boundary(text, allowed);
    format!("{prefix}{}{ELLIPSIS}{FENCE}", &text[..cut])
}

/// Largest index `<= index` that falls on a char boundary of `text`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}
