//! Instruction prompt sent with every page image.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::instruction`]; the constant here is used
//! only when no override is provided.

/// Default transcription instruction for a rendered page.
pub const DEFAULT_INSTRUCTION: &str = "Transcribe all of the text in this image exactly as it appears. \
Preserve the original layout, line breaks and reading order. \
Reproduce tables row by row, keeping their column structure. \
Output only the transcribed text, with no commentary.";

/// Marker placed before each page's content in the concatenated transcript.
pub fn page_marker(page_num: usize) -> String {
    format!("=== page {} ===", page_num)
}
