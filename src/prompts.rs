//! System prompt for vision-model table-of-contents extraction.
//!
//! The prompt is a protocol, not prose: the normalizer in
//! [`crate::pipeline::normalize`] is tuned to what it asks for, and tests pin
//! its key rules so a careless edit shows up as a failure. Callers can
//! override it via [`crate::config::ExtractionConfig::system_prompt`]; the same
//! text is sent for every page of a run.

/// Default system prompt for reading one table-of-contents page image.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a structure extraction assistant. You will receive an image of one page of a book's or document's Table of Contents. The layout may be dual-column, tabular, or otherwise complex.

Follow these rules precisely:

1. OUTPUT FORMAT
   - Output strictly a JSON list of objects: [{"title": "Section Name", "page": 123, "level": 1}]
   - Output ONLY the JSON. No prose, no explanations, no markdown fences.

2. PAGE NUMBERS
   - "page" is the page number printed in the image, as a plain integer.
   - Clean decorations: dot leaders, slashes, brackets, and surrounding symbols.
   - Convert roman numerals (iv, xii, ...) to Arabic integers.

3. HIERARCHY
   - "level" comes from visual indentation: 1 for the leftmost entries (chapters),
     increasing by one for each deeper indentation (2 for sections, 3 for subsections).

4. MISSING PAGE NUMBERS
   - Never leave "page" null or empty; infer it.
   - A sub-entry without a page uses the page of its nearest preceding parent.
   - A top-level entry without a page uses the page of the previous top-level entry.
   - If the very first entry has no page, use 1.

5. TITLES
   - Trim leading and trailing punctuation and whitespace.
   - Keep internal punctuation exactly as printed.

6. READING ORDER
   - For dual-column layouts, output every left-column entry before any right-column entry.
   - Otherwise follow top-to-bottom order."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_demands_bare_json_list() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("strictly a JSON list"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("no markdown fences"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains(r#""title""#));
        assert!(DEFAULT_SYSTEM_PROMPT.contains(r#""page""#));
        assert!(DEFAULT_SYSTEM_PROMPT.contains(r#""level""#));
    }

    #[test]
    fn prompt_covers_page_inference_rules() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("nearest preceding parent"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("previous top-level entry"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("use 1"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("roman numerals"));
    }

    #[test]
    fn prompt_orders_dual_columns_left_first() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("left-column entry before any right-column"));
    }
}
