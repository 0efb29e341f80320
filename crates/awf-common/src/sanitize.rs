const DEFAULT_MAX_LEN: usize = 200;

/// Strips control bytes (`0x00-0x1f`, `0x7f`) and truncates to `max_len`.
///
/// Used on every log field that originated from request data, so a
/// client cannot inject newlines into the structured log stream or
/// grow a field without bound.
pub fn sanitize(value: &str, max_len: usize) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| {
            let b = *c as u32;
            !(b <= 0x1f || b == 0x7f)
        })
        .collect();
    cleaned.chars().take(max_len).collect()
}

/// `sanitize` with a default cap of 200 characters.
pub fn sanitize_default(value: &str) -> String {
    sanitize(value, DEFAULT_MAX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_chars() {
        let out = sanitize("hello\r\nworld\x7f!", 200);
        assert_eq!(out, "helloworld!");
    }

    #[test]
    fn truncates_to_max_len() {
        let out = sanitize(&"a".repeat(300), 200);
        assert_eq!(out.len(), 200);
    }

    #[test]
    fn leaves_clean_text_untouched() {
        assert_eq!(sanitize_default("plain text"), "plain text");
    }
}
