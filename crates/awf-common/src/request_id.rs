use uuid::Uuid;

/// Generates a fresh UUID-v4-shaped trace identifier.
pub fn generate() -> String {
    Uuid::new_v4().to_string()
}

/// Accepts any string of length 1-128 composed of `[A-Za-z0-9_.-]`.
pub fn validate(value: &str) -> bool {
    let len = value.len();
    if len == 0 || len > 128 {
        return false;
    }
    value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

/// Returns `candidate` unchanged if valid, else a freshly generated id.
pub fn resolve(candidate: Option<&str>) -> String {
    match candidate {
        Some(value) if validate(value) => value.to_string(),
        _ => generate(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid() {
        let id = generate();
        assert!(validate(&id));
    }

    #[test]
    fn accepts_allowed_charset() {
        assert!(validate("my-trace_abc123.def"));
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(!validate(""));
        assert!(!validate(&"a".repeat(129)));
        assert!(validate(&"a".repeat(128)));
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(!validate("<script>alert(1)</script>"));
        assert!(!validate("has space"));
        assert!(!validate("has\nnewline"));
    }

    #[test]
    fn resolve_echoes_valid_and_replaces_invalid() {
        assert_eq!(resolve(Some("my-trace-abc123")), "my-trace-abc123");
        let replaced = resolve(Some("<script>alert(1)</script>"));
        assert!(validate(&replaced));
        assert!(!replaced.contains("<script>"));
        let generated = resolve(None);
        assert!(validate(&generated));
    }
}
