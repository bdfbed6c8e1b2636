//! `${VAR}` and `${VAR:-fallback}` expansion over raw config text.

/// Expand placeholders using the process environment.
///
/// Unset variables without a fallback are left untouched so validation can
/// point at them.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            // Unterminated: keep the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let inner = &after[..end];
        let (name, fallback) = match inner.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (inner, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(inner);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "TOCSIN_PORT" => Some("9000".into()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_variable() {
        assert_eq!(substitute_env_with("port = ${TOCSIN_PORT}", env), "port = 9000");
        assert_eq!(substitute_env_with("x${EMPTY}y", env), "xy");
    }

    #[test]
    fn unknown_variable_is_kept() {
        assert_eq!(substitute_env_with("${NOPE}", env), "${NOPE}");
        assert_eq!(substitute_env_with("${}", env), "${}");
    }

    #[test]
    fn fallback_used_only_when_unset() {
        assert_eq!(substitute_env_with("${NOPE:-8000}", env), "8000");
        assert_eq!(substitute_env_with("${TOCSIN_PORT:-8000}", env), "9000");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(
            substitute_env_with("a = ${TOCSIN_PORT} b = ${OPEN", env),
            "a = 9000 b = ${OPEN"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(substitute_env("bind = \"127.0.0.1\""), "bind = \"127.0.0.1\"");
    }
}
