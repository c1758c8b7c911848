use crate::error::PgMiddlewareError;

/// Most bind parameters one statement can carry (the protocol counts them in
/// an `i16`-sized field).
pub const MAX_PARAMETERS: usize = 65_535;

/// Placeholder syntax used by a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// Anonymous `?` markers, numbered left to right.
    Anonymous,
    /// Positional `$N` markers; a number may appear more than once.
    Positional,
}

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted { backslash_escapes: bool },
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Result of scanning a template once.
#[derive(Debug)]
pub(super) struct Scanned {
    /// SQL with every placeholder rewritten to `$N`.
    pub rendered: String,
    pub style: Option<PlaceholderStyle>,
    /// Number of distinct parameter slots.
    pub slots: usize,
    /// Byte offset in `rendered` just past the last token that is not a
    /// comment, whitespace or `;`.
    pub code_end: usize,
}

fn too_many(n: usize) -> PgMiddlewareError {
    PgMiddlewareError::ParameterError(format!(
        "placeholder ${n} exceeds the limit of {MAX_PARAMETERS} parameters"
    ))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn starts_with_at(bytes: &[u8], idx: usize, pat: &[u8]) -> bool {
    bytes.get(idx..).is_some_and(|rest| rest.starts_with(pat))
}

fn scan_digits(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == start {
        None
    } else {
        std::str::from_utf8(&bytes[start..idx])
            .ok()
            .map(|digits| (idx, digits))
    }
}

/// Returns the tag and the index of the closing `$` of an opening dollar quote.
fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    if bytes.get(idx).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    while idx < bytes.len() && bytes[idx] != b'$' {
        if !is_ident_byte(bytes[idx]) {
            return None;
        }
        idx += 1;
    }
    if idx < bytes.len() {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

/// Scan `sql` for placeholders, skipping quoted text, comments and
/// dollar-quoted bodies, and render it with `$N` markers.
pub(super) fn scan(sql: &str) -> Result<Scanned, PgMiddlewareError> {
    let bytes = sql.as_bytes();
    let mut rendered = String::with_capacity(sql.len() + 8);
    let mut copied_to = 0;
    let mut style: Option<PlaceholderStyle> = None;
    let mut anonymous = 0usize;
    let mut positional: Vec<bool> = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;
    let mut code_end = 0;

    let mut set_style = |found: PlaceholderStyle| -> Result<(), PgMiddlewareError> {
        match style {
            Some(existing) if existing != found => Err(PgMiddlewareError::ParameterError(
                "template mixes '?' and '$N' placeholders".to_string(),
            )),
            _ => {
                style = Some(found);
                Ok(())
            }
        }
    };

    while idx < bytes.len() {
        let b = bytes[idx];
        let from_normal = matches!(state, State::Normal);
        let quoted = matches!(
            state,
            State::SingleQuoted { .. } | State::DoubleQuoted | State::DollarQuoted(_)
        );
        match state {
            State::Normal => match b {
                b'\'' => {
                    let escaped = idx > 0
                        && matches!(bytes[idx - 1], b'E' | b'e')
                        && (idx < 2 || !is_ident_byte(bytes[idx - 2]));
                    state = State::SingleQuoted {
                        backslash_escapes: escaped,
                    };
                }
                b'"' => state = State::DoubleQuoted,
                b'-' if starts_with_at(bytes, idx, b"--") => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if starts_with_at(bytes, idx, b"/*") => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b':' if starts_with_at(bytes, idx, b"::") => idx += 1,
                b'$' if idx > 0 && is_ident_byte(bytes[idx - 1]) => {}
                b'$' => {
                    if let Some((digits_end, digits)) = scan_digits(bytes, idx + 1) {
                        set_style(PlaceholderStyle::Positional)?;
                        let n: usize = digits.parse().map_err(|_| {
                            PgMiddlewareError::ParameterError(format!("placeholder ${digits} is out of range"))
                        })?;
                        if n > MAX_PARAMETERS {
                            return Err(too_many(n));
                        }
                        if n == 0 {
                            return Err(PgMiddlewareError::ParameterError(
                                "placeholders are numbered from $1".to_string(),
                            ));
                        }
                        if positional.len() < n {
                            positional.resize(n, false);
                        }
                        positional[n - 1] = true;
                        idx = digits_end - 1;
                    } else if let Some((tag, close)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = close;
                    }
                }
                b'?' if starts_with_at(bytes, idx, b"??") => {
                    // `??` is a literal question mark (e.g. the jsonb `?` operator).
                    rendered.push_str(&sql[copied_to..idx]);
                    rendered.push('?');
                    idx += 1;
                    copied_to = idx + 1;
                }
                b'?' => {
                    set_style(PlaceholderStyle::Anonymous)?;
                    anonymous += 1;
                    if anonymous > MAX_PARAMETERS {
                        return Err(too_many(anonymous));
                    }
                    rendered.push_str(&sql[copied_to..idx]);
                    rendered.push('$');
                    rendered.push_str(&anonymous.to_string());
                    copied_to = idx + 1;
                }
                _ => {}
            },
            State::SingleQuoted { backslash_escapes } => {
                if backslash_escapes && b == b'\\' {
                    idx += 1;
                } else if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // doubled quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if starts_with_at(bytes, idx, b"/*") {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if starts_with_at(bytes, idx, b"*/") {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' {
                    let close = format!("${tag}$");
                    if starts_with_at(bytes, idx, close.as_bytes()) {
                        idx += close.len() - 1;
                        state = State::Normal;
                    }
                }
            }
        }
        let in_comment = matches!(state, State::LineComment | State::BlockComment(_));
        if quoted || (from_normal && !in_comment && !b.is_ascii_whitespace() && b != b';') {
            code_end = idx + 1;
        }
        idx += 1;
    }
    rendered.push_str(&sql[copied_to.min(sql.len())..]);
    // Nothing after the last code byte was rewritten, so the tail lengths match.
    let code_end = rendered.len() - (sql.len() - code_end.min(sql.len()));

    let slots = match style {
        Some(PlaceholderStyle::Anonymous) => anonymous,
        Some(PlaceholderStyle::Positional) => {
            if let Some(missing) = positional.iter().position(|seen| !seen) {
                return Err(PgMiddlewareError::ParameterError(format!(
                    "placeholder ${} is never used but ${} is",
                    missing + 1,
                    positional.len()
                )));
            }
            positional.len()
        }
        None => 0,
    };

    Ok(Scanned {
        rendered,
        style,
        slots,
        code_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_anonymous_placeholders() {
        let s = scan("select * from t where a = ? and b = ?").unwrap();
        assert_eq!(s.rendered, "select * from t where a = $1 and b = $2");
        assert_eq!(s.slots, 2);
        assert_eq!(s.style, Some(PlaceholderStyle::Anonymous));
    }

    #[test]
    fn positional_placeholders_may_repeat() {
        let s = scan("select $1, $2 where x = $1").unwrap();
        assert_eq!(s.rendered, "select $1, $2 where x = $1");
        assert_eq!(s.slots, 2);
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let s = scan("select '?', \"a?\" -- ?\n/* ? /* $1 */ ? */ from t where a = ?").unwrap();
        assert_eq!(s.slots, 1);
        assert!(s.rendered.ends_with("where a = $1"));
        assert!(s.rendered.starts_with("select '?', \"a?\""));
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let s = scan("$fn$ select $1 from t $fn$ where a = $1").unwrap();
        assert_eq!(s.slots, 1);
        let s = scan("do $$ begin perform ?; end $$").unwrap();
        assert_eq!(s.slots, 0);
    }

    #[test]
    fn escaped_string_and_casts() {
        let s = scan(r"select E'it\'s ?', ?::inet").unwrap();
        assert_eq!(s.rendered, r"select E'it\'s ?', $1::inet");
        let s = scan("select 'it''s ?', $1::text").unwrap();
        assert_eq!(s.slots, 1);
    }

    #[test]
    fn double_question_mark_is_literal() {
        let s = scan("select data ?? 'k' from t where id = ?").unwrap();
        assert_eq!(s.rendered, "select data ? 'k' from t where id = $1");
        assert_eq!(s.slots, 1);
    }

    #[test]
    fn dollar_inside_identifier_is_not_a_placeholder() {
        let s = scan("select col$1 from t").unwrap();
        assert_eq!(s.slots, 0);
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(matches!(
            scan("select ?, $1"),
            Err(PgMiddlewareError::ParameterError(_))
        ));
        assert!(matches!(
            scan("select $1, $3"),
            Err(PgMiddlewareError::ParameterError(_))
        ));
        assert!(matches!(scan("select $0"), Err(PgMiddlewareError::ParameterError(_))));
    }

    #[test]
    fn rejects_placeholder_numbers_past_the_protocol_limit() {
        assert!(matches!(
            scan("select $100000000000"),
            Err(PgMiddlewareError::ParameterError(_))
        ));
        assert!(matches!(
            scan("select $99999999999999999999999"),
            Err(PgMiddlewareError::ParameterError(_))
        ));
        assert!(matches!(
            scan("select $65536"),
            Err(PgMiddlewareError::ParameterError(_))
        ));
        let many = vec!["?"; MAX_PARAMETERS + 1].join(",");
        assert!(matches!(
            scan(&format!("select {many}")),
            Err(PgMiddlewareError::ParameterError(_))
        ));
    }

    #[test]
    fn code_end_stops_before_trailing_comments() {
        let s = scan("insert into t(a) values (?) -- audit").unwrap();
        assert_eq!(&s.rendered[..s.code_end], "insert into t(a) values ($1)");
        let s = scan("insert into t(a) values (??) ; /* note */\n").unwrap();
        assert_eq!(&s.rendered[..s.code_end], "insert into t(a) values (?)");
        let s = scan("select 'x -- y'").unwrap();
        assert_eq!(s.code_end, s.rendered.len());
        let s = scan("select $1 $$").unwrap();
        assert_eq!(s.code_end, s.rendered.len());
    }

    #[test]
    fn keeps_non_ascii_text() {
        let s = scan("select 'héllo', ? -- ünïcode").unwrap();
        assert_eq!(s.rendered, "select 'héllo', $1 -- ünïcode");
    }
}
