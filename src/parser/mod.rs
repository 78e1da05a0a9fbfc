pub mod append;
pub mod fetch;
pub mod list;
pub mod sequence;
pub mod store;

use chrono::DateTime;

use crate::core::{reply::ReplyCode, Reply, Result};

/// Split the contents of a parenthesized list (or a bare argument run) into
/// arguments, honoring quoting and nested parentheses/brackets. A nested
/// group stays one argument including its parentheses.
pub fn parse_imap_args(input: &str) -> Option<Vec<String>> {
    let input = input.trim();
    let inner = if let Some(stripped) = input.strip_prefix('(') {
        stripped.strip_suffix(')')?
    } else {
        input
    };
    let mut args = Vec::new();
    let mut current = String::new();
    let mut has_current = false;
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut in_bracket = false;
    let mut escape = false;
    for ch in inner.chars() {
        if in_quote {
            if escape {
                current.push(ch);
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_quote = false;
            } else {
                current.push(ch);
            }
            continue;
        }
        match ch {
            '"' if depth == 0 && !in_bracket => {
                in_quote = true;
                has_current = true;
            }
            '(' if !in_bracket => {
                depth += 1;
                has_current = true;
                current.push(ch);
            }
            ')' if !in_bracket => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
                current.push(ch);
            }
            '[' if depth == 0 => {
                in_bracket = true;
                has_current = true;
                current.push(ch);
            }
            ']' if in_bracket => {
                in_bracket = false;
                current.push(ch);
            }
            ' ' if depth == 0 && !in_bracket => {
                if has_current {
                    args.push(std::mem::take(&mut current));
                    has_current = false;
                }
            }
            _ => {
                has_current = true;
                current.push(ch);
            }
        }
    }
    if in_quote || depth != 0 || in_bracket {
        return None;
    }
    if has_current {
        args.push(current);
    }
    Some(args)
}

pub fn bad() -> Reply {
    Reply::of(ReplyCode::ParameterError)
}

pub fn arg_str(arg: &[u8]) -> Result<&str> {
    std::str::from_utf8(arg).map_err(|_| bad())
}

/// `"dd-Mon-yyyy HH:MM:SS +ZZZZ"`, single-digit days space-padded.
pub fn parse_imap_date(s: &str) -> Option<i64> {
    let s = s.trim();
    for format in ["%d-%b-%Y %H:%M:%S %z", "%e-%b-%Y %H:%M:%S %z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.timestamp());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imap_args() {
        assert_eq!(
            parse_imap_args("(\\Seen \\Deleted)").unwrap(),
            ["\\Seen", "\\Deleted"]
        );
        assert_eq!(
            parse_imap_args("FLAGS BODY[HEADER.FIELDS (DATE FROM)]").unwrap(),
            ["FLAGS", "BODY[HEADER.FIELDS (DATE FROM)]"]
        );
        assert_eq!(
            parse_imap_args("(\"a b\" (c d) e)").unwrap(),
            ["a b", "(c d)", "e"]
        );
        assert_eq!(parse_imap_args("()").unwrap(), Vec::<String>::new());
        assert!(parse_imap_args("(unbalanced").is_none());
    }

    #[test]
    fn imap_dates() {
        assert_eq!(
            parse_imap_date("01-Jan-2020 00:00:00 +0000"),
            Some(1577836800)
        );
        assert_eq!(
            parse_imap_date(" 1-Jan-2020 01:00:00 +0100"),
            Some(1577836800)
        );
        assert_eq!(parse_imap_date("not a date"), None);
    }
}
