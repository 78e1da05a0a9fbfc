use crate::core::{message::Flags, reply::ReplyCode, Reply, Result};

use super::{bad, parse_imap_args};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Replace,
    Add,
    Remove,
}

pub fn parse_store_op(cmd: &str) -> Result<(StoreOp, bool)> {
    let upper = cmd.to_ascii_uppercase();
    let (name, silent) = match upper.strip_suffix(".SILENT") {
        Some(name) => (name.to_string(), true),
        None => (upper, false),
    };
    match name.as_str() {
        "FLAGS" => Ok((StoreOp::Replace, silent)),
        "+FLAGS" => Ok((StoreOp::Add, silent)),
        "-FLAGS" => Ok((StoreOp::Remove, silent)),
        _ => Err(bad()),
    }
}

/// A STORE flag list: parenthesized or a single keyword. `\Recent` is
/// accepted here (unlike APPEND).
pub fn parse_flag_list(input: &str) -> Result<Flags> {
    let names = if input.starts_with('(') {
        parse_imap_args(input).ok_or_else(bad)?
    } else {
        vec![input.to_string()]
    };
    let mut flags = Flags::empty();
    for name in &names {
        match Flags::parse_imap(name) {
            Some(flag) => flags.insert(flag),
            None => return Err(Reply::of(ReplyCode::FlagNotSupported)),
        }
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops() {
        assert_eq!(parse_store_op("FLAGS").unwrap(), (StoreOp::Replace, false));
        assert_eq!(
            parse_store_op("flags.silent").unwrap(),
            (StoreOp::Replace, true)
        );
        assert_eq!(parse_store_op("+FLAGS").unwrap(), (StoreOp::Add, false));
        assert_eq!(
            parse_store_op("-FLAGS.SILENT").unwrap(),
            (StoreOp::Remove, true)
        );
        assert!(parse_store_op("FLAG").is_err());
    }

    #[test]
    fn flag_lists() {
        let flags = parse_flag_list("(\\Seen \\Deleted)").unwrap();
        assert!(flags.contains(Flags::SEEN));
        assert!(flags.contains(Flags::DELETED));
        assert_eq!(parse_flag_list("\\Flagged").unwrap(), Flags::FLAGGED);
        assert_eq!(
            parse_flag_list("(\\Sticky)").unwrap_err().code,
            Some(ReplyCode::FlagNotSupported)
        );
    }
}
