use crate::core::{message::Flags, Result};

use super::{arg_str, bad, parse_imap_args};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendArguments {
    /// IMAP-form mailbox name, as sent by the client.
    pub mailbox: String,
    pub flags: Flags,
    /// Raw internal-date string, validated when the message is finalised.
    pub internal_date: Option<String>,
}

/// APPEND up to (but excluding) the message literal:
/// `mailbox [(flags)] ["date"] {N}`.
pub fn parse_append(args: &[Vec<u8>]) -> Result<AppendArguments> {
    if args.is_empty() || args.len() > 3 {
        return Err(bad());
    }
    let mailbox = arg_str(&args[0])?.to_string();
    if mailbox.is_empty() {
        return Err(bad());
    }
    let (flags_arg, date_arg) = match args.len() {
        3 => (Some(arg_str(&args[1])?), Some(arg_str(&args[2])?)),
        2 => {
            let arg = arg_str(&args[1])?;
            if arg.starts_with('(') {
                (Some(arg), None)
            } else {
                (None, Some(arg))
            }
        }
        _ => (None, None),
    };
    let mut flags = Flags::empty();
    if let Some(flags_arg) = flags_arg {
        if !flags_arg.starts_with('(') {
            return Err(bad());
        }
        for name in parse_imap_args(flags_arg).ok_or_else(bad)? {
            match Flags::parse_imap(&name) {
                Some(flag) if flag != Flags::RECENT && flag != Flags::DELETED => {
                    flags.insert(flag)
                }
                _ => return Err(bad()),
            }
        }
    }
    Ok(AppendArguments {
        mailbox,
        flags,
        internal_date: date_arg.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn variants() {
        let parsed = parse_append(&args(&["INBOX"])).unwrap();
        assert_eq!(parsed.mailbox, "INBOX");
        assert!(parsed.flags.is_empty());
        assert_eq!(parsed.internal_date, None);

        let parsed = parse_append(&args(&["INBOX", "(\\Seen \\Draft)"])).unwrap();
        assert!(parsed.flags.contains(Flags::SEEN));
        assert!(parsed.flags.contains(Flags::DRAFT));

        let parsed =
            parse_append(&args(&["saved", "(\\Seen)", "07-Feb-1994 22:43:04 -0800"]))
                .unwrap();
        assert_eq!(
            parsed.internal_date.as_deref(),
            Some("07-Feb-1994 22:43:04 -0800")
        );

        let parsed = parse_append(&args(&["saved", "07-Feb-1994 22:43:04 -0800"])).unwrap();
        assert!(parsed.flags.is_empty());
        assert!(parsed.internal_date.is_some());
    }

    #[test]
    fn rejects() {
        assert!(parse_append(&args(&[])).is_err());
        assert!(parse_append(&args(&["INBOX", "(\\Recent)"])).is_err());
        assert!(parse_append(&args(&["INBOX", "(\\Sticky)"])).is_err());
    }
}
