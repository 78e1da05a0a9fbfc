use crate::core::Result;

use super::{arg_str, bad};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListArguments {
    /// Selection option `LIST (SPECIAL-USE) ...`: only special folders.
    pub filter_special: bool,
    /// Return option `... RETURN (SPECIAL-USE)`: annotate with markers.
    pub return_special: bool,
    pub reference: String,
    pub pattern: String,
}

pub fn parse_list(args: &[Vec<u8>]) -> Result<ListArguments> {
    let mut pos = 0;
    let filter_special = match args.first() {
        Some(first) => arg_str(first)?.eq_ignore_ascii_case("(SPECIAL-USE)"),
        None => false,
    };
    if filter_special {
        pos += 1;
    }
    if args.len() < pos + 2 {
        return Err(bad());
    }
    let reference = arg_str(&args[pos])?.to_string();
    let pattern = arg_str(&args[pos + 1])?.to_string();
    if reference.len() + pattern.len() >= 1024 {
        return Err(bad());
    }
    let mut return_special = filter_special;
    if args.len() >= pos + 4
        && arg_str(&args[pos + 2])?.eq_ignore_ascii_case("RETURN")
        && arg_str(&args[pos + 3])?.eq_ignore_ascii_case("(SPECIAL-USE)")
    {
        return_special = true;
    }
    Ok(ListArguments {
        filter_special,
        return_special,
        reference,
        pattern,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn plain() {
        let parsed = parse_list(&args(&["", "Archive/*"])).unwrap();
        assert!(!parsed.filter_special);
        assert!(!parsed.return_special);
        assert_eq!(parsed.reference, "");
        assert_eq!(parsed.pattern, "Archive/*");
    }

    #[test]
    fn special_use_options() {
        let parsed = parse_list(&args(&["(SPECIAL-USE)", "", "%"])).unwrap();
        assert!(parsed.filter_special);
        assert!(parsed.return_special);

        let parsed =
            parse_list(&args(&["", "%", "RETURN", "(SPECIAL-USE)"])).unwrap();
        assert!(!parsed.filter_special);
        assert!(parsed.return_special);

        assert!(parse_list(&args(&["onlyref"])).is_err());
    }
}
