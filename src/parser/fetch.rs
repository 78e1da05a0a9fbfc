//! FETCH data-item parsing: macros, plain attributes and the
//! `BODY[section]<offset.length>` grammar.

use crate::core::Result;

use super::{bad, parse_imap_args};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionItem {
    Header,
    Text,
    Mime,
    HeaderFields { not: bool, fields: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySection {
    /// Response label after "BODY": `[section]` plus `<offset>` when a
    /// partial was requested (the length is not echoed).
    pub label: String,
    pub peek: bool,
    /// Dotted part numbers, empty for the whole message.
    pub part_id: String,
    pub item: Option<SectionItem>,
    pub offset: u64,
    pub length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttr {
    Uid,
    Flags,
    InternalDate,
    Rfc822Size,
    Envelope,
    Rfc822Header,
    Rfc822Text,
    Rfc822,
    Body,
    BodyStructure,
    Section(BodySection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchArguments {
    pub attrs: Vec<FetchAttr>,
    /// Full digests must be loaded from the index service.
    pub needs_detail: bool,
    /// Raw octets will be streamed out of the EML file.
    pub needs_data: bool,
}

fn parse_partial(after: &str) -> Result<(u64, Option<u64>)> {
    if after.is_empty() {
        return Ok((0, None));
    }
    let inner = after
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(bad)?;
    if inner.is_empty() || inner.starts_with('.') || inner.ends_with('.') {
        return Err(bad());
    }
    match inner.split_once('.') {
        Some((offset, length)) => {
            if length.contains('.') {
                return Err(bad());
            }
            Ok((
                offset.parse().map_err(|_| bad())?,
                Some(length.parse().map_err(|_| bad())?),
            ))
        }
        None => Ok((inner.parse().map_err(|_| bad())?, None)),
    }
}

fn parse_body_section(token: &str, peek: bool) -> Result<BodySection> {
    let open = token.find('[').ok_or_else(bad)?;
    let close = token.find(']').ok_or_else(bad)?;
    if close < open {
        return Err(bad());
    }
    let section = &token[open + 1..close];
    let after = &token[close + 1..];
    if section.len() >= 1024 {
        return Err(bad());
    }
    if section.to_ascii_uppercase().starts_with("MIME") {
        return Err(bad());
    }

    // Leading dotted digit segments form the part specifier.
    let mut seg_start = 0usize;
    for (pos, ch) in section.char_indices() {
        if ch == '.' {
            let segment = &section[seg_start..pos];
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                seg_start = pos + 1;
            } else {
                break;
            }
        }
    }
    let rest = &section[seg_start..];

    let (part_id, item) = if section.is_empty() {
        (String::new(), None)
    } else if rest.is_empty() {
        // trailing dot, e.g. "1.2."
        return Err(bad());
    } else if rest.bytes().all(|b| b.is_ascii_digit()) {
        (section.to_string(), None)
    } else {
        let part_id = if seg_start > 0 {
            section[..seg_start - 1].to_string()
        } else {
            String::new()
        };
        let upper = rest.to_ascii_uppercase();
        let item = if upper == "HEADER" {
            SectionItem::Header
        } else if upper == "TEXT" {
            SectionItem::Text
        } else if upper == "MIME" {
            SectionItem::Mime
        } else if upper.starts_with("HEADER.FIELDS ") || upper.starts_with("HEADER.FIELDS.NOT ")
        {
            let not = upper.starts_with("HEADER.FIELDS.NOT ");
            let names = &rest[if not { 18 } else { 14 }..];
            let fields = parse_imap_args(names).ok_or_else(bad)?;
            if fields.is_empty() {
                return Err(bad());
            }
            SectionItem::HeaderFields { not, fields }
        } else {
            return Err(bad());
        };
        (part_id, Some(item))
    };

    let (offset, length) = parse_partial(after)?;
    let mut label = format!("[{}]", section);
    if !after.is_empty() {
        label.push_str(&format!("<{}>", offset));
    }
    Ok(BodySection {
        label,
        peek,
        part_id,
        item,
        offset,
        length,
    })
}

fn rank(attr: &FetchAttr) -> u32 {
    match attr {
        FetchAttr::Uid => 0,
        FetchAttr::Flags => 1,
        FetchAttr::InternalDate => 2,
        FetchAttr::Rfc822Size => 3,
        FetchAttr::Envelope => 4,
        FetchAttr::Rfc822Header => 5,
        FetchAttr::Rfc822Text => 6,
        FetchAttr::Section(_) => 50,
        FetchAttr::Body => 100,
        FetchAttr::BodyStructure => 101,
        FetchAttr::Rfc822 => 102,
    }
}

/// Parse a FETCH attribute list: a single attribute, a parenthesized list,
/// or one of the ALL/FAST/FULL macros (which cannot be mixed with others).
/// UID is always included and the emitted order is stabilised.
pub fn parse_fetch_args(input: &str) -> Result<FetchArguments> {
    let tokens = parse_imap_args(input).ok_or_else(bad)?;
    if tokens.is_empty() {
        return Err(bad());
    }

    let mut seen: Vec<String> = vec!["UID".to_string()];
    let mut attrs = vec![FetchAttr::Uid];
    let mut macro_seen = false;
    let mut macro_count = 0usize;

    for token in &tokens {
        let upper = token.to_ascii_uppercase();
        if seen.contains(&upper) {
            continue;
        }
        seen.push(upper.clone());
        macro_count += 1;
        match upper.as_str() {
            "ALL" | "FAST" | "FULL" => {
                macro_seen = true;
                attrs.push(FetchAttr::Flags);
                attrs.push(FetchAttr::InternalDate);
                attrs.push(FetchAttr::Rfc822Size);
                if upper != "FAST" {
                    attrs.push(FetchAttr::Envelope);
                }
                if upper == "FULL" {
                    attrs.push(FetchAttr::Body);
                }
            }
            "BODY" => attrs.push(FetchAttr::Body),
            "BODYSTRUCTURE" => attrs.push(FetchAttr::BodyStructure),
            "ENVELOPE" => attrs.push(FetchAttr::Envelope),
            "FLAGS" => attrs.push(FetchAttr::Flags),
            "INTERNALDATE" => attrs.push(FetchAttr::InternalDate),
            "RFC822" => attrs.push(FetchAttr::Rfc822),
            "RFC822.HEADER" => attrs.push(FetchAttr::Rfc822Header),
            "RFC822.SIZE" => attrs.push(FetchAttr::Rfc822Size),
            "RFC822.TEXT" => attrs.push(FetchAttr::Rfc822Text),
            "UID" => attrs.push(FetchAttr::Uid),
            _ if upper.starts_with("BODY[") => {
                attrs.push(FetchAttr::Section(parse_body_section(token, false)?));
            }
            _ if upper.starts_with("BODY.PEEK[") => {
                attrs.push(FetchAttr::Section(parse_body_section(token, true)?));
            }
            _ => return Err(bad()),
        }
    }
    if macro_seen && macro_count > 1 {
        return Err(bad());
    }

    // Deduplicate what macro expansion may have doubled.
    let mut unique: Vec<FetchAttr> = Vec::with_capacity(attrs.len());
    for attr in attrs {
        if !unique.contains(&attr) {
            unique.push(attr);
        }
    }

    let mut needs_detail = false;
    let mut needs_data = false;
    for attr in &unique {
        match attr {
            FetchAttr::Rfc822 | FetchAttr::Rfc822Header | FetchAttr::Rfc822Text => {
                needs_detail = true;
                needs_data = true;
            }
            FetchAttr::Body
            | FetchAttr::BodyStructure
            | FetchAttr::Envelope
            | FetchAttr::InternalDate
            | FetchAttr::Rfc822Size => needs_detail = true,
            FetchAttr::Section(section) => {
                needs_detail = true;
                if !matches!(section.item, Some(SectionItem::HeaderFields { .. })) {
                    needs_data = true;
                }
            }
            FetchAttr::Uid | FetchAttr::Flags => (),
        }
    }

    let mut attrs = unique;
    attrs.sort_by_key(rank);
    Ok(FetchArguments {
        attrs,
        needs_detail,
        needs_data,
    })
}
