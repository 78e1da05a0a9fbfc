//! Modified UTF-7 for mailbox names, RFC 3501 section 5.1.3.
//!
//! Printable US-ASCII except `&` is written directly; everything else is
//! carried in `&...-` runs holding base64 of UTF-16BE code units, with `,`
//! standing in for `/` and no padding. `&` itself is written `&-`.

fn push_shifted(out: &mut String, pending: &mut Vec<u16>) {
    if pending.is_empty() {
        return;
    }
    let mut bytes = Vec::with_capacity(pending.len() * 2);
    for unit in pending.iter() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    out.push('&');
    out.push_str(
        &base64::encode_config(&bytes, base64::STANDARD_NO_PAD).replace('/', ","),
    );
    out.push('-');
    pending.clear();
}

pub fn utf8_to_mutf7(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut pending: Vec<u16> = Vec::new();
    for ch in input.chars() {
        if ch == '&' {
            push_shifted(&mut out, &mut pending);
            out.push_str("&-");
        } else if (' '..='~').contains(&ch) {
            push_shifted(&mut out, &mut pending);
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            pending.extend_from_slice(ch.encode_utf16(&mut units));
        }
    }
    push_shifted(&mut out, &mut pending);
    out
}

pub fn mutf7_to_utf8(input: &str) -> Option<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch != '&' {
            out.push(ch);
            continue;
        }
        let mut shifted = String::new();
        loop {
            match chars.next() {
                Some('-') => break,
                Some(c) => shifted.push(c),
                None => return None,
            }
        }
        if shifted.is_empty() {
            out.push('&');
            continue;
        }
        let bytes = base64::decode_config(
            shifted.replace(',', "/"),
            base64::STANDARD_NO_PAD,
        )
        .ok()?;
        if bytes.len() % 2 != 0 {
            return None;
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        out.push_str(&String::from_utf16(&units).ok()?);
    }
    Some(out)
}
