//! Message digests.
//!
//! The index service stores one JSON digest per message: envelope headers,
//! flag bits and a MIME map with byte offsets into the EML file. FETCH is
//! answered from this digest plus ranged reads of the EML file; the raw
//! message is never parsed on the FETCH path. Digests for incoming APPENDs
//! (and for embedded message/rfc822 parts) are produced here with the
//! mail-parser stack.

use std::path::Path;

use mail_parser::{HeaderName, HeaderValue, MessageParser, MimeHeaders, PartType};
use serde_json::{json, Value};
use tracing::warn;

pub const MAX_RFC822_DEPTH: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct MimeNode {
    pub id: String,
    pub multi: bool,
    pub ctype: String,
    pub encoding: String,
    pub charset: String,
    pub filename: String,
    pub cid: String,
    pub cntl: String,
    pub cntdspn: String,
    pub head: u64,
    pub begin: u64,
    pub length: u64,
}

impl MimeNode {
    pub fn is_rfc822(&self) -> bool {
        self.ctype.eq_ignore_ascii_case("message/rfc822")
    }

    pub fn encoding_is_b(&self) -> bool {
        self.encoding.eq_ignore_ascii_case("base64")
    }

    pub fn encoding_is_q(&self) -> bool {
        self.encoding.eq_ignore_ascii_case("quoted-printable")
    }

    pub fn head_offset(&self) -> u64 {
        self.head
    }

    pub fn head_length(&self) -> u64 {
        self.begin - self.head
    }

    pub fn content_offset(&self) -> u64 {
        self.begin
    }

    pub fn content_length(&self) -> u64 {
        self.length
    }

    pub fn entire_length(&self) -> u64 {
        self.head_length() + self.length
    }
}

#[derive(Debug, Clone, Default)]
pub struct Digest {
    pub file: String,
    pub msgid: String,
    pub from: String,
    pub sender: String,
    pub reply: String,
    pub to: String,
    pub cc: String,
    pub inreply: String,
    pub subject: String,
    pub received: String,
    pub date: String,
    pub charset: String,
    pub size: u64,
    pub nodes: Vec<MimeNode>,
}

fn b64_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| base64::decode(s).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn node_from_value(value: &Value, multi: bool) -> MimeNode {
    MimeNode {
        id: str_field(value, "id"),
        multi,
        ctype: {
            let ctype = str_field(value, "ctype");
            if ctype.is_empty() {
                "application/octet-stream".to_string()
            } else {
                ctype
            }
        },
        encoding: str_field(value, "encoding"),
        charset: str_field(value, "charset"),
        filename: b64_field(value, "filename"),
        cid: b64_field(value, "cid"),
        cntl: b64_field(value, "cntl"),
        cntdspn: str_field(value, "cntdspn"),
        head: value.get("head").and_then(Value::as_u64).unwrap_or(0),
        begin: value.get("begin").and_then(Value::as_u64).unwrap_or(0),
        length: value.get("length").and_then(Value::as_u64).unwrap_or(0),
    }
}

impl Digest {
    pub fn from_value(value: &Value) -> Option<Digest> {
        let mut nodes = Vec::new();
        for (key, multi) in [("structure", true), ("mimes", false)] {
            if let Some(list) = value.get(key).and_then(Value::as_array) {
                for entry in list {
                    nodes.push(node_from_value(entry, multi));
                }
            }
        }
        if nodes.is_empty() {
            return None;
        }
        Some(Digest {
            file: str_field(value, "file"),
            msgid: b64_field(value, "msgid"),
            from: b64_field(value, "from"),
            sender: b64_field(value, "sender"),
            reply: b64_field(value, "reply"),
            to: b64_field(value, "to"),
            cc: b64_field(value, "cc"),
            inreply: b64_field(value, "inreply"),
            subject: b64_field(value, "subject"),
            received: b64_field(value, "received"),
            date: b64_field(value, "date"),
            charset: str_field(value, "charset"),
            size: value.get("size").and_then(Value::as_u64).unwrap_or(0),
            nodes,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut structure = Vec::new();
        let mut mimes = Vec::new();
        for node in &self.nodes {
            let entry = json!({
                "id": node.id,
                "ctype": node.ctype,
                "encoding": node.encoding,
                "charset": node.charset,
                "filename": base64::encode(&node.filename),
                "cid": base64::encode(&node.cid),
                "cntl": base64::encode(&node.cntl),
                "cntdspn": node.cntdspn,
                "head": node.head,
                "begin": node.begin,
                "length": node.length,
            });
            if node.multi {
                structure.push(entry);
            } else {
                mimes.push(entry);
            }
        }
        json!({
            "file": self.file,
            "msgid": base64::encode(&self.msgid),
            "from": base64::encode(&self.from),
            "sender": base64::encode(&self.sender),
            "reply": base64::encode(&self.reply),
            "to": base64::encode(&self.to),
            "cc": base64::encode(&self.cc),
            "inreply": base64::encode(&self.inreply),
            "subject": base64::encode(&self.subject),
            "received": base64::encode(&self.received),
            "date": base64::encode(&self.date),
            "charset": self.charset,
            "size": self.size,
            "structure": structure,
            "mimes": mimes,
        })
    }

    pub fn get_mime(&self, id: &str) -> Option<&MimeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Non-multipart messages only have a part 1, which is the whole body.
    pub fn get_mime_or_root(&self, id: &str) -> Option<&MimeNode> {
        self.get_mime(id)
            .or_else(|| if id == "1" { self.get_mime("") } else { None })
    }

    fn children_of(&self, id: &str) -> Vec<&MimeNode> {
        let prefix = if id.is_empty() {
            String::new()
        } else {
            format!("{}.", id)
        };
        let mut children: Vec<&MimeNode> = self
            .nodes
            .iter()
            .filter(|n| {
                !n.id.is_empty()
                    && n.id.starts_with(&prefix)
                    && !n.id[prefix.len()..].contains('.')
            })
            .collect();
        children.sort_by_key(|n| {
            n.id[prefix.len()..].parse::<u32>().unwrap_or(u32::MAX)
        });
        children
    }

    pub fn has_rfc822_part(&self) -> bool {
        self.nodes.iter().any(|n| n.is_rfc822())
    }

    pub fn rfc822_nodes(&self) -> impl Iterator<Item = &MimeNode> {
        self.nodes.iter().filter(|n| n.is_rfc822())
    }
}

fn is_ascii_printable(s: &str) -> bool {
    s.bytes().all(|b| (0x20..0x7f).contains(&b))
}

fn quote_imap(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn encoded_word(s: &str, charset: &str) -> String {
    format!(
        "\"=?{}?b?{}?=\"",
        if charset.is_empty() { "utf-8" } else { charset },
        base64::encode(s)
    )
}

fn quoted_or_encoded(s: &str, charset: &str) -> String {
    if is_ascii_printable(s) {
        quote_imap(s)
    } else {
        encoded_word(s, charset)
    }
}

/// Split an address list on top-level commas, honoring quoting and angle
/// brackets.
fn split_addresses(list: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let (mut start, mut in_quote, mut in_angle) = (0usize, false, false);
    let bytes = list.as_bytes();
    for (pos, &byte) in bytes.iter().enumerate() {
        match byte {
            b'"' => in_quote = !in_quote,
            b'<' if !in_quote => in_angle = true,
            b'>' if !in_quote => in_angle = false,
            b',' if !in_quote && !in_angle => {
                let piece = list[start..pos].trim();
                if !piece.is_empty() {
                    out.push(piece);
                }
                start = pos + 1;
            }
            _ => (),
        }
    }
    let piece = list[start..].trim();
    if !piece.is_empty() {
        out.push(piece);
    }
    out
}

/// `(name NIL mailbox host)`
fn render_address(addr: &str, charset: &str) -> String {
    let (name, spec) = match (addr.find('<'), addr.rfind('>')) {
        (Some(lt), Some(gt)) if lt < gt => {
            (addr[..lt].trim().trim_matches('"'), addr[lt + 1..gt].trim())
        }
        _ => ("", addr.trim()),
    };
    let mut out = String::with_capacity(32);
    if name.is_empty() {
        out.push_str("(NIL");
    } else {
        out.push('(');
        out.push_str(&quoted_or_encoded(name, charset));
    }
    out.push_str(" NIL");
    let (local, domain) = match spec.rfind('@') {
        Some(at) => (&spec[..at], &spec[at + 1..]),
        None => (spec, ""),
    };
    if local.is_empty() {
        out.push_str(" NIL");
    } else {
        out.push(' ');
        out.push_str(&quote_imap(local));
    }
    if domain.is_empty() {
        out.push_str(" NIL)");
    } else {
        out.push(' ');
        out.push_str(&quote_imap(domain));
        out.push(')');
    }
    out
}

fn render_address_list(list: &str, charset: &str, buf: &mut String) {
    let pieces = split_addresses(list);
    if pieces.is_empty() {
        buf.push_str(" NIL");
        return;
    }
    buf.push_str(" (");
    for (pos, piece) in pieces.iter().enumerate() {
        if pos > 0 {
            buf.push(' ');
        }
        buf.push_str(&render_address(piece, charset));
    }
    buf.push(')');
}

impl Digest {
    /// RFC 3501 section 7.4.2 ENVELOPE.
    pub fn fetch_envelope(&self, charset: &str) -> String {
        let cset = if !self.charset.is_empty() {
            self.charset.as_str()
        } else {
            charset
        };
        let mut buf = String::with_capacity(256);
        buf.push('(');
        if !self.date.is_empty() && is_ascii_printable(&self.date) {
            buf.push_str(&quote_imap(&self.date));
        } else {
            buf.push_str("NIL");
        }
        if self.subject.is_empty() {
            buf.push_str(" NIL");
        } else {
            buf.push(' ');
            buf.push_str(&quoted_or_encoded(&self.subject, cset));
        }
        let sender = if self.sender.is_empty() {
            &self.from
        } else {
            &self.sender
        };
        let reply = if self.reply.is_empty() {
            &self.from
        } else {
            &self.reply
        };
        for field in [&self.from, sender, reply] {
            if field.is_empty() {
                buf.push_str(" NIL");
            } else {
                buf.push_str(" (");
                buf.push_str(&render_address(field, cset));
                buf.push(')');
            }
        }
        render_address_list(&self.to, cset, &mut buf);
        render_address_list(&self.cc, cset, &mut buf);
        buf.push_str(" NIL"); // bcc
        if !self.inreply.is_empty() && is_ascii_printable(&self.inreply) {
            buf.push(' ');
            buf.push_str(&quote_imap(&self.inreply));
        } else {
            buf.push_str(" NIL");
        }
        if !self.msgid.is_empty() && is_ascii_printable(&self.msgid) {
            buf.push(' ');
            buf.push_str(&quote_imap(&self.msgid));
        } else {
            buf.push_str(" NIL");
        }
        buf.push(')');
        buf
    }

    /// BODY (ext=false) / BODYSTRUCTURE (ext=true). When `storage` is given,
    /// embedded message/rfc822 parts are resolved against the materialised
    /// tree under it and rendered with their own envelope and structure.
    pub fn fetch_structure(
        &self,
        charset: &str,
        ext: bool,
        storage: Option<&Path>,
    ) -> Option<String> {
        let mut buf = String::with_capacity(256);
        self.render_node(self.get_mime("")?, charset, ext, storage, 0, &mut buf)?;
        Some(buf)
    }

    fn render_node(
        &self,
        node: &MimeNode,
        charset: &str,
        ext: bool,
        storage: Option<&Path>,
        depth: usize,
        buf: &mut String,
    ) -> Option<()> {
        if depth > 16 {
            return None;
        }
        let (ctype, subtype) = match node.ctype.split_once('/') {
            Some((t, s)) => (t.to_uppercase(), Some(s.to_uppercase())),
            None => (node.ctype.to_uppercase(), None),
        };
        if node.multi {
            buf.push('(');
            let children = self.children_of(&node.id);
            if children.is_empty() {
                return None;
            }
            for child in children {
                self.render_node(child, charset, ext, storage, depth + 1, buf)?;
            }
            match &subtype {
                Some(subtype) => {
                    buf.push(' ');
                    buf.push_str(&quote_imap(subtype));
                }
                None => buf.push_str(" NIL"),
            }
            if ext {
                buf.push_str(" NIL NIL NIL");
            }
            buf.push(')');
            return Some(());
        }

        buf.push('(');
        buf.push_str(&quote_imap(&ctype));
        match &subtype {
            Some(subtype) => {
                buf.push(' ');
                buf.push_str(&quote_imap(subtype));
            }
            None => buf.push_str(" NIL"),
        }
        // body parameters
        let charset_param = if !node.charset.is_empty() {
            Some(node.charset.as_str())
        } else if ctype == "TEXT" && !self.charset.is_empty() {
            Some(self.charset.as_str())
        } else {
            None
        };
        if charset_param.is_some() || !node.filename.is_empty() {
            buf.push_str(" (");
            let mut wrote = false;
            if let Some(cs) = charset_param {
                buf.push_str("\"CHARSET\" ");
                buf.push_str(&quote_imap(cs));
                wrote = true;
            }
            if !node.filename.is_empty() {
                if wrote {
                    buf.push(' ');
                }
                buf.push_str("\"NAME\" ");
                buf.push_str(&quoted_or_encoded(&node.filename, charset));
            }
            buf.push(')');
        } else {
            buf.push_str(" NIL");
        }
        // content id
        if !node.cid.is_empty() && is_ascii_printable(&node.cid) {
            buf.push(' ');
            buf.push_str(&quote_imap(&node.cid));
        } else {
            buf.push_str(" NIL");
        }
        // body description
        buf.push_str(" NIL");
        // encoding
        let rfc822_storage = storage.filter(|_| node.is_rfc822());
        if node.encoding.is_empty() {
            buf.push_str(" NIL");
        } else if rfc822_storage.is_some() && (node.encoding_is_b() || node.encoding_is_q()) {
            // The materialised copy is stored decoded.
            buf.push_str(" \"7bit\"");
        } else {
            buf.push(' ');
            buf.push_str(&quote_imap(&node.encoding));
        }
        // size
        if let Some(storage) = rfc822_storage.filter(|_| node.encoding_is_b() || node.encoding_is_q()) {
            match std::fs::metadata(storage.join(&node.id)) {
                Ok(meta) => buf.push_str(&format!(" {}", meta.len())),
                Err(_) => buf.push_str(" NIL"),
            }
        } else {
            buf.push_str(&format!(" {}", node.length));
        }
        if ctype == "TEXT" {
            buf.push_str(" 0");
        }
        // Embedded message: envelope and structure of the materialised copy.
        let mut nested_done = false;
        if let Some(storage) = rfc822_storage {
            if let Some(nested) = load_digest(&storage.join(format!("{}.dgt", node.id))) {
                buf.push(' ');
                buf.push_str(&nested.fetch_envelope(charset));
                buf.push(' ');
                if let Some(body) = nested.fetch_structure(charset, ext, None) {
                    buf.push_str(&body);
                    nested_done = true;
                } else {
                    buf.push_str("NIL");
                    nested_done = true;
                }
            }
        }
        if ext && !nested_done {
            buf.push_str(" NIL"); // body MD5
            if node.cntdspn.is_empty() {
                buf.push_str(" NIL");
            } else {
                buf.push_str(&format!(" ({} NIL)", quote_imap(&node.cntdspn)));
            }
            buf.push_str(" NIL"); // body language
            if !node.cntl.is_empty() && is_ascii_printable(&node.cntl) {
                buf.push(' ');
                buf.push_str(&quote_imap(&node.cntl));
            } else {
                buf.push_str(" NIL");
            }
        }
        buf.push(')');
        Some(())
    }
}

fn load_digest(path: &Path) -> Option<Digest> {
    let data = std::fs::read(path).ok()?;
    let value: Value = serde_json::from_slice(&data).ok()?;
    Digest::from_value(&value)
}

fn header_raw<'x>(raw: &'x [u8], part: &mail_parser::MessagePart, name: HeaderName) -> &'x str {
    for header in part.headers.iter() {
        if header.name == name {
            if let Some(bytes) = raw.get(header.offset_start..header.offset_end) {
                return std::str::from_utf8(bytes).unwrap_or("").trim();
            }
        }
    }
    ""
}

fn header_text(part: &mail_parser::MessagePart, name: HeaderName) -> String {
    for header in part.headers.iter() {
        if header.name == name {
            if let HeaderValue::Text(text) = &header.value {
                return text.trim().to_string();
            }
        }
    }
    String::new()
}

/// Digest a raw RFC 5322 message. `filename` lands in the digest's `file`
/// field (the mid for a stored mail, the part id for a materialised one).
pub fn digest_message(raw: &[u8], filename: &str) -> Option<Digest> {
    let message = MessageParser::default().parse(raw)?;
    let root = message.root_part();

    let mut digest = Digest {
        file: filename.to_string(),
        msgid: message
            .message_id()
            .map(|id| format!("<{}>", id))
            .unwrap_or_default(),
        from: header_raw(raw, root, HeaderName::From).to_string(),
        sender: header_raw(raw, root, HeaderName::Sender).to_string(),
        reply: header_raw(raw, root, HeaderName::ReplyTo).to_string(),
        to: header_raw(raw, root, HeaderName::To).to_string(),
        cc: header_raw(raw, root, HeaderName::Cc).to_string(),
        inreply: header_raw(raw, root, HeaderName::InReplyTo).to_string(),
        subject: message.subject().unwrap_or("").to_string(),
        received: header_raw(raw, root, HeaderName::Received)
            .split_once(';')
            .map(|(_, date)| date.trim().to_string())
            .unwrap_or_default(),
        date: header_raw(raw, root, HeaderName::Date).to_string(),
        charset: root
            .content_type()
            .and_then(|ct| ct.attribute("charset"))
            .unwrap_or("")
            .to_string(),
        size: raw.len() as u64,
        nodes: Vec::new(),
    };

    // Walk the part tree assigning dotted ids.
    let mut stack: Vec<(usize, String)> = vec![(0, String::new())];
    while let Some((part_id, id)) = stack.pop() {
        let part = message.parts.get(part_id)?;
        let ctype = part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| "text/plain".to_string());
        let multi = matches!(part.body, PartType::Multipart(_));
        digest.nodes.push(MimeNode {
            id: id.clone(),
            multi,
            ctype,
            encoding: header_text(part, HeaderName::ContentTransferEncoding),
            charset: part
                .content_type()
                .and_then(|ct| ct.attribute("charset"))
                .unwrap_or("")
                .to_string(),
            filename: part.attachment_name().unwrap_or("").to_string(),
            cid: part
                .content_id()
                .map(|cid| format!("<{}>", cid))
                .unwrap_or_default(),
            cntl: part.content_location().unwrap_or("").to_string(),
            cntdspn: part
                .content_disposition()
                .map(|cd| cd.ctype().to_string())
                .unwrap_or_default(),
            head: part.offset_header as u64,
            begin: part.offset_body as u64,
            length: (part.offset_end - part.offset_body) as u64,
        });
        if let PartType::Multipart(children) = &part.body {
            for (pos, &child) in children.iter().enumerate().rev() {
                let child_id = if id.is_empty() {
                    format!("{}", pos + 1)
                } else {
                    format!("{}.{}", id, pos + 1)
                };
                stack.push((child, child_id));
            }
        }
    }
    Some(digest)
}

fn decode_qp(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        if byte != b'=' {
            out.push(byte);
            continue;
        }
        match (iter.next(), iter.peek().copied()) {
            (Some(b'\r'), Some(b'\n')) => {
                iter.next();
            }
            (Some(b'\n'), _) => (),
            (Some(hi), Some(lo)) => {
                let hex = [(hi as char).to_digit(16), (lo as char).to_digit(16)];
                if let [Some(hi), Some(lo)] = hex {
                    out.push((hi * 16 + lo) as u8);
                    iter.next();
                } else {
                    out.push(b'=');
                    out.push(hi);
                }
            }
            (Some(other), None) => {
                out.push(b'=');
                out.push(other);
            }
            (None, _) => out.push(b'='),
        }
    }
    out
}

fn decode_part_content(node: &MimeNode, raw: &[u8]) -> Vec<u8> {
    if node.encoding_is_b() {
        let filtered: Vec<u8> = raw
            .iter()
            .copied()
            .filter(|b| !b" \t\r\n".contains(b))
            .collect();
        base64::decode(&filtered).unwrap_or_else(|_| raw.to_vec())
    } else if node.encoding_is_q() {
        decode_qp(raw)
    } else {
        raw.to_vec()
    }
}

/// Materialise every embedded message/rfc822 part of `digest` under
/// `storage/<file>/`, writing `<id>` (raw message) and `<id>.dgt` (digest)
/// for each, recursively up to `MAX_RFC822_DEPTH`.
pub fn rfc822_build(digest: &Digest, eml_path: &Path, storage: &Path) -> bool {
    if !digest.has_rfc822_part() {
        return false;
    }
    let base = storage.join(&digest.file);
    if let Err(err) = std::fs::create_dir_all(&base) {
        warn!("mkdir {}: {}", base.display(), err);
        return false;
    }
    let raw = match std::fs::read(eml_path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("read {}: {}", eml_path.display(), err);
            return false;
        }
    };
    build_level(digest, &raw, &base, 1)
}

fn build_level(digest: &Digest, raw: &[u8], base: &Path, depth: usize) -> bool {
    if depth > MAX_RFC822_DEPTH {
        return true;
    }
    for node in digest.rfc822_nodes() {
        let start = node.content_offset() as usize;
        let end = start + node.content_length() as usize;
        let content = match raw.get(start..end) {
            Some(content) => decode_part_content(node, content),
            None => return false,
        };
        let name = if depth == 1 {
            node.id.clone()
        } else {
            format!("{}.{}", digest.file, node.id)
        };
        let nested = match digest_message(&content, &name) {
            Some(nested) => nested,
            None => return false,
        };
        let msg_path = base.join(&name);
        if std::fs::write(&msg_path, &content).is_err() {
            return false;
        }
        let dgt_path = base.join(format!("{}.dgt", name));
        if std::fs::write(&dgt_path, nested.to_value().to_string()).is_err() {
            let _ = std::fs::remove_file(&msg_path);
            return false;
        }
        if nested.has_rfc822_part() && !build_level(&nested, &content, base, depth + 1) {
            return false;
        }
    }
    true
}

/// Resolve a section id like `2.1.3` against the materialised tree: the
/// longest id prefix with a digest file wins; the remainder addresses a part
/// within that embedded message. Returns the nested digest and the
/// remaining id.
pub fn rfc822_get(digest: &Digest, storage: &Path, id: &str) -> Option<(Digest, String)> {
    let base = storage.join(&digest.file);
    if !base.is_dir() {
        return None;
    }
    let segments: Vec<&str> = id.split('.').collect();
    for cut in (1..segments.len()).rev() {
        let prefix = segments[..cut].join(".");
        if let Some(nested) = load_digest(&base.join(format!("{}.dgt", prefix))) {
            return Some((nested, segments[cut..].join(".")));
        }
    }
    None
}

/// Path of the raw bytes belonging to a digest: either the EML file itself
/// or a materialised embedded message.
pub fn digest_file_path(maildir: &Path, storage_file: Option<&str>, digest: &Digest) -> std::path::PathBuf {
    match storage_file {
        Some(root) => maildir
            .join("tmp/imap.rfc822")
            .join(root)
            .join(&digest.file),
        None => maildir.join("eml").join(&digest.file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "From: Alice <alice@example.com>\r\n\
        To: Bob <bob@example.com>, carol@example.com\r\n\
        Subject: Greetings\r\n\
        Date: Mon, 6 Feb 2023 10:11:12 +0000\r\n\
        Message-ID: <m1@example.com>\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        hello world\r\n";

    const MULTI: &str = "From: a@b.c\r\n\
        Subject: mixed\r\n\
        MIME-Version: 1.0\r\n\
        Content-Type: multipart/mixed; boundary=XX\r\n\
        \r\n\
        --XX\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        body text\r\n\
        --XX\r\n\
        Content-Type: application/pdf; name=doc.pdf\r\n\
        Content-Transfer-Encoding: base64\r\n\
        \r\n\
        AAAA\r\n\
        --XX--\r\n";

    #[test]
    fn digest_simple_message() {
        let digest = digest_message(SIMPLE.as_bytes(), "mid1").unwrap();
        assert_eq!(digest.subject, "Greetings");
        assert_eq!(digest.msgid, "<m1@example.com>");
        assert_eq!(digest.size, SIMPLE.len() as u64);
        let root = digest.get_mime("").unwrap();
        assert!(!root.multi);
        assert_eq!(root.ctype, "text/plain");
        assert_eq!(
            &SIMPLE.as_bytes()[root.content_offset() as usize
                ..(root.content_offset() + root.content_length()) as usize],
            b"hello world\r\n"
        );
        // round trip through the JSON form
        let reparsed = Digest::from_value(&digest.to_value()).unwrap();
        assert_eq!(reparsed.subject, digest.subject);
        assert_eq!(reparsed.nodes.len(), digest.nodes.len());
    }

    #[test]
    fn digest_multipart() {
        let digest = digest_message(MULTI.as_bytes(), "mid2").unwrap();
        let root = digest.get_mime("").unwrap();
        assert!(root.multi);
        assert_eq!(digest.get_mime("1").unwrap().ctype, "text/plain");
        assert_eq!(digest.get_mime("2").unwrap().ctype, "application/pdf");
        assert_eq!(digest.get_mime("2").unwrap().encoding, "base64");
        assert!(digest.get_mime("3").is_none());
    }

    #[test]
    fn envelope_render() {
        let digest = digest_message(SIMPLE.as_bytes(), "mid1").unwrap();
        let envelope = digest.fetch_envelope("us-ascii");
        assert!(envelope.starts_with("(\"Mon, 6 Feb 2023 10:11:12 +0000\" \"Greetings\""));
        assert!(envelope.contains("(\"Alice\" NIL \"alice\" \"example.com\")"));
        assert!(envelope.contains("((\"Bob\" NIL \"bob\" \"example.com\") (NIL NIL \"carol\" \"example.com\"))"));
        assert!(envelope.ends_with("NIL \"<m1@example.com>\")"));
    }

    #[test]
    fn structure_render() {
        let digest = digest_message(MULTI.as_bytes(), "mid2").unwrap();
        let body = digest.fetch_structure("us-ascii", false, None).unwrap();
        assert!(body.starts_with("((\"TEXT\" \"PLAIN\""));
        assert!(body.contains("\"APPLICATION\" \"PDF\""));
        assert!(body.ends_with(" \"MIXED\")"));

        let simple = digest_message(SIMPLE.as_bytes(), "mid1").unwrap();
        let body = simple.fetch_structure("us-ascii", false, None).unwrap();
        assert!(body.starts_with("(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\")"));
        assert!(body.ends_with(" 0)"));
    }

    #[test]
    fn qp_decoding() {
        assert_eq!(decode_qp(b"a=20b"), b"a b");
        assert_eq!(decode_qp(b"line=\r\nwrap"), b"linewrap");
        assert_eq!(decode_qp(b"plain"), b"plain");
    }
}
