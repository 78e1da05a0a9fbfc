use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

use crate::{
    core::{
        client::{Phase, Session},
        message::Flags,
        receiver::Request,
        reply::ReplyCode,
        writer::Fragment,
        Reply, Result,
    },
    mjson::{self, Digest},
    parser::{
        arg_str,
        fetch::{parse_fetch_args, BodySection, FetchArguments, FetchAttr, SectionItem},
        sequence::{parse_sequence_set, seq_to_uids},
    },
};

const MAX_FIELD_REGION: u64 = 128 * 1024;

fn flush(buf: &mut String, frags: &mut Vec<Fragment>) {
    if !buf.is_empty() {
        frags.push(Fragment::Bytes(std::mem::take(buf).into_bytes()));
    }
}

fn internal_date_string(digest: Option<&Digest>, mid: &str) -> String {
    let timestamp = digest
        .filter(|d| !d.received.is_empty())
        .and_then(|d| DateTime::parse_from_rfc2822(&d.received).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| {
            mid.split('.')
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0)
        });
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format("%d-%b-%Y %H:%M:%S %z").to_string(),
        None => "01-Jan-1970 00:00:00 +0000".to_string(),
    }
}

fn clamp_region(region_len: u64, offset: u64, length: Option<u64>) -> Option<(u64, u64)> {
    if offset >= region_len {
        return None;
    }
    let length = length.unwrap_or(region_len).min(region_len - offset);
    Some((offset, length))
}

/// Filter the raw header region by field name; continuation lines stay with
/// their field. A trailing CRLF terminates the selection, as a full header
/// block would.
fn match_imap_fields(raw: &[u8], fields: &[String], not: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut pos = 0;
    while pos < raw.len() {
        let start = pos;
        loop {
            let eol = match raw[pos..].iter().position(|&b| b == b'\n') {
                Some(rel) => pos + rel + 1,
                None => raw.len(),
            };
            pos = eol;
            if !matches!(raw.get(pos), Some(&b' ') | Some(&b'\t')) {
                break;
            }
        }
        let field = &raw[start..pos];
        if field.is_empty() || field == &b"\r\n"[..] || field == &b"\n"[..] {
            break;
        }
        let colon = match field.iter().position(|&b| b == b':') {
            Some(colon) => colon,
            None => break,
        };
        let name = std::str::from_utf8(&field[..colon]).unwrap_or("").trim();
        let hit = fields.iter().any(|f| f.eq_ignore_ascii_case(name));
        if hit != not {
            out.extend_from_slice(field);
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

impl Session {
    pub async fn handle_fetch(&mut self, request: Request, is_uid: bool) -> Result<Reply> {
        if self.phase != Phase::Select {
            return Err(Reply::of(ReplyCode::OnlyInSelect));
        }
        if request.args.len() != 2 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let ranges = parse_sequence_set(arg_str(&request.args[0])?)?;
        let arguments = parse_fetch_args(arg_str(&request.args[1])?)?;
        let ok_code = if is_uid {
            ReplyCode::UidFetchOk
        } else {
            ReplyCode::FetchOk
        };

        let folder = self.selected.as_ref().unwrap().folder.clone();
        let maildir = self.maildir();
        let uid_ranges = if is_uid {
            ranges
        } else {
            seq_to_uids(&ranges, &self.selected.as_ref().unwrap().contents)
        };
        let items = if arguments.needs_detail {
            self.core
                .store
                .fetch_detail_uid(&maildir, &folder, &uid_ranges)
                .await?
        } else if is_uid {
            self.core
                .store
                .fetch_simple_uid(&maildir, &folder, &uid_ranges)
                .await?
        } else {
            let view = &self.selected.as_ref().unwrap().contents;
            uid_ranges
                .iter()
                .filter_map(|range| view.get_itemx(range.lo).cloned())
                .collect()
        };

        for item in &items {
            // The index listing may include mails unknown to this view;
            // keep to the current sequence assignment.
            let seq = match self
                .selected
                .as_ref()
                .unwrap()
                .contents
                .get_itemx(item.uid)
            {
                Some(known) => known.id,
                None => continue,
            };
            self.render_fetch_item(item.uid, seq, &item.mid, item.digest.as_ref(), &arguments)
                .await?;
        }
        self.echo_modify().await;
        Ok(Reply::of(ok_code))
    }

    async fn render_fetch_item(
        &mut self,
        uid: u32,
        seq: u32,
        mid: &str,
        digest: Option<&Digest>,
        arguments: &FetchArguments,
    ) -> Result<()> {
        let maildir = self.maildir();
        let read_only = self.selected.as_ref().unwrap().read_only;
        let flags_now = self
            .selected
            .as_ref()
            .unwrap()
            .contents
            .get_itemx(uid)
            .map(|item| item.flags)
            .unwrap_or_default();
        let eml_path = maildir.join("eml").join(mid);

        let mut buf = String::with_capacity(256);
        let mut frags: Vec<Fragment> = Vec::new();
        buf.push_str(&format!("* {} FETCH (", seq));
        let mut first = true;
        let mut set_seen = false;
        for attr in &arguments.attrs {
            if first {
                first = false;
            } else {
                buf.push(' ');
            }
            match attr {
                FetchAttr::Uid => buf.push_str(&format!("UID {}", uid)),
                FetchAttr::Flags => {
                    buf.push_str(&format!("FLAGS {}", flags_now.to_imap_string()))
                }
                FetchAttr::InternalDate => buf.push_str(&format!(
                    "INTERNALDATE \"{}\"",
                    internal_date_string(digest, mid)
                )),
                FetchAttr::Rfc822Size => buf.push_str(&format!(
                    "RFC822.SIZE {}",
                    digest.map(|d| d.size).unwrap_or(0)
                )),
                FetchAttr::Envelope => {
                    buf.push_str("ENVELOPE ");
                    match digest {
                        Some(digest) => buf.push_str(&digest.fetch_envelope(self.charset)),
                        None => buf.push_str("NIL"),
                    }
                }
                FetchAttr::Rfc822 => match digest {
                    Some(digest) => {
                        buf.push_str(&format!("RFC822 {{{}}}\r\n", digest.size));
                        flush(&mut buf, &mut frags);
                        frags.push(Fragment::File {
                            path: eml_path.clone(),
                            offset: 0,
                            length: digest.size,
                        });
                        set_seen = true;
                    }
                    None => buf.push_str("RFC822 NIL"),
                },
                FetchAttr::Rfc822Header => {
                    match digest.and_then(|d| d.get_mime("")) {
                        Some(root) => {
                            buf.push_str(&format!(
                                "RFC822.HEADER {{{}}}\r\n",
                                root.head_length()
                            ));
                            flush(&mut buf, &mut frags);
                            frags.push(Fragment::File {
                                path: eml_path.clone(),
                                offset: root.head_offset(),
                                length: root.head_length(),
                            });
                        }
                        None => buf.push_str("RFC822.HEADER NIL"),
                    }
                }
                FetchAttr::Rfc822Text => {
                    match digest.and_then(|d| d.get_mime("")) {
                        Some(root) => {
                            buf.push_str(&format!(
                                "RFC822.TEXT {{{}}}\r\n",
                                root.content_length()
                            ));
                            flush(&mut buf, &mut frags);
                            frags.push(Fragment::File {
                                path: eml_path.clone(),
                                offset: root.content_offset(),
                                length: root.content_length(),
                            });
                            set_seen = true;
                        }
                        None => buf.push_str("RFC822.TEXT NIL"),
                    }
                }
                FetchAttr::Body | FetchAttr::BodyStructure => {
                    let ext = matches!(attr, FetchAttr::BodyStructure);
                    buf.push_str(if ext { "BODYSTRUCTURE " } else { "BODY " });
                    let rendered = match digest {
                        Some(digest) => {
                            self.structure_with_rfc822(digest, &maildir, &eml_path, ext)
                        }
                        None => None,
                    };
                    buf.push_str(rendered.as_deref().unwrap_or("NIL"));
                }
                FetchAttr::Section(section) => {
                    match digest {
                        Some(digest) => {
                            self.render_body_section(
                                digest, &maildir, &eml_path, section, &mut buf, &mut frags,
                            );
                            if !section.peek {
                                set_seen = true;
                            }
                        }
                        None => buf.push_str(&format!("BODY{} NIL", section.label)),
                    }
                }
            }
        }
        buf.push_str(")\r\n");
        flush(&mut buf, &mut frags);
        self.write_fragments(frags)
            .await
            .map_err(|_| Reply::done().and_close())?;

        // Body reads mark the message seen and notify peers.
        let folder = self.selected.as_ref().unwrap().folder.clone();
        let user = self.user_meta().username.clone();
        let mut flags_after = flags_now;
        if set_seen && !read_only && !flags_now.contains(Flags::SEEN) {
            let _ = self
                .core
                .store
                .set_flags(&maildir, &folder, mid, Flags::SEEN)
                .await;
            flags_after.insert(Flags::SEEN);
            if let Some(item) = self
                .selected
                .as_mut()
                .unwrap()
                .contents
                .get_itemx_mut(uid)
            {
                item.flags = flags_after;
            }
            self.core
                .hub
                .bcast_flags(self.session_id, &user, &folder, uid);
        }
        if !read_only && flags_after.contains(Flags::RECENT) {
            let keep_seen = flags_after.contains(Flags::SEEN);
            flags_after.remove(Flags::RECENT);
            if let Some(item) = self
                .selected
                .as_mut()
                .unwrap()
                .contents
                .get_itemx_mut(uid)
            {
                item.flags = flags_after;
            }
            if !keep_seen {
                let _ = self
                    .core
                    .store
                    .unset_flags(&maildir, &folder, mid, Flags::RECENT)
                    .await;
                self.core
                    .hub
                    .bcast_flags(self.session_id, &user, &folder, uid);
            }
        }
        Ok(())
    }

    /// BODY/BODYSTRUCTURE text; embedded message/rfc822 parts render with
    /// their materialised envelope and structure, falling back to the flat
    /// digest when materialisation fails.
    fn structure_with_rfc822(
        &self,
        digest: &Digest,
        maildir: &Path,
        eml_path: &Path,
        ext: bool,
    ) -> Option<String> {
        if digest.has_rfc822_part() {
            let storage_root = maildir.join("tmp").join("imap.rfc822");
            if std::fs::create_dir_all(&storage_root).is_ok()
                && mjson::rfc822_build(digest, eml_path, &storage_root)
            {
                let per_message = storage_root.join(&digest.file);
                if let Some(out) = digest.fetch_structure(self.charset, ext, Some(&per_message))
                {
                    return Some(out);
                }
            }
        }
        digest.fetch_structure(self.charset, ext, None)
    }

    fn render_body_section(
        &self,
        digest: &Digest,
        maildir: &Path,
        eml_path: &Path,
        section: &BodySection,
        buf: &mut String,
        frags: &mut Vec<Fragment>,
    ) {
        let nil = |buf: &mut String| buf.push_str(&format!("BODY{} NIL", section.label));

        // A section id reaching into an embedded message resolves against
        // the materialised tree.
        let mut nested: Option<Digest> = None;
        let mut part_id = section.part_id.clone();
        let mut storage_file = None;
        if !part_id.is_empty() && digest.has_rfc822_part() {
            let storage_root = maildir.join("tmp").join("imap.rfc822");
            if std::fs::create_dir_all(&storage_root).is_ok()
                && mjson::rfc822_build(digest, eml_path, &storage_root)
            {
                if let Some((inner, rest)) =
                    mjson::rfc822_get(digest, &storage_root, &part_id)
                {
                    storage_file = Some(digest.file.clone());
                    nested = Some(inner);
                    part_id = rest;
                }
            }
        }
        let digest = nested.as_ref().unwrap_or(digest);
        let file_path: PathBuf =
            mjson::digest_file_path(maildir, storage_file.as_deref(), digest);

        match &section.item {
            None => {
                let node = if part_id.is_empty() {
                    digest.get_mime("")
                } else {
                    digest.get_mime_or_root(&part_id)
                };
                match node {
                    Some(node) if part_id.is_empty() => emit_file_region(
                        section,
                        &file_path,
                        node.head_offset(),
                        node.entire_length(),
                        buf,
                        frags,
                    ),
                    Some(node) => emit_file_region(
                        section,
                        &file_path,
                        node.content_offset(),
                        node.content_length(),
                        buf,
                        frags,
                    ),
                    None => nil(buf),
                }
            }
            Some(SectionItem::Header) => {
                // HEADER addresses the top-level header block only.
                match digest.get_mime("").filter(|_| part_id.is_empty()) {
                    Some(node) => emit_file_region(
                        section,
                        &file_path,
                        node.head_offset(),
                        node.head_length(),
                        buf,
                        frags,
                    ),
                    None => nil(buf),
                }
            }
            Some(SectionItem::Mime) => {
                // MIME needs a part specifier.
                match digest.get_mime(&part_id).filter(|_| !part_id.is_empty()) {
                    Some(node) => emit_file_region(
                        section,
                        &file_path,
                        node.head_offset(),
                        node.head_length(),
                        buf,
                        frags,
                    ),
                    None => nil(buf),
                }
            }
            Some(SectionItem::Text) => {
                match digest.get_mime("").filter(|_| part_id.is_empty()) {
                    Some(node) => emit_file_region(
                        section,
                        &file_path,
                        node.content_offset(),
                        node.content_length(),
                        buf,
                        frags,
                    ),
                    None => nil(buf),
                }
            }
            Some(SectionItem::HeaderFields { not, fields }) => {
                let node = match digest.get_mime("").filter(|_| part_id.is_empty()) {
                    Some(node) => node,
                    None => return nil(buf),
                };
                if node.head_length() > MAX_FIELD_REGION {
                    return nil(buf);
                }
                let raw = match read_region(&file_path, node.head_offset(), node.head_length())
                {
                    Some(raw) => raw,
                    None => return nil(buf),
                };
                let selected = match_imap_fields(&raw, fields, *not);
                match clamp_region(selected.len() as u64, section.offset, section.length) {
                    Some((skip, length)) => {
                        buf.push_str(&format!("BODY{} {{{}}}\r\n", section.label, length));
                        flush(buf, frags);
                        frags.push(Fragment::Bytes(
                            selected[skip as usize..(skip + length) as usize].to_vec(),
                        ));
                    }
                    None => nil(buf),
                }
            }
        }
    }
}

fn emit_file_region(
    section: &BodySection,
    file_path: &Path,
    offset: u64,
    region_len: u64,
    buf: &mut String,
    frags: &mut Vec<Fragment>,
) {
    match clamp_region(region_len, section.offset, section.length) {
        Some((skip, length)) => {
            buf.push_str(&format!("BODY{} {{{}}}\r\n", section.label, length));
            flush(buf, frags);
            frags.push(Fragment::File {
                path: file_path.to_path_buf(),
                offset: offset + skip,
                length,
            });
        }
        None => buf.push_str(&format!("BODY{} NIL", section.label)),
    }
}

fn read_region(path: &Path, offset: u64, length: u64) -> Option<Vec<u8>> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = std::fs::File::open(path).ok()?;
    file.seek(SeekFrom::Start(offset)).ok()?;
    let mut out = vec![0u8; length as usize];
    file.read_exact(&mut out).ok()?;
    Some(out)
}
