use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{
    core::{
        client::{next_mid_sequence, AppendState, Phase, Session},
        folder::imap_to_internal,
        message::Flags,
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::{append::parse_append, parse_imap_date},
};

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn base32_guid() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut raw = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    raw.iter()
        .map(|&b| ALPHABET[(b & 31) as usize] as char)
        .collect()
}

impl Session {
    /// APPEND sent without a message literal.
    pub async fn handle_append_inline(&mut self, _request: Request) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        Err(Reply::of(ReplyCode::ParameterError))
    }

    /// Begin phase: validate the arguments, reserve the scratch file under
    /// `maildir/tmp/` with the framed metadata header, and leave the open
    /// file for the literal octets to stream into. On failure the literal
    /// is still consumed and the saved reply sent afterwards.
    pub async fn append_begin(&mut self, request: Request, literal_size: usize) {
        let tag = request.tag.clone();
        self.saved_tag = tag.clone();
        let failed = |reply: Reply, tag: String| AppendState {
            file: None,
            path: Default::default(),
            mid: String::new(),
            remaining: literal_size,
            tag,
            failure: Some(reply),
        };
        if !self.is_authed() {
            self.append = Some(failed(Reply::of(ReplyCode::NotAuthenticated), tag));
            return;
        }
        let arguments = match parse_append(&request.args) {
            Ok(arguments) => arguments,
            Err(reply) => {
                self.append = Some(failed(reply, tag));
                return;
            }
        };
        let folder = match imap_to_internal(&arguments.mailbox) {
            Some(folder) => folder,
            None => {
                self.append = Some(failed(Reply::of(ReplyCode::ParameterError), tag));
                return;
            }
        };

        let mid = match &arguments.internal_date {
            Some(date) if parse_imap_date(date).is_some() => format!(
                "{}.g{}.{}",
                now_epoch(),
                base32_guid(),
                self.config().host_id
            ),
            _ => format!(
                "{}.{}.{}",
                now_epoch(),
                next_mid_sequence(),
                self.config().host_id
            ),
        };
        let tmp_dir = self.maildir().join("tmp");
        let path = tmp_dir.join(&mid);
        if std::fs::create_dir_all(&tmp_dir).is_err() {
            self.append = Some(failed(Reply::of(ReplyCode::SaveMessageError), tag));
            return;
        }
        let mut file = match tokio::fs::File::create(&path).await {
            Ok(file) => file,
            Err(err) => {
                warn!("open {}: {}", path.display(), err);
                self.append = Some(failed(Reply::of(ReplyCode::SaveMessageError), tag));
                return;
            }
        };

        // u32 header_len || folder \0 flags \0 internal-date \0
        let mut header = Vec::with_capacity(64);
        header.extend_from_slice(&[0u8; 4]);
        header.extend_from_slice(folder.as_bytes());
        header.push(0);
        header.extend_from_slice(arguments.flags.to_imap_string().as_bytes());
        header.push(0);
        if let Some(date) = &arguments.internal_date {
            header.extend_from_slice(date.as_bytes());
        }
        header.push(0);
        let total = header.len() as u32;
        header[..4].copy_from_slice(&total.to_le_bytes());
        if let Err(err) = file.write_all(&header).await {
            warn!("write {}: {}", path.display(), err);
            let _ = std::fs::remove_file(&path);
            self.append = Some(failed(Reply::of(ReplyCode::SaveMessageError), tag));
            return;
        }

        self.append = Some(AppendState {
            file: Some(file),
            path,
            mid,
            remaining: literal_size,
            tag,
            failure: None,
        });
    }

    /// End phase: the literal is on disk. Parse the header back, validate
    /// the MIME body, materialise the EML file, register the message with
    /// the index service and try to report APPENDUID.
    pub async fn append_end(&mut self, state: AppendState) -> bool {
        let tag = state.tag.clone();
        let reply = match self.append_finish(state).await {
            Ok(reply) => reply,
            Err(reply) => reply,
        };
        self.send_reply(&tag, reply).await
    }

    async fn append_finish(&mut self, state: AppendState) -> Result<Reply> {
        if let Some(mut file) = state.file {
            if file.flush().await.is_err() {
                let _ = std::fs::remove_file(&state.path);
                return Err(Reply::of(ReplyCode::SaveMessageError));
            }
        }
        let scratch = &state.path;
        let unlink_scratch = || {
            if let Err(err) = std::fs::remove_file(scratch) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("remove {}: {}", scratch.display(), err);
                }
            }
        };
        let data = match std::fs::read(scratch) {
            Ok(data) => data,
            Err(err) => {
                warn!("read {}: {}", scratch.display(), err);
                unlink_scratch();
                return Err(Reply::of(ReplyCode::SaveMessageError));
            }
        };
        let (folder, flags, internal_date, message) = match parse_scratch(&data) {
            Some(parsed) => parsed,
            None => {
                unlink_scratch();
                return Err(Reply::of(ReplyCode::SaveMessageError));
            }
        };
        if message.is_empty() || crate::mjson::digest_message(message, &state.mid).is_none() {
            unlink_scratch();
            return Err(Reply::of(ReplyCode::ParseMessageError));
        }

        let maildir = self.maildir();
        let eml_dir = maildir.join("eml");
        let eml_path = eml_dir.join(&state.mid);
        let _ = std::fs::create_dir_all(&eml_dir);
        if let Err(err) = std::fs::write(&eml_path, message) {
            warn!("write {}: {}", eml_path.display(), err);
            unlink_scratch();
            if let Err(err) = std::fs::remove_file(&eml_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("remove {}: {}", eml_path.display(), err);
                }
            }
            return Err(Reply::of(ReplyCode::SaveMessageError));
        }

        if let Err(err) = self
            .core
            .store
            .insert_mail(&maildir, &folder, &state.mid, flags, internal_date)
            .await
        {
            unlink_scratch();
            if let Err(err) = std::fs::remove_file(&eml_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("remove {}: {}", eml_path.display(), err);
                }
            }
            return Err(err.into());
        }
        unlink_scratch();
        debug!("message {} is appended OK", eml_path.display());

        let user = self.user_meta().username.clone();
        self.core.hub.bcast_touch(None, &user, &folder);
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }

        // The index service applies the insert asynchronously; poll briefly
        // for the new UID so the OK can carry APPENDUID.
        let mut trailer = None;
        for _ in 0..10 {
            let uidvalidity = match self.core.store.summary_folder(&maildir, &folder).await {
                Ok(summary) => summary.uidvalidity,
                Err(_) => 0,
            };
            if uidvalidity != 0 {
                if let Ok(uid) = self.core.store.get_uid(&maildir, &folder, &state.mid).await
                {
                    trailer = Some((uidvalidity, uid));
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let line = match trailer {
            Some((uidvalidity, uid)) => format!(
                "{} OK [APPENDUID {} {}] APPEND completed\r\n",
                state.tag, uidvalidity, uid
            ),
            None => format!("{} OK APPEND completed\r\n", state.tag),
        };
        self.emit(line).await?;
        Ok(Reply::done())
    }
}

/// Decode the scratch framing written by the begin phase.
fn parse_scratch(data: &[u8]) -> Option<(String, Flags, i64, &[u8])> {
    if data.len() < 4 {
        return None;
    }
    let header_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if header_len < 4 || header_len > data.len() {
        return None;
    }
    let header = &data[4..header_len];
    let mut parts = header.split(|&b| b == 0);
    let folder = std::str::from_utf8(parts.next()?).ok()?.to_string();
    let flags_raw = std::str::from_utf8(parts.next()?).ok()?;
    let date_raw = std::str::from_utf8(parts.next()?).ok()?;
    if folder.is_empty() {
        return None;
    }
    let mut flags = Flags::empty();
    for name in ["\\Seen", "\\Answered", "\\Flagged", "\\Draft"] {
        if flags_raw.to_ascii_lowercase().contains(&name.to_ascii_lowercase()) {
            flags.insert(Flags::parse_imap(name).unwrap());
        }
    }
    let internal_date = if date_raw.is_empty() {
        now_epoch()
    } else {
        parse_imap_date(date_raw).unwrap_or_else(now_epoch)
    };
    Some((folder, flags, internal_date, &data[header_len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_framing() {
        let mut data = Vec::new();
        let header = b"inbox\0(\\Seen \\Draft)\0\0";
        data.extend_from_slice(&((header.len() + 4) as u32).to_le_bytes());
        data.extend_from_slice(header);
        data.extend_from_slice(b"raw message");
        let (folder, flags, _, message) = parse_scratch(&data).unwrap();
        assert_eq!(folder, "inbox");
        assert!(flags.contains(Flags::SEEN));
        assert!(flags.contains(Flags::DRAFT));
        assert!(!flags.contains(Flags::ANSWERED));
        assert_eq!(message, b"raw message");
    }

    #[test]
    fn scratch_framing_rejects_garbage() {
        assert!(parse_scratch(b"").is_none());
        assert!(parse_scratch(&[255, 255, 0, 0, b'x']).is_none());
    }
}
