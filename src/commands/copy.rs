use std::time::Duration;

use tracing::warn;

use crate::{
    core::{
        client::{Phase, Session},
        folder::imap_to_internal,
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::{
        arg_str,
        sequence::{parse_sequence_set, seq_to_uids},
    },
};

impl Session {
    /// COPY accumulates (source, destination) UID pairs for COPYUID, and on
    /// a mid-batch failure removes the already-copied messages from the
    /// destination again.
    pub async fn handle_copy(&mut self, request: Request, is_uid: bool) -> Result<Reply> {
        if self.phase != Phase::Select {
            return Err(Reply::of(ReplyCode::OnlyInSelect));
        }
        if request.args.len() != 2 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let ranges = parse_sequence_set(arg_str(&request.args[0])?)?;
        let dest = imap_to_internal(arg_str(&request.args[1])?)
            .ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;
        let src_folder = self.selected.as_ref().unwrap().folder.clone();

        let uid_ranges = if is_uid {
            ranges
        } else {
            seq_to_uids(&ranges, &self.selected.as_ref().unwrap().contents)
        };
        let maildir = self.maildir();
        let items = self
            .core
            .store
            .fetch_simple_uid(&maildir, &src_folder, &uid_ranges)
            .await?;
        let mut uidvalidity = match self.core.store.summary_folder(&maildir, &dest).await {
            Ok(summary) => summary.uidvalidity,
            Err(_) => 0,
        };

        let mut copied = true;
        let mut copied_mids: Vec<String> = Vec::with_capacity(items.len());
        let mut src_uids = String::new();
        let mut dst_uids = String::new();
        for item in &items {
            if !is_uid
                && self
                    .selected
                    .as_ref()
                    .unwrap()
                    .contents
                    .get_itemx(item.uid)
                    .is_none()
            {
                continue;
            }
            if self
                .core
                .store
                .copy_mail(&maildir, &src_folder, &item.mid, &dest, &item.mid)
                .await
                .is_err()
            {
                copied = false;
                break;
            }
            copied_mids.push(item.mid.clone());
            if uidvalidity == 0 {
                continue;
            }
            // The destination UID shows up once the index service has
            // processed the copy.
            let mut dst_uid = None;
            for _ in 0..10 {
                match self.core.store.get_uid(&maildir, &dest, &item.mid).await {
                    Ok(uid) => {
                        dst_uid = Some(uid);
                        break;
                    }
                    Err(_) => tokio::time::sleep(Duration::from_millis(500)).await,
                }
            }
            match dst_uid {
                Some(uid) => {
                    if !src_uids.is_empty() {
                        src_uids.push(',');
                        dst_uids.push(',');
                    }
                    src_uids.push_str(&item.uid.to_string());
                    dst_uids.push_str(&uid.to_string());
                }
                None => uidvalidity = 0,
            }
        }

        if !copied {
            if let Err(err) = self
                .core
                .store
                .remove_mail(&maildir, &dest, &copied_mids)
                .await
            {
                warn!("rollback of partial copy into {:?} failed: {}", dest, err);
            }
            return Err(Reply::of(if is_uid {
                ReplyCode::UidCopyFailed
            } else {
                ReplyCode::CopyFailed
            }));
        }

        let user = self.user_meta().username.clone();
        self.core.hub.bcast_touch(Some(self.session_id), &user, &dest);
        self.echo_modify().await;
        if uidvalidity != 0 {
            let line = format!(
                "{} OK [COPYUID {} {} {}] {} completed\r\n",
                request.tag,
                uidvalidity,
                src_uids,
                dst_uids,
                if is_uid { "UID COPY" } else { "COPY" }
            );
            self.emit(line).await?;
            Ok(Reply::done())
        } else {
            Ok(Reply::of(if is_uid {
                ReplyCode::UidCopyOk
            } else {
                ReplyCode::CopyOk
            }))
        }
    }
}
