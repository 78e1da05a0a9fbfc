use tracing::{debug, warn};

use crate::{
    core::{
        client::{Phase, Session},
        message::{Flags, Mitem},
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::{
        arg_str,
        sequence::{iseq_contains, parse_sequence_set},
    },
};

fn zero_uid_bit(item: &Mitem) -> bool {
    item.uid == 0 || !item.flags.contains(Flags::DELETED)
}

impl Session {
    pub async fn handle_expunge(&mut self, request: Request, is_uid: bool) -> Result<Reply> {
        if self.phase != Phase::Select {
            return Err(Reply::of(ReplyCode::OnlyInSelect));
        }
        let (folder, read_only) = {
            let selected = self.selected.as_ref().unwrap();
            (selected.folder.clone(), selected.read_only)
        };
        if read_only {
            return Err(Reply::of(ReplyCode::StoreReadOnly));
        }
        let ok_code = if is_uid {
            ReplyCode::UidExpungeOk
        } else {
            ReplyCode::ExpungeOk
        };
        let ranges = if is_uid {
            if request.args.len() != 1 {
                return Err(Reply::of(ReplyCode::ParameterError));
            }
            Some(parse_sequence_set(arg_str(&request.args[0])?)?)
        } else {
            None
        };

        let maildir = self.maildir();
        let deleted = self.core.store.list_deleted(&maildir, &folder).await?;
        if deleted.is_empty() {
            self.echo_modify().await;
            return Ok(Reply::of(ok_code));
        }
        let max_uid = deleted.iter().map(|item| item.uid).max().unwrap_or(0);
        let view = &self.selected.as_ref().unwrap().contents;
        let expunge: Vec<&Mitem> = deleted
            .iter()
            .filter(|item| {
                !zero_uid_bit(item)
                    && view.get_itemx(item.uid).is_some()
                    && ranges
                        .as_ref()
                        .map_or(true, |r| iseq_contains(r, item.uid, max_uid))
            })
            .collect();
        if expunge.is_empty() {
            self.echo_modify().await;
            return Ok(Reply::of(ok_code));
        }

        let mids: Vec<String> = expunge.iter().map(|item| item.mid.clone()).collect();
        self.core.store.remove_mail(&maildir, &folder, &mids).await?;
        for mid in &mids {
            let eml_path = maildir.join("eml").join(mid);
            if let Err(err) = std::fs::remove_file(&eml_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("remove {}: {}", eml_path.display(), err);
                }
            }
            debug!("message {} has been deleted", eml_path.display());
        }
        let uids: Vec<u32> = expunge.iter().map(|item| item.uid).collect();
        let user = self.user_meta().username.clone();
        self.core.hub.bcast_expunge(&user, &folder, uids);
        self.echo_modify().await;
        Ok(Reply::of(ok_code))
    }
}
