use crate::{
    core::{
        client::{Phase, Session},
        message::Flags,
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::{
        arg_str,
        sequence::{parse_sequence_set, seq_to_uids},
        store::{parse_flag_list, parse_store_op, StoreOp},
    },
};

impl Session {
    pub async fn handle_store(&mut self, request: Request, is_uid: bool) -> Result<Reply> {
        if self.phase != Phase::Select {
            return Err(Reply::of(ReplyCode::OnlyInSelect));
        }
        if request.args.len() != 3 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let ranges = parse_sequence_set(arg_str(&request.args[0])?)?;
        let (op, silent) = parse_store_op(arg_str(&request.args[1])?)?;
        let flags = parse_flag_list(arg_str(&request.args[2])?)?;
        let (folder, read_only) = {
            let selected = self.selected.as_ref().unwrap();
            (selected.folder.clone(), selected.read_only)
        };
        if read_only {
            return Err(Reply::of(ReplyCode::StoreReadOnly));
        }

        let uid_ranges = if is_uid {
            ranges
        } else {
            seq_to_uids(&ranges, &self.selected.as_ref().unwrap().contents)
        };
        let maildir = self.maildir();
        let items = self
            .core
            .store
            .fetch_simple_uid(&maildir, &folder, &uid_ranges)
            .await?;
        let user = self.user_meta().username.clone();
        for item in &items {
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
            match op {
                StoreOp::Replace => {
                    // Clear the full permanent set plus \Recent, then apply.
                    self.core
                        .store
                        .unset_flags(
                            &maildir,
                            &folder,
                            &item.mid,
                            Flags::all_permanent() | Flags::RECENT,
                        )
                        .await?;
                    self.core
                        .store
                        .set_flags(&maildir, &folder, &item.mid, flags)
                        .await?;
                }
                StoreOp::Add => {
                    self.core
                        .store
                        .set_flags(&maildir, &folder, &item.mid, flags)
                        .await?;
                }
                StoreOp::Remove => {
                    self.core
                        .store
                        .unset_flags(&maildir, &folder, &item.mid, flags)
                        .await?;
                }
            }
            let effective = match op {
                StoreOp::Replace => flags,
                _ => self
                    .core
                    .store
                    .get_flags(&maildir, &folder, &item.mid)
                    .await
                    .unwrap_or(item.flags),
            };
            if let Some(known) = self
                .selected
                .as_mut()
                .unwrap()
                .contents
                .get_itemx_mut(item.uid)
            {
                known.flags = effective;
            }
            if !silent {
                let line = if is_uid {
                    format!(
                        "* {} FETCH (FLAGS {} UID {})\r\n",
                        seq,
                        effective.to_imap_string(),
                        item.uid
                    )
                } else {
                    format!("* {} FETCH (FLAGS {})\r\n", seq, effective.to_imap_string())
                };
                self.emit(line).await?;
            }
            self.core
                .hub
                .bcast_flags(self.session_id, &user, &folder, item.uid);
        }
        self.echo_modify().await;
        Ok(Reply::of(if is_uid {
            ReplyCode::UidStoreOk
        } else {
            ReplyCode::StoreOk
        }))
    }
}
