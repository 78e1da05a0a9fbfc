use crate::{
    core::{
        client::{Phase, Session},
        folder::{
            convert_folder_list, internal_to_imap, wildcard_match, FolderTree, SPECIAL_FOLDERS,
            SPECIAL_USE,
        },
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::{arg_str, list::parse_list},
    protocol::list::ListItem,
};

impl Session {
    pub async fn handle_list(&mut self, request: Request, is_xlist: bool) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        let verb = if is_xlist { "XLIST" } else { "LIST" };
        let ok_code = if is_xlist {
            ReplyCode::XlistOk
        } else {
            ReplyCode::ListOk
        };
        let arguments = parse_list(&request.args)?;
        if arguments.pattern.is_empty() && !is_xlist {
            // An empty pattern queries the hierarchy delimiter.
            if self.phase == Phase::Select {
                self.echo_modify().await;
            }
            self.emit(
                ListItem::new("LIST", "")
                    .with_attribute("\\Noselect")
                    .serialize(),
            )
            .await?;
            return Ok(Reply::of(ReplyCode::ListOk));
        }
        let pattern = if arguments.pattern.is_empty() {
            format!("{}*", arguments.reference)
        } else {
            format!("{}{}", arguments.reference, arguments.pattern)
        };

        let mut folders = if arguments.filter_special {
            Vec::new()
        } else {
            self.core.store.enum_folders(&self.maildir()).await?
        };
        convert_folder_list(&mut folders);
        let tree = FolderTree::new(&folders);
        let mark_special = is_xlist || arguments.return_special;
        let mut buf = String::new();

        if wildcard_match("INBOX", &pattern) {
            let mut item = ListItem::new(verb, "INBOX");
            if mark_special || arguments.filter_special {
                item = item.with_attribute("\\Inbox");
            }
            if !arguments.filter_special {
                item = item.with_children(
                    tree.match_path("INBOX").map_or(false, |n| n.has_children()),
                );
            }
            buf.push_str(&item.serialize());
        }
        for (internal, marker) in SPECIAL_USE {
            let name = match internal_to_imap(internal) {
                Some(name) => name,
                None => continue,
            };
            if !wildcard_match(&name, &pattern) {
                continue;
            }
            let mut item = ListItem::new(verb, name.clone());
            if mark_special || arguments.filter_special {
                item = item.with_attribute(marker);
            }
            if !arguments.filter_special {
                item = item.with_children(
                    tree.match_path(&name).map_or(false, |n| n.has_children()),
                );
            }
            buf.push_str(&item.serialize());
        }
        for name in &folders {
            if !wildcard_match(name, &pattern) {
                continue;
            }
            buf.push_str(
                &ListItem::new(verb, name.clone())
                    .with_children(tree.match_path(name).map_or(false, |n| n.has_children()))
                    .serialize(),
            );
        }

        self.emit(buf).await?;
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        Ok(Reply::of(ok_code))
    }

    pub async fn handle_lsub(&mut self, request: Request) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        if request.args.len() < 2 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let reference = arg_str(&request.args[0])?;
        let mask = arg_str(&request.args[1])?;
        if reference.len() + mask.len() >= 1024 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        if mask.is_empty() {
            if self.phase == Phase::Select {
                self.echo_modify().await;
            }
            self.emit(
                ListItem::new("LSUB", "")
                    .with_attribute("\\Noselect")
                    .serialize(),
            )
            .await?;
            return Ok(Reply::of(ReplyCode::ListOk));
        }
        let pattern = format!("{}{}", reference, mask);

        let maildir = self.maildir();
        let mut subscriptions = self.core.store.enum_subscriptions(&maildir).await?;
        convert_folder_list(&mut subscriptions);
        let mut folders = self
            .core
            .store
            .enum_folders(&maildir)
            .await
            .unwrap_or_default();
        for special in SPECIAL_FOLDERS {
            folders.push(special.to_string());
        }
        convert_folder_list(&mut folders);
        let tree = FolderTree::new(&folders);

        let mut buf = String::new();
        for name in &subscriptions {
            if !wildcard_match(name, &pattern) {
                continue;
            }
            buf.push_str(
                &ListItem::new("LSUB", name.clone())
                    .with_children(tree.match_path(name).map_or(false, |n| n.has_children()))
                    .serialize(),
            );
        }
        self.emit(buf).await?;
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        Ok(Reply::of(ReplyCode::LsubOk))
    }
}
