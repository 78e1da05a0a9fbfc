use crate::{
    core::{
        client::{Phase, Session},
        folder::{convert_folder_list, imap_to_internal, is_special_folder, FolderTree},
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::arg_str,
};

impl Session {
    pub async fn handle_delete(&mut self, request: Request) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        if request.args.len() != 1 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let mailbox = arg_str(&request.args[0])?;
        let folder =
            imap_to_internal(mailbox).ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;
        if is_special_folder(&folder) {
            return Err(Reply::of(ReplyCode::DeleteReservedName));
        }

        let maildir = self.maildir();
        let mut folders = self.core.store.enum_folders(&maildir).await?;
        convert_folder_list(&mut folders);
        let tree = FolderTree::new(&folders);
        match tree.match_path(mailbox) {
            None => return Err(Reply::of(ReplyCode::NonExistentFolder)),
            Some(node) if node.has_children() => {
                return Err(Reply::of(ReplyCode::DeleteSubfoldersFirst));
            }
            Some(_) => (),
        }

        self.core.store.remove_folder(&maildir, &folder).await?;
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        Ok(Reply::of(ReplyCode::DeleteOk))
    }
}
