use crate::{
    core::{
        client::{Phase, Session},
        folder::{convert_folder_list, imap_to_internal, is_special_folder, SPECIAL_FOLDERS},
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::arg_str,
};

impl Session {
    /// CREATE makes missing intermediate folders segment by segment, so
    /// `CREATE a/b/c` works on an empty store.
    pub async fn handle_create(&mut self, request: Request) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        if request.args.len() != 1 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let mailbox = arg_str(&request.args[0])?;
        if mailbox.is_empty() || mailbox.len() >= 1024 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        if mailbox.contains(|c| matches!(c, '%' | '*' | '?')) {
            return Err(Reply::of(ReplyCode::FolderNameError));
        }
        let folder =
            imap_to_internal(mailbox).ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;
        if is_special_folder(&folder) {
            return Err(Reply::of(ReplyCode::CreateReservedName));
        }

        let maildir = self.maildir();
        let mut existing = self.core.store.enum_folders(&maildir).await?;
        for special in SPECIAL_FOLDERS {
            existing.push(special.to_string());
        }
        convert_folder_list(&mut existing);

        let name = mailbox.strip_suffix('/').unwrap_or(mailbox);
        if existing.iter().any(|e| e == name) {
            return Err(Reply::of(ReplyCode::CreateFolderExists));
        }
        let mut prefix_end = Vec::new();
        for (pos, ch) in name.char_indices() {
            if ch == '/' {
                prefix_end.push(pos);
            }
        }
        prefix_end.push(name.len());
        for end in prefix_end {
            let prefix = &name[..end];
            if existing.iter().any(|e| e == prefix) {
                continue;
            }
            let internal = imap_to_internal(prefix)
                .ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;
            self.core.store.make_folder(&maildir, &internal).await?;
        }
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        Ok(Reply::of(ReplyCode::CreateOk))
    }
}
