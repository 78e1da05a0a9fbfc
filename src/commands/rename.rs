use crate::{
    core::{
        client::{Phase, Session},
        folder::{imap_to_internal, is_special_folder},
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::arg_str,
};

impl Session {
    pub async fn handle_rename(&mut self, request: Request) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        if request.args.len() != 2 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let from = arg_str(&request.args[0])?;
        let to = arg_str(&request.args[1])?;
        if from.is_empty() || to.is_empty() || from.len() >= 1024 || to.len() >= 1024 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        if to.contains(|c| matches!(c, '%' | '*' | '?')) {
            return Err(Reply::of(ReplyCode::FolderNameError));
        }
        let from_internal =
            imap_to_internal(from).ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;
        let to_internal =
            imap_to_internal(to).ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;
        if is_special_folder(&from_internal) || is_special_folder(&to_internal) {
            return Err(Reply::of(ReplyCode::RenameReservedName));
        }
        self.core
            .store
            .rename_folder(&self.maildir(), &from_internal, &to_internal)
            .await?;
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        Ok(Reply::of(ReplyCode::RenameOk))
    }
}
