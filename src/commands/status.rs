use crate::{
    core::{
        client::{Phase, Session},
        folder::imap_to_internal,
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::{arg_str, parse_imap_args},
    protocol::quote_encode,
};

impl Session {
    pub async fn handle_status(&mut self, request: Request) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        if request.args.len() != 2 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let mailbox = arg_str(&request.args[0])?;
        let folder =
            imap_to_internal(mailbox).ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;
        let fields_arg = arg_str(&request.args[1])?;
        if !fields_arg.starts_with('(') || !fields_arg.ends_with(')') {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let fields =
            parse_imap_args(fields_arg).ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;

        let summary = self
            .core
            .store
            .summary_folder(&self.maildir(), &folder)
            .await?;
        let mut line = format!("* STATUS {} (", quote_encode(mailbox));
        for (pos, field) in fields.iter().enumerate() {
            if pos > 0 {
                line.push(' ');
            }
            match field.to_ascii_uppercase().as_str() {
                "MESSAGES" => line.push_str(&format!("MESSAGES {}", summary.exists)),
                "RECENT" => line.push_str(&format!("RECENT {}", summary.recent)),
                "UIDNEXT" => line.push_str(&format!("UIDNEXT {}", summary.uidnext)),
                "UIDVALIDITY" => {
                    line.push_str(&format!("UIDVALIDITY {}", summary.uidvalidity))
                }
                "UNSEEN" => line.push_str(&format!("UNSEEN {}", summary.unseen)),
                _ => return Err(Reply::of(ReplyCode::ParameterError)),
            }
        }
        line.push_str(")\r\n");
        self.emit(line).await?;
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        Ok(Reply::of(ReplyCode::StatusOk))
    }
}
