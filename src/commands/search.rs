use crate::core::{
    client::{Phase, Session},
    receiver::Request,
    reply::ReplyCode,
    Reply, Result,
};

impl Session {
    /// SEARCH criteria are forwarded opaquely to the index service, which
    /// answers with the id list to echo.
    pub async fn handle_search(&mut self, request: Request, is_uid: bool) -> Result<Reply> {
        if self.phase != Phase::Select {
            return Err(Reply::of(ReplyCode::OnlyInSelect));
        }
        if request.args.is_empty() || request.args.len() > 1024 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let criteria: Vec<String> = request
            .args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();
        let folder = self.selected.as_ref().unwrap().folder.clone();
        let maildir = self.maildir();
        let result = if is_uid {
            self.core
                .store
                .search_uid(&maildir, &folder, self.charset, &criteria)
                .await?
        } else {
            self.core
                .store
                .search(&maildir, &folder, self.charset, &criteria)
                .await?
        };
        let mut line = String::with_capacity(result.len() + 16);
        line.push_str("* SEARCH ");
        line.push_str(&result);
        line.push_str("\r\n");
        self.emit(line).await?;
        self.echo_modify().await;
        Ok(Reply::of(if is_uid {
            ReplyCode::UidSearchOk
        } else {
            ReplyCode::SearchOk
        }))
    }
}
