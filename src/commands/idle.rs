use crate::core::{
    client::Session, receiver::Request, reply::ReplyCode, Reply, Result,
};

impl Session {
    /// RFC 2177. While idling, hub notifications are echoed immediately;
    /// the loop ends when the client sends DONE.
    pub async fn handle_idle(&mut self, request: Request) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        if !request.args.is_empty() {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        self.saved_tag = request.tag;
        self.idling = true;
        self.emit(format!("{}\r\n", ReplyCode::Idling.text())).await?;
        Ok(Reply::done())
    }

    pub(crate) async fn handle_idle_line(&mut self, line: &[u8]) -> bool {
        self.idling = false;
        let start = line
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(line.len());
        let end = line
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(start, |p| p + 1);
        if line[start..end].eq_ignore_ascii_case(b"DONE") {
            self.echo_modify().await;
            self.send_reply("", Reply::of(ReplyCode::IdleOk).saved_tag())
                .await
        } else {
            self.send_reply("", Reply::of(ReplyCode::ExpectedDone).saved_tag())
                .await
        }
    }
}
