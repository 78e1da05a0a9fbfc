use crate::core::{
    client::Session, receiver::Request, reply::ReplyCode, Reply, Result,
};

impl Session {
    pub async fn handle_logout(&mut self, _request: Request) -> Result<Reply> {
        self.leave_selected();
        self.emit(format!("* {}\r\n", ReplyCode::ByeLoggingOut.text()))
            .await?;
        Ok(Reply::closing(ReplyCode::LogoutOk))
    }
}
