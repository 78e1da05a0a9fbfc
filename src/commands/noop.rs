use crate::core::{
    client::{Phase, Session},
    receiver::Request,
    reply::ReplyCode,
    Reply, Result,
};

impl Session {
    pub async fn handle_noop(&mut self, _request: Request) -> Result<Reply> {
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        Ok(Reply::of(ReplyCode::NoopOk))
    }

    pub async fn handle_check(&mut self, _request: Request) -> Result<Reply> {
        if self.phase != Phase::Select {
            return Err(Reply::of(ReplyCode::OnlyInSelect));
        }
        self.echo_modify().await;
        Ok(Reply::of(ReplyCode::CheckOk))
    }
}
