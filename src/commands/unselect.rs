use crate::core::{
    client::{Phase, Session},
    receiver::Request,
    reply::ReplyCode,
    Reply, Result,
};

impl Session {
    pub async fn handle_unselect(&mut self, _request: Request) -> Result<Reply> {
        if self.phase != Phase::Select {
            return Err(Reply::of(ReplyCode::OnlyInSelect));
        }
        self.leave_selected();
        Ok(Reply::of(ReplyCode::UnselectOk))
    }
}
