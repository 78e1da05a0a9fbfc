use crate::core::{
    client::{Phase, Session},
    receiver::Request,
    reply::ReplyCode,
    Reply, Result,
};

impl Session {
    pub async fn handle_starttls(&mut self, _request: Request) -> Result<Reply> {
        if self.is_tls || !self.config().support_tls {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        if self.phase != Phase::NoAuth {
            return Err(Reply::of(ReplyCode::TlsOnlyBeforeAuth));
        }
        self.request_tls_upgrade();
        Ok(Reply::of(ReplyCode::StartTlsOk))
    }
}
