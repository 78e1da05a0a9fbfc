use crate::{
    core::{
        client::{Phase, Session},
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    protocol::capability::capability_string,
};

impl Session {
    pub async fn handle_capability(&mut self, _request: Request) -> Result<Reply> {
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        let line = format!(
            "* CAPABILITY {}\r\n",
            capability_string(self.config(), self.is_tls)
        );
        self.emit(line).await?;
        Ok(Reply::of(ReplyCode::CapabilityOk))
    }

    pub async fn handle_id(&mut self, _request: Request) -> Result<Reply> {
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        if !self.config().enable_rfc2971_commands {
            return Ok(Reply::of(ReplyCode::ParameterError));
        }
        let line = format!(
            "* ID (\"name\" \"gwimap\" \"version\" \"{}\")\r\n",
            env!("CARGO_PKG_VERSION")
        );
        self.emit(line).await?;
        Ok(Reply::of(ReplyCode::IdOk))
    }
}
