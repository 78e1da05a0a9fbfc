use crate::{
    core::{
        client::{Phase, Session},
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::arg_str,
};

impl Session {
    /// Only AUTHENTICATE LOGIN is offered: two base64 continuation rounds
    /// prompting "User Name" and "Password".
    pub async fn handle_authenticate(&mut self, request: Request) -> Result<Reply> {
        if self.config().support_tls && self.config().force_tls && !self.is_tls {
            return Err(Reply::of(ReplyCode::MustStartTlsFirst));
        }
        if request.args.len() != 1 || !arg_str(&request.args[0])?.eq_ignore_ascii_case("LOGIN")
        {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        if self.is_authed() {
            return Err(Reply::of(ReplyCode::AlreadyAuthenticated));
        }
        self.saved_tag = request.tag;
        self.phase = Phase::Username;
        self.emit(b"+ VXNlciBOYW1lAA==\r\n".to_vec()).await?;
        Ok(Reply::done())
    }

    pub(crate) async fn handle_username_line(&mut self, line: &[u8]) -> bool {
        match base64::decode(line).ok().and_then(|b| String::from_utf8(b).ok()) {
            Some(username) => {
                self.pending_user = username;
                self.phase = Phase::Password;
                self.write_bytes(b"+ UGFzc3dvcmQA\r\n".to_vec()).await.is_err()
            }
            None => {
                self.phase = Phase::NoAuth;
                self.send_reply("", Reply::of(ReplyCode::Base64UserError).saved_tag())
                    .await
            }
        }
    }

    pub(crate) async fn handle_password_line(&mut self, line: &[u8]) -> bool {
        self.phase = Phase::NoAuth;
        let password = match base64::decode(line)
            .ok()
            .and_then(|b| String::from_utf8(b).ok())
        {
            Some(password) => password,
            None => {
                return self
                    .send_reply("", Reply::of(ReplyCode::Base64PassError).saved_tag())
                    .await;
            }
        };
        let username = std::mem::take(&mut self.pending_user);
        let tag = self.saved_tag.clone();
        let reply = match self.do_login(&username, &password, &tag, true).await {
            Ok(reply) => reply,
            Err(reply) => reply,
        };
        self.send_reply(&tag, reply).await
    }
}
