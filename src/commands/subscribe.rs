use crate::{
    core::{
        client::{Phase, Session},
        folder::imap_to_internal,
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::arg_str,
};

impl Session {
    pub async fn handle_subscribe(
        &mut self,
        request: Request,
        subscribe: bool,
    ) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        if request.args.len() != 1 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let folder = imap_to_internal(arg_str(&request.args[0])?)
            .ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;
        let maildir = self.maildir();
        if subscribe {
            self.core.store.subscribe_folder(&maildir, &folder).await?;
        } else {
            self.core.store.unsubscribe_folder(&maildir, &folder).await?;
        }
        if self.phase == Phase::Select {
            self.echo_modify().await;
        }
        Ok(Reply::of(if subscribe {
            ReplyCode::SubscribeOk
        } else {
            ReplyCode::UnsubscribeOk
        }))
    }
}
