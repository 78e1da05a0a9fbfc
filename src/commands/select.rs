use crate::{
    core::{
        client::{Phase, Selected, Session},
        folder::imap_to_internal,
        message::ContentArray,
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    midb::{SeqRange, SEQ_STAR},
    parser::arg_str,
    protocol::select::Response,
};

impl Session {
    pub async fn handle_select(&mut self, request: Request, read_only: bool) -> Result<Reply> {
        if !self.is_authed() {
            return Err(Reply::of(ReplyCode::NotAuthenticated));
        }
        if request.args.len() != 1 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let folder = imap_to_internal(arg_str(&request.args[0])?)
            .ok_or_else(|| Reply::of(ReplyCode::ParameterError))?;
        if self.phase == Phase::Select {
            self.leave_selected();
        }

        let maildir = self.maildir();
        let summary = self.core.store.summary_folder(&maildir, &folder).await?;
        let listing = self
            .core
            .store
            .fetch_simple_uid(
                &maildir,
                &folder,
                &[SeqRange {
                    lo: 1,
                    hi: SEQ_STAR,
                }],
            )
            .await?;
        let mut contents = ContentArray::default();
        contents.ingest(listing, true);

        let response = Response {
            exists: contents.n_exists(),
            recent: contents.n_recent,
            first_unseen: contents.first_unseen,
            uid_validity: summary.uidvalidity,
            uid_next: summary.uidnext,
            read_only,
        };
        self.selected = Some(Selected {
            folder: folder.clone(),
            read_only,
            last_exists: contents.n_exists(),
            last_recent: contents.n_recent,
            contents,
        });
        self.phase = Phase::Select;
        let user = self.user_meta().username.clone();
        let (queue, ping) = self.hub_endpoint();
        self.core
            .hub
            .register(self.session_id, &user, &folder, queue, ping);

        self.emit(response.serialize(&request.tag)).await?;
        Ok(Reply::done())
    }
}
