use tracing::{debug, warn};

use crate::core::{
    client::{Phase, Session},
    receiver::Request,
    reply::ReplyCode,
    Reply, Result,
};

impl Session {
    /// CLOSE is expunge-on-leave plus UNSELECT; a read-only selection skips
    /// the expunge.
    pub async fn handle_close(&mut self, _request: Request) -> Result<Reply> {
        if self.phase != Phase::Select {
            return Err(Reply::of(ReplyCode::OnlyInSelect));
        }
        self.close_selected_folder().await;
        Ok(Reply::of(ReplyCode::CloseOk))
    }

    pub(crate) async fn close_selected_folder(&mut self) {
        let (folder, read_only) = match &self.selected {
            Some(selected) => (selected.folder.clone(), selected.read_only),
            None => return,
        };
        self.leave_selected();
        if read_only {
            return;
        }
        let maildir = self.maildir();
        let deleted = match self.core.store.list_deleted(&maildir, &folder).await {
            Ok(deleted) => deleted,
            Err(err) => {
                self.send_reply("", err.into()).await;
                return;
            }
        };
        let mids: Vec<String> = deleted
            .iter()
            .filter(|item| item.uid != 0)
            .map(|item| item.mid.clone())
            .collect();
        if mids.is_empty() {
            return;
        }
        if let Err(err) = self.core.store.remove_mail(&maildir, &folder, &mids).await {
            self.send_reply("", err.into()).await;
            return;
        }
        for mid in &mids {
            let eml_path = maildir.join("eml").join(mid);
            if let Err(err) = std::fs::remove_file(&eml_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("remove {}: {}", eml_path.display(), err);
                }
            }
            debug!("message {} has been deleted", eml_path.display());
        }
        let user = self.user_meta().username.clone();
        self.core
            .hub
            .bcast_touch(Some(self.session_id), &user, &folder);
    }
}
