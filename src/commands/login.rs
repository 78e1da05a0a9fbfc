use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    core::{
        client::{Phase, Session},
        config::default_charset,
        receiver::Request,
        reply::ReplyCode,
        Reply, Result,
    },
    parser::arg_str,
    protocol::capability::capability_string,
};

impl Session {
    pub async fn handle_login(&mut self, request: Request) -> Result<Reply> {
        if self.config().support_tls && self.config().force_tls && !self.is_tls {
            return Err(Reply::of(ReplyCode::MustStartTlsFirst));
        }
        if self.is_authed() {
            return Err(Reply::of(ReplyCode::AlreadyAuthenticated));
        }
        if request.args.len() != 2 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let username = arg_str(&request.args[0])?.to_string();
        let password = arg_str(&request.args[1])?.to_string();
        if username.len() >= 256 || password.len() > 255 {
            return Err(Reply::of(ReplyCode::ParameterError));
        }
        let tag = request.tag.clone();
        self.do_login(&username, &password, &tag, false).await
    }

    /// Shared LOGIN / AUTHENTICATE LOGIN completion. The username may carry
    /// a `!target` suffix requesting impersonation of another store; the
    /// primary identity stays on the audit trail.
    pub async fn do_login(
        &mut self,
        username: &str,
        password: &str,
        tag: &str,
        use_saved_tag: bool,
    ) -> Result<Reply> {
        let tagger = |mut reply: Reply| {
            if use_saved_tag {
                reply = reply.saved_tag();
            }
            reply
        };
        let (primary, target) = match username.split_once('!') {
            Some((primary, target)) => (primary.trim(), Some(target)),
            None => (username.trim(), None),
        };
        if !self.core.auth.judge(primary).await {
            warn!(
                "LOGIN rejecting {:?} from {}: denied by user filter",
                primary, self.peer_addr
            );
            return Err(tagger(Reply::of(ReplyCode::UserFilterDenied)).and_close());
        }
        let primary_meta = match self.core.auth.login(primary, password).await {
            Some(meta) => meta,
            None => {
                warn!(
                    "LOGIN rejecting {:?} from {}: bad credentials",
                    primary, self.peer_addr
                );
                return Err(self.auth_failure(primary, tagger).await);
            }
        };
        let meta = match target {
            None => primary_meta,
            Some(target) => {
                let target_meta = match self.core.auth.meta(target).await {
                    Some(meta) => meta,
                    None => return Err(tagger(Reply::of(ReplyCode::NoMailboxLocation))),
                };
                if !self
                    .core
                    .auth
                    .store_owner(&primary_meta.username, &target_meta)
                    .await
                {
                    warn!(
                        "LOGIN rejecting {:?} from {}: not a store owner of {:?}",
                        primary_meta.username, self.peer_addr, target_meta.username
                    );
                    return Err(self.auth_failure(primary, tagger).await);
                }
                self.login_user = primary_meta.username.clone();
                target_meta
            }
        };
        if meta.maildir.as_os_str().is_empty() {
            return Err(tagger(Reply::of(ReplyCode::NoMailboxLocation)));
        }
        if self.login_user.is_empty() {
            self.login_user = meta.username.clone();
        }
        let lang = if meta.lang.is_empty() {
            self.config().default_lang.clone()
        } else {
            meta.lang.clone()
        };
        self.charset = default_charset(&lang);
        self.user = Some(meta);
        self.phase = Phase::Auth;
        debug!("LOGIN ok for {:?} ({})", self.login_user, self.peer_addr);
        let line = format!(
            "{} OK [CAPABILITY {}] Logged in\r\n",
            tag,
            capability_string(self.config(), self.is_tls)
        );
        self.emit(line).await?;
        Ok(Reply::done())
    }

    async fn auth_failure(&mut self, username: &str, tagger: impl Fn(Reply) -> Reply) -> Reply {
        self.auth_failures += 1;
        if self.auth_failures < self.config().max_auth_times {
            tagger(Reply::of(ReplyCode::BadCredentials))
        } else {
            self.core
                .auth
                .ban(
                    username,
                    Duration::from_secs(self.config().block_auth_fail),
                )
                .await;
            tagger(Reply::of(ReplyCode::TooManyFailures)).and_close()
        }
    }
}
