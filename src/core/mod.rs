/*
 * Copyright (c) 2022, the gwimap authors.
 *
 * This file is part of the gwimap server.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod env_settings;
pub mod folder;
pub mod hub;
pub mod listener;
pub mod message;
pub mod receiver;
pub mod reply;
pub mod utf7;
pub mod writer;

use std::borrow::Cow;

use crate::midb::MidbError;

use self::reply::{midb_error_string, ReplyCode, MIDB_E_NO_FOLDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // Any state
    Capability,
    Id,
    Noop,
    Logout,

    // Not authenticated state
    StartTls,
    Authenticate,
    Login,

    // Authenticated state
    Select,
    Examine,
    Create,
    Delete,
    Rename,
    Subscribe,
    Unsubscribe,
    List,
    Xlist,
    Lsub,
    Status,
    Append,
    Idle,

    // Selected state
    Check,
    Close,
    Unselect,
    Expunge(bool),
    Search(bool),
    Fetch(bool),
    Store(bool),
    Copy(bool),
}

impl Command {
    pub fn parse(name: &[u8], is_uid: bool) -> Option<Command> {
        let cmd = match name {
            b"CAPABILITY" => Command::Capability,
            b"ID" => Command::Id,
            b"NOOP" => Command::Noop,
            b"LOGOUT" => Command::Logout,
            b"STARTTLS" => Command::StartTls,
            b"AUTHENTICATE" => Command::Authenticate,
            b"LOGIN" => Command::Login,
            b"SELECT" => Command::Select,
            b"EXAMINE" => Command::Examine,
            b"CREATE" => Command::Create,
            b"DELETE" => Command::Delete,
            b"RENAME" => Command::Rename,
            b"SUBSCRIBE" => Command::Subscribe,
            b"UNSUBSCRIBE" => Command::Unsubscribe,
            b"LIST" => Command::List,
            b"XLIST" => Command::Xlist,
            b"LSUB" => Command::Lsub,
            b"STATUS" => Command::Status,
            b"APPEND" => Command::Append,
            b"IDLE" => Command::Idle,
            b"CHECK" => Command::Check,
            b"CLOSE" => Command::Close,
            b"UNSELECT" => Command::Unselect,
            b"EXPUNGE" => Command::Expunge(is_uid),
            b"SEARCH" => Command::Search(is_uid),
            b"FETCH" => Command::Fetch(is_uid),
            b"STORE" => Command::Store(is_uid),
            b"COPY" => Command::Copy(is_uid),
            _ => return None,
        };
        if is_uid
            && !matches!(
                cmd,
                Command::Expunge(_)
                    | Command::Search(_)
                    | Command::Fetch(_)
                    | Command::Store(_)
                    | Command::Copy(_)
            )
        {
            return None;
        }
        Some(cmd)
    }
}

/// What a handler reports back to the dispatcher: an entry of the reply-code
/// table (or nothing, when the handler already wrote its own tagged line),
/// optional extended error text from the index service, and whether the
/// connection must close afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: Option<ReplyCode>,
    pub extra: Option<Cow<'static, str>>,
    pub try_create: bool,
    pub use_saved_tag: bool,
    pub close: bool,
}

impl Reply {
    /// The handler wrote its complete response itself.
    pub fn done() -> Self {
        Reply {
            code: None,
            extra: None,
            try_create: false,
            use_saved_tag: false,
            close: false,
        }
    }

    pub fn of(code: ReplyCode) -> Self {
        Reply {
            code: Some(code),
            ..Reply::done()
        }
    }

    pub fn closing(code: ReplyCode) -> Self {
        Reply {
            code: Some(code),
            close: true,
            ..Reply::done()
        }
    }

    pub fn saved_tag(mut self) -> Self {
        self.use_saved_tag = true;
        self
    }

    pub fn and_close(mut self) -> Self {
        self.close = true;
        self
    }
}

impl From<ReplyCode> for Reply {
    fn from(code: ReplyCode) -> Self {
        Reply::of(code)
    }
}

impl From<MidbError> for Reply {
    fn from(err: MidbError) -> Self {
        match err {
            MidbError::NoServer => Reply::of(ReplyCode::MidbMissing),
            MidbError::ReadWrite => Reply::of(ReplyCode::MidbRdwr),
            MidbError::OutOfMemory => Reply::of(ReplyCode::MidbEnomem),
            MidbError::TooManyResults => Reply::of(ReplyCode::MidbTooManyResults),
            MidbError::Result(code) => Reply {
                code: Some(ReplyCode::MidbInternal),
                extra: Some(midb_error_string(code).into()),
                try_create: code == MIDB_E_NO_FOLDER,
                use_saved_tag: false,
                close: false,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Reply>;
