//! Incremental IMAP command framing.
//!
//! Bytes in, `Request { tag, command, args }` out. Top-level arguments keep
//! their delimiters: a parenthesized group arrives as one argument including
//! the parentheses (handlers re-split it), bracketed sections such as
//! `BODY[HEADER.FIELDS (DATE FROM)]<0.10>` stay one argument, quoted strings
//! are unquoted, literals `{N}` / `{N+}` are inlined into the argument after
//! the continuation dance. APPEND literals are not buffered here; the
//! session takes over the pending request and streams the literal to disk.

use super::{reply::ReplyCode, Command, Reply};

pub const MAX_LINE_LEN: usize = 64 * 1024;
pub const MAX_LITERAL_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub tag: String,
    pub command: Command,
    pub args: Vec<Vec<u8>>,
}

#[derive(Debug)]
pub enum Error {
    NeedsMoreData,
    /// A literal was announced; the bytes following the header have not been
    /// consumed yet. Reported exactly once per literal.
    NeedsLiteral { size: usize, sync: bool },
    Error { tag: String, reply: Reply },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Tag,
    Command,
    Argument,
    Quoted,
    QuotedEscape,
    LiteralHeader,
    LiteralLf,
    Literal,
    SkipLine,
}

pub struct Receiver {
    state: State,
    tag: String,
    is_uid: bool,
    command: Option<Command>,
    args: Vec<Vec<u8>>,
    current: Vec<u8>,
    has_current: bool,
    paren_depth: usize,
    in_bracket: bool,
    literal_size: usize,
    literal_sync: bool,
    literal_left: usize,
    line_len: usize,
    skip_reply: Option<Reply>,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    pub fn new() -> Self {
        Receiver {
            state: State::Tag,
            tag: String::new(),
            is_uid: false,
            command: None,
            args: Vec::new(),
            current: Vec::new(),
            has_current: false,
            paren_depth: 0,
            in_bracket: false,
            literal_size: 0,
            literal_sync: true,
            literal_left: 0,
            line_len: 0,
            skip_reply: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Receiver::new();
    }

    /// The command of the request currently being assembled, if the command
    /// word has been seen.
    pub fn pending_command(&self) -> Option<Command> {
        self.command
    }

    /// Take the partially assembled request; used by APPEND when the literal
    /// header arrives. The receiver is reset afterwards.
    pub fn take_pending(&mut self) -> Request {
        self.end_argument();
        let request = Request {
            tag: std::mem::take(&mut self.tag),
            command: self.command.unwrap_or(Command::Noop),
            args: std::mem::take(&mut self.args),
        };
        self.reset();
        request
    }

    fn end_argument(&mut self) {
        if self.has_current {
            self.args.push(std::mem::take(&mut self.current));
            self.has_current = false;
        }
        self.paren_depth = 0;
        self.in_bracket = false;
    }

    fn fail(&mut self, code: ReplyCode) {
        self.skip_reply = Some(Reply::of(code));
        self.state = State::SkipLine;
    }

    fn finish_line(&mut self) -> Result<Request, Error> {
        self.end_argument();
        let request = Request {
            tag: std::mem::take(&mut self.tag),
            command: self.command.take().unwrap_or(Command::Noop),
            args: std::mem::take(&mut self.args),
        };
        self.reset();
        Ok(request)
    }

    pub fn parse(&mut self, bytes: &mut std::slice::Iter<'_, u8>) -> Result<Request, Error> {
        while let Some(&byte) = {
            // Literal bytes are consumed in bulk below, everything else
            // byte-wise.
            if self.state == State::Literal {
                let take = self.literal_left.min(bytes.as_slice().len());
                self.current.extend_from_slice(&bytes.as_slice()[..take]);
                self.has_current = true;
                for _ in 0..take {
                    bytes.next();
                }
                self.literal_left -= take;
                if self.literal_left > 0 {
                    return Err(Error::NeedsMoreData);
                }
                self.args.push(std::mem::take(&mut self.current));
                self.has_current = false;
                self.state = State::Argument;
            }
            bytes.next()
        } {
            self.line_len += 1;
            if self.line_len > MAX_LINE_LEN && self.state != State::SkipLine {
                self.fail(ReplyCode::CommandTooLong);
            }
            match self.state {
                State::Tag => match byte {
                    b'\r' | b'\n' => {
                        if !self.tag.is_empty() {
                            let tag = std::mem::take(&mut self.tag);
                            self.reset();
                            return Err(Error::Error {
                                tag,
                                reply: Reply::of(ReplyCode::ParameterError),
                            });
                        }
                        self.line_len = 0;
                    }
                    b' ' => {
                        if self.tag.is_empty() {
                            self.fail(ReplyCode::ParameterError);
                        } else {
                            self.state = State::Command;
                        }
                    }
                    _ => {
                        if byte.is_ascii_graphic() && self.tag.len() < 64 {
                            self.tag.push(byte as char);
                        } else {
                            self.fail(ReplyCode::ParameterError);
                        }
                    }
                },
                State::Command => match byte {
                    b' ' | b'\r' | b'\n' => {
                        if self.current.is_empty() && byte == b' ' {
                            continue;
                        }
                        let word = std::mem::take(&mut self.current).to_ascii_uppercase();
                        if word == b"UID" && !self.is_uid {
                            self.is_uid = true;
                            continue;
                        }
                        match Command::parse(&word, self.is_uid) {
                            Some(command) => {
                                self.command = Some(command);
                                if byte == b' ' {
                                    self.state = State::Argument;
                                } else if byte == b'\n' {
                                    return self.finish_line();
                                } else {
                                    self.state = State::Argument;
                                }
                            }
                            None => {
                                if byte == b'\n' {
                                    let tag = std::mem::take(&mut self.tag);
                                    self.reset();
                                    return Err(Error::Error {
                                        tag,
                                        reply: Reply::of(ReplyCode::ParameterError),
                                    });
                                }
                                self.fail(ReplyCode::ParameterError);
                            }
                        }
                    }
                    _ => self.current.push(byte),
                },
                State::Argument => match byte {
                    b' ' if self.paren_depth == 0 && !self.in_bracket => {
                        self.end_argument();
                    }
                    b'(' if !self.in_bracket => {
                        self.paren_depth += 1;
                        self.has_current = true;
                        self.current.push(byte);
                    }
                    b')' if !self.in_bracket && self.paren_depth > 0 => {
                        self.current.push(byte);
                        self.paren_depth -= 1;
                        if self.paren_depth == 0 {
                            self.end_argument();
                        }
                    }
                    b'[' if self.paren_depth == 0 && !self.in_bracket => {
                        self.in_bracket = true;
                        self.has_current = true;
                        self.current.push(byte);
                    }
                    b']' if self.in_bracket => {
                        self.in_bracket = false;
                        self.current.push(byte);
                    }
                    b'"' if self.paren_depth == 0 && !self.in_bracket
                        && !self.has_current =>
                    {
                        self.has_current = true;
                        self.state = State::Quoted;
                    }
                    b'{' if self.paren_depth == 0 && !self.in_bracket
                        && !self.has_current =>
                    {
                        self.literal_size = 0;
                        self.literal_sync = true;
                        self.state = State::LiteralHeader;
                    }
                    b'\r' => (),
                    b'\n' => return self.finish_line(),
                    _ => {
                        self.has_current = true;
                        self.current.push(byte);
                    }
                },
                State::Quoted => match byte {
                    b'"' => {
                        self.args.push(std::mem::take(&mut self.current));
                        self.has_current = false;
                        self.state = State::Argument;
                    }
                    b'\\' => self.state = State::QuotedEscape,
                    b'\r' | b'\n' => {
                        let tag = std::mem::take(&mut self.tag);
                        self.reset();
                        return Err(Error::Error {
                            tag,
                            reply: Reply::of(ReplyCode::ParameterError),
                        });
                    }
                    _ => self.current.push(byte),
                },
                State::QuotedEscape => {
                    self.current.push(byte);
                    self.state = State::Quoted;
                }
                State::LiteralHeader => match byte {
                    b'0'..=b'9' => {
                        self.literal_size = self
                            .literal_size
                            .saturating_mul(10)
                            .saturating_add((byte - b'0') as usize);
                    }
                    b'+' => self.literal_sync = false,
                    b'}' => self.state = State::LiteralLf,
                    _ => {
                        self.fail(ReplyCode::ParameterError);
                    }
                },
                State::LiteralLf => match byte {
                    b'\r' => (),
                    b'\n' => {
                        if self.command != Some(Command::Append)
                            && self.literal_size > MAX_LITERAL_SIZE
                        {
                            self.fail(ReplyCode::CommandTooLong);
                            continue;
                        }
                        self.literal_left = self.literal_size;
                        self.state = State::Literal;
                        return Err(Error::NeedsLiteral {
                            size: self.literal_size,
                            sync: self.literal_sync,
                        });
                    }
                    _ => {
                        self.fail(ReplyCode::ParameterError);
                    }
                },
                State::Literal => unreachable!(),
                State::SkipLine => {
                    if byte == b'\n' {
                        let tag = std::mem::take(&mut self.tag);
                        let reply = self
                            .skip_reply
                            .take()
                            .unwrap_or_else(|| Reply::of(ReplyCode::ParameterError));
                        self.reset();
                        return Err(Error::Error { tag, reply });
                    }
                }
            }
        }
        Err(Error::NeedsMoreData)
    }
}
