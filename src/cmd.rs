use std::collections::HashMap;
use once_cell::sync::Lazy;
use crate::db::Db;

/// Shared reply frames.
pub static OK: &[u8] = b"+OK\r\n";
pub static PONG: &[u8] = b"+PONG\r\n";
pub static NULL_BULK: &[u8] = b"$-1\r\n";
pub static EMPTY_MULTI_BULK: &[u8] = b"*0\r\n";
pub static WRONG_ARITY_ERR: &[u8] = b"-ERR wrong number of arguments\r\n";
pub static UNKNOWN_CMD_ERR: &[u8] = b"-ERR unknown command\r\n";
pub static OOM_ERR: &[u8] = b"-ERR out of memory\r\n";

/// Command Table
static CMD_TABLE: Lazy<HashMap<&'static [u8], Command>> = Lazy::new(|| {
    HashMap::from([
        (&b"ping"[..], Command { name: "ping", proc: ping_command, arity: -1 }),
        (&b"echo"[..], Command { name: "echo", proc: echo_command, arity: 2 }),
        (&b"set"[..], Command { name: "set", proc: set_command, arity: 3 }),
        (&b"get"[..], Command { name: "get", proc: get_command, arity: 2 }),
        (&b"command"[..], Command { name: "command", proc: command_command, arity: -1 }),
        (&b"quit"[..], Command { name: "quit", proc: quit_command, arity: 1 }),
    ])
});

pub fn lookup_command(name: &[u8]) -> Option<&'static Command> {
    let mut name = name.to_vec();
    name.make_ascii_lowercase();
    CMD_TABLE.get(name.as_slice())
}

type CommandProc = fn(&mut Db, &mut Reply, &[&[u8]]);

pub struct Command {
    name: &'static str,
    proc: CommandProc,
    arity: i32,         // positive: exact argc; negative: minimum argc
}

impl Command {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn arity(&self) -> i32 {
        self.arity
    }
}

/// Borrowed reply sink for one dispatch: the connection's pending
/// output plus the flag that schedules teardown once it is flushed.
pub struct Reply<'a> {
    pub out: &'a mut Vec<u8>,
    pub close: &'a mut bool,
}

impl<'a> Reply<'a> {
    pub fn add_reply(&mut self, frame: &[u8]) {
        self.out.extend_from_slice(frame);
    }

    pub fn add_reply_bulk(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
        self.out.extend_from_slice(bytes);
        self.out.extend_from_slice(b"\r\n");
    }

    pub fn add_reply_error(&mut self, msg: &str) {
        self.out.extend_from_slice(format!("-ERR {}\r\n", msg).as_bytes());
    }

    pub fn add_reply_integer(&mut self, n: i64) {
        self.out.extend_from_slice(format!(":{}\r\n", n).as_bytes());
    }

    pub fn add_reply_multi_bulk_len(&mut self, n: usize) {
        self.out.extend_from_slice(format!("*{}\r\n", n).as_bytes());
    }
}

/// Execute one parsed command. The first token is the verb, matched
/// case-insensitively; the rest are its arguments. Callers guarantee
/// `argv` is non-empty. Per-command failures are reported inline and
/// never cost the connection.
pub fn dispatch(db: &mut Db, r: &mut Reply, argv: &[&[u8]]) {
    let cmd = match lookup_command(argv[0]) {
        Some(cmd) => cmd,
        None => {
            r.add_reply(UNKNOWN_CMD_ERR);
            return;
        },
    };
    if (cmd.arity > 0 && argv.len() as i32 != cmd.arity) || (argv.len() as i32) < -cmd.arity {
        r.add_reply(WRONG_ARITY_ERR);
        return;
    }
    (cmd.proc)(db, r, argv);
}

fn ping_command(_db: &mut Db, r: &mut Reply, argv: &[&[u8]]) {
    match argv.len() {
        1 => r.add_reply(PONG),
        2 => r.add_reply_bulk(argv[1]),
        _ => r.add_reply(WRONG_ARITY_ERR),
    }
}

fn echo_command(_db: &mut Db, r: &mut Reply, argv: &[&[u8]]) {
    r.add_reply_bulk(argv[1]);
}

fn set_command(db: &mut Db, r: &mut Reply, argv: &[&[u8]]) {
    match db.set(argv[1], argv[2]) {
        Some(()) => r.add_reply(OK),
        None => r.add_reply(OOM_ERR),
    }
}

fn get_command(db: &mut Db, r: &mut Reply, argv: &[&[u8]]) {
    match db.get(argv[1]) {
        Some(value) => r.add_reply_bulk(value),
        None => r.add_reply(NULL_BULK),
    }
}

/// Enough of COMMAND for client handshakes: an empty array.
fn command_command(_db: &mut Db, r: &mut Reply, _argv: &[&[u8]]) {
    r.add_reply(EMPTY_MULTI_BULK);
}

/// Normal command procs cannot close the connection safely; QUIT only
/// marks it so the event loop tears it down once the reply is flushed.
fn quit_command(_db: &mut Db, r: &mut Reply, _argv: &[&[u8]]) {
    r.add_reply(OK);
    *r.close = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(db: &mut Db, argv: &[&[u8]]) -> (Vec<u8>, bool) {
        let mut out = Vec::new();
        let mut close = false;
        dispatch(db, &mut Reply { out: &mut out, close: &mut close }, argv);
        (out, close)
    }

    #[test]
    fn ping_with_and_without_argument() {
        let mut db = Db::with_arena_capacity(64);
        let (out, _) = run(&mut db, &[&b"PING"[..]]);
        assert_eq!(out, b"+PONG\r\n".to_vec());
        let (out, _) = run(&mut db, &[&b"PING"[..], &b"hi"[..]]);
        assert_eq!(out, b"$2\r\nhi\r\n".to_vec());
        let (out, _) = run(&mut db, &[&b"PING"[..], &b"a"[..], &b"b"[..]]);
        assert_eq!(out, WRONG_ARITY_ERR.to_vec());
    }

    #[test]
    fn echo_replies_bulk() {
        let mut db = Db::with_arena_capacity(64);
        let (out, _) = run(&mut db, &[&b"echo"[..], &b"hello"[..]]);
        assert_eq!(out, b"$5\r\nhello\r\n".to_vec());
    }

    #[test]
    fn set_then_get() {
        let mut db = Db::with_arena_capacity(64);
        let (out, _) = run(&mut db, &[&b"SET"[..], &b"key"[..], &b"val"[..]]);
        assert_eq!(out, b"+OK\r\n".to_vec());
        let (out, _) = run(&mut db, &[&b"GET"[..], &b"key"[..]]);
        assert_eq!(out, b"$3\r\nval\r\n".to_vec());
    }

    #[test]
    fn get_missing_key_is_null_bulk() {
        let mut db = Db::with_arena_capacity(64);
        let (out, _) = run(&mut db, &[&b"GET"[..], &b"nope"[..]]);
        assert_eq!(out, b"$-1\r\n".to_vec());
    }

    #[test]
    fn overwrite_returns_the_second_value() {
        let mut db = Db::with_arena_capacity(64);
        run(&mut db, &[&b"SET"[..], &b"k"[..], &b"a"[..]]);
        run(&mut db, &[&b"SET"[..], &b"k"[..], &b"bb"[..]]);
        let (out, _) = run(&mut db, &[&b"GET"[..], &b"k"[..]]);
        assert_eq!(out, b"$2\r\nbb\r\n".to_vec());
    }

    #[test]
    fn unknown_command_replies_err() {
        let mut db = Db::with_arena_capacity(64);
        let (out, _) = run(&mut db, &[&b"BAD"[..]]);
        assert!(out.starts_with(b"-ERR"));
    }

    #[test]
    fn set_with_missing_arguments() {
        let mut db = Db::with_arena_capacity(64);
        let (out, _) = run(&mut db, &[&b"SET"[..], &b"key"[..]]);
        assert_eq!(out, WRONG_ARITY_ERR.to_vec());
    }

    #[test]
    fn set_on_exhausted_arena_replies_oom() {
        let mut db = Db::with_arena_capacity(2);
        let (out, _) = run(&mut db, &[&b"SET"[..], &b"k"[..], &b"way too big"[..]]);
        assert_eq!(out, OOM_ERR.to_vec());
        // The connection stays usable.
        let (out, _) = run(&mut db, &[&b"SET"[..], &b"k"[..], &b"ab"[..]]);
        assert_eq!(out, b"+OK\r\n".to_vec());
    }

    #[test]
    fn command_stub_replies_empty_array() {
        let mut db = Db::with_arena_capacity(64);
        let (out, _) = run(&mut db, &[&b"COMMAND"[..], &b"DOCS"[..]]);
        assert_eq!(out, b"*0\r\n".to_vec());
    }

    #[test]
    fn quit_marks_the_connection() {
        let mut db = Db::with_arena_capacity(64);
        let (out, close) = run(&mut db, &[&b"QUIT"[..]]);
        assert_eq!(out, b"+OK\r\n".to_vec());
        assert!(close);
    }

    #[test]
    fn verbs_match_case_insensitively() {
        assert_eq!(lookup_command(b"GeT").unwrap().name(), "get");
        assert_eq!(lookup_command(b"set").unwrap().arity(), 3);
        assert!(lookup_command(b"nosuch").is_none());
    }

    #[test]
    fn reply_encoders_frame_correctly() {
        let mut out = Vec::new();
        let mut close = false;
        let mut r = Reply { out: &mut out, close: &mut close };
        r.add_reply_integer(42);
        r.add_reply_multi_bulk_len(2);
        r.add_reply_bulk(b"");
        r.add_reply_error("boom");
        assert_eq!(out, b":42\r\n*2\r\n$0\r\n\r\n-ERR boom\r\n".to_vec());
    }
}
