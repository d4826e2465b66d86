//! Command Execution
//!
//! Maps a command name to a handler, validates argument arity and kinds,
//! performs the operation against the store and produces a [`Reply`].
//!
//! The executor is total: whatever the input, it returns a well-formed reply
//! and never panics or propagates an error to the connection layer. Unknown
//! commands fall through to a generic error reply. All validation happens
//! before any mutation, so a rejected command has no side effects.
//!
//! ## Command set
//!
//! | Command            | Reply on success        |
//! |--------------------|-------------------------|
//! | PING               | `+PONG`                 |
//! | ECHO msg           | `+msg`                  |
//! | SET key val        | `+OK`                   |
//! | GET key            | `+val`                  |
//! | DEL key [key ...]  | `+OK`                   |
//! | EXISTS key         | `#t` / `#f`             |
//! | INCR / DECR key    | `:n`                    |
//! | EX key seconds     | `+OK`                   |
//! | TTL key            | `+2d 3h 4m 5s`          |
//! | LPUSH / RPUSH k v  | `+OK`                   |
//! | LPOP / RPOP key    | `+val`                  |
//! | SADD / SREM k m    | `+OK`                   |
//! | SMEMBERS key       | `*n` + members          |

use crate::protocol::{Reply, Value};
use crate::storage::Store;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Executes commands against the shared store.
///
/// Cheap to clone; every connection task holds its own copy.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    store: Arc<Store>,
}

impl CommandExecutor {
    /// Creates an executor over the given store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Executes one command.
    ///
    /// `name` is case-folded to uppercase before dispatch; `args` are the
    /// request array's elements after the name.
    pub fn execute(&self, name: &str, args: &[Value]) -> Reply {
        match name.to_ascii_uppercase().as_str() {
            "PING" => Reply::pong(),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "INCR" => self.cmd_incr_by(args, 1, "incr"),
            "DECR" => self.cmd_incr_by(args, -1, "decr"),
            "EX" => self.cmd_ex(args),
            "TTL" => self.cmd_ttl(args),
            "LPUSH" => self.cmd_push(args, End::Front, "lpush"),
            "RPUSH" => self.cmd_push(args, End::Back, "rpush"),
            "LPOP" => self.cmd_pop(args, End::Front, "lpop"),
            "RPOP" => self.cmd_pop(args, End::Back, "rpop"),
            "SADD" => self.cmd_sadd(args),
            "SREM" => self.cmd_srem(args),
            "SMEMBERS" => self.cmd_smembers(args),
            _ => Reply::error("ERR unknown command"),
        }
    }

    // ========================================================================
    // Server commands
    // ========================================================================

    /// ECHO message
    fn cmd_echo(&self, args: &[Value]) -> Reply {
        if args.len() != 1 {
            return wrong_arity("echo");
        }
        match args[0].as_bulk() {
            Some(msg) => Reply::simple(msg.clone()),
            None => Reply::error("ERR first argument must be a bulk string"),
        }
    }

    // ========================================================================
    // String commands
    // ========================================================================

    /// SET key value
    fn cmd_set(&self, args: &[Value]) -> Reply {
        if args.len() != 2 {
            return wrong_arity("set");
        }
        let (key, value) = match (args[0].as_bulk(), args[1].as_bulk()) {
            (Some(k), Some(v)) => (k.clone(), v.clone()),
            _ => return Reply::error("ERR first two arguments must be bulk strings"),
        };

        self.store.set(key, value);
        Reply::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Value]) -> Reply {
        if args.len() != 1 {
            return wrong_arity("get");
        }
        let key = match nonempty_bulk(&args[0]) {
            Some(k) => k,
            None => return Reply::error("ERR first argument must be a bulk string"),
        };

        match self.store.get(key) {
            Ok(value) => Reply::Simple(value),
            Err(e) => store_error(e),
        }
    }

    /// DEL key [key ...]
    ///
    /// Idempotent: deleting keys that do not exist still replies `+OK`.
    fn cmd_del(&self, args: &[Value]) -> Reply {
        if args.is_empty() {
            return Reply::error("ERR no key provided");
        }

        let mut keys = Vec::with_capacity(args.len());
        for arg in args {
            match arg.as_bulk() {
                Some(k) => keys.push(k.clone()),
                None => return Reply::error("ERR all arguments must be bulk strings"),
            }
        }

        self.store.delete(&keys);
        Reply::ok()
    }

    /// EXISTS key
    fn cmd_exists(&self, args: &[Value]) -> Reply {
        if args.len() != 1 {
            return wrong_arity("exists");
        }
        let key = match nonempty_bulk(&args[0]) {
            Some(k) => k,
            None => return Reply::error("ERR first argument must be a bulk string"),
        };

        Reply::Bool(self.store.exists(key))
    }

    /// INCR key / DECR key
    fn cmd_incr_by(&self, args: &[Value], delta: i64, name: &str) -> Reply {
        if args.len() != 1 {
            return wrong_arity(name);
        }
        let key = match nonempty_bulk(&args[0]) {
            Some(k) => k,
            None => return Reply::error("ERR first argument must be a bulk string"),
        };

        match self.store.incr_by(key, delta) {
            Ok(n) => Reply::integer(n),
            Err(e) => store_error(e),
        }
    }

    /// EX key seconds
    fn cmd_ex(&self, args: &[Value]) -> Reply {
        if args.len() != 2 {
            return wrong_arity("ex");
        }
        let (key, seconds) = match (nonempty_bulk(&args[0]), nonempty_bulk(&args[1])) {
            (Some(k), Some(s)) => (k, s),
            _ => return Reply::error("ERR first two arguments must be bulk strings"),
        };

        let seconds: i64 = match std::str::from_utf8(seconds).ok().and_then(|s| s.parse().ok()) {
            Some(n) => n,
            None => return Reply::error("ERR second argument must be an integer"),
        };

        match self.store.expire_in(key, seconds) {
            Ok(()) => Reply::ok(),
            Err(e) => store_error(e),
        }
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[Value]) -> Reply {
        if args.len() != 1 {
            return wrong_arity("ttl");
        }
        let key = match nonempty_bulk(&args[0]) {
            Some(k) => k,
            None => return Reply::error("ERR first argument must be a bulk string"),
        };

        match self.store.ttl(key) {
            Ok(remaining) => Reply::simple(humanize(remaining)),
            Err(e) => store_error(e),
        }
    }

    // ========================================================================
    // List commands
    // ========================================================================

    /// LPUSH key value / RPUSH key value
    fn cmd_push(&self, args: &[Value], end: End, name: &str) -> Reply {
        if args.len() != 2 {
            return wrong_arity(name);
        }
        let (key, value) = match (nonempty_bulk(&args[0]), nonempty_bulk(&args[1])) {
            (Some(k), Some(v)) => (k.clone(), v.clone()),
            _ => return Reply::error("ERR first two arguments must be bulk strings"),
        };

        match end {
            End::Front => self.store.push_front(key, value),
            End::Back => self.store.push_back(key, value),
        };
        Reply::ok()
    }

    /// LPOP key / RPOP key
    fn cmd_pop(&self, args: &[Value], end: End, name: &str) -> Reply {
        if args.len() != 1 {
            return wrong_arity(name);
        }
        let key = match nonempty_bulk(&args[0]) {
            Some(k) => k,
            None => return Reply::error("ERR first argument must be a bulk string"),
        };

        let popped = match end {
            End::Front => self.store.pop_front(key),
            End::Back => self.store.pop_back(key),
        };

        match popped {
            Ok(value) => Reply::Simple(value),
            Err(e) => store_error(e),
        }
    }

    // ========================================================================
    // Set commands
    // ========================================================================

    /// SADD key member
    fn cmd_sadd(&self, args: &[Value]) -> Reply {
        if args.len() != 2 {
            return wrong_arity("sadd");
        }
        let (key, member) = match (nonempty_bulk(&args[0]), nonempty_bulk(&args[1])) {
            (Some(k), Some(m)) => (k.clone(), m.clone()),
            _ => return Reply::error("ERR first two arguments must be bulk strings"),
        };

        self.store.sadd(key, member);
        Reply::ok()
    }

    /// SREM key member
    ///
    /// Removing a member that is not in the set is a successful no-op;
    /// only a missing set errors.
    fn cmd_srem(&self, args: &[Value]) -> Reply {
        if args.len() != 2 {
            return wrong_arity("srem");
        }
        let (key, member) = match (nonempty_bulk(&args[0]), nonempty_bulk(&args[1])) {
            (Some(k), Some(m)) => (k, m),
            _ => return Reply::error("ERR first two arguments must be bulk strings"),
        };

        match self.store.srem(key, member) {
            Ok(()) => Reply::ok(),
            Err(e) => store_error(e),
        }
    }

    /// SMEMBERS key
    fn cmd_smembers(&self, args: &[Value]) -> Reply {
        if args.len() != 1 {
            return wrong_arity("smembers");
        }
        let key = match nonempty_bulk(&args[0]) {
            Some(k) => k,
            None => return Reply::error("ERR first argument must be a bulk string"),
        };

        match self.store.smembers(key) {
            Ok(members) => Reply::Members(members),
            Err(e) => store_error(e),
        }
    }
}

/// Which end of a list a push or pop targets.
#[derive(Debug, Clone, Copy)]
enum End {
    Front,
    Back,
}

/// The standard wrong-arity error reply.
fn wrong_arity(name: &str) -> Reply {
    Reply::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name
    ))
}

/// Maps a store failure onto its error reply.
fn store_error(e: crate::storage::StoreError) -> Reply {
    Reply::error(format!("ERR {}", e))
}

/// The bulk payload of `value`, rejecting arrays and empty bulks.
fn nonempty_bulk(value: &Value) -> Option<&Bytes> {
    value.as_bulk().filter(|b| !b.is_empty())
}

/// Renders a remaining duration as space-joined day/hour/minute/second
/// parts, omitting zero units; a fully elapsed duration renders as `0s`.
fn humanize(d: Duration) -> String {
    let mut seconds = d.as_secs();

    let days = seconds / (24 * 3600);
    seconds %= 24 * 3600;
    let hours = seconds / 3600;
    seconds %= 3600;
    let minutes = seconds / 60;
    seconds %= 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{}s", seconds));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    fn executor() -> CommandExecutor {
        CommandExecutor::new(Arc::new(Store::new()))
    }

    fn bulk(s: &str) -> Value {
        Value::bulk(s.to_string())
    }

    fn run(exec: &CommandExecutor, name: &str, args: &[&str]) -> Reply {
        let args: Vec<Value> = args.iter().map(|a| bulk(a)).collect();
        exec.execute(name, &args)
    }

    #[test]
    fn test_ping() {
        let exec = executor();
        assert_eq!(run(&exec, "PING", &[]), Reply::pong());
    }

    #[test]
    fn test_name_is_case_folded() {
        let exec = executor();
        assert_eq!(run(&exec, "ping", &[]), Reply::pong());
        assert_eq!(run(&exec, "PiNg", &[]), Reply::pong());
    }

    #[test]
    fn test_echo() {
        let exec = executor();
        assert_eq!(
            run(&exec, "ECHO", &["hello"]),
            Reply::simple("hello".to_string())
        );
        assert!(run(&exec, "ECHO", &[]).is_error());
        assert!(run(&exec, "ECHO", &["a", "b"]).is_error());
    }

    #[test]
    fn test_unknown_command() {
        let exec = executor();
        assert_eq!(
            run(&exec, "FROBNICATE", &["x"]),
            Reply::error("ERR unknown command")
        );
    }

    #[test]
    fn test_set_get() {
        let exec = executor();
        assert_eq!(run(&exec, "SET", &["k", "v"]), Reply::ok());
        assert_eq!(run(&exec, "GET", &["k"]), Reply::simple("v".to_string()));
    }

    #[test]
    fn test_get_missing() {
        let exec = executor();
        assert_eq!(
            run(&exec, "GET", &["nope"]),
            Reply::error("ERR key not found")
        );
    }

    #[test]
    fn test_set_wrong_arity() {
        let exec = executor();
        assert_eq!(
            run(&exec, "SET", &["k"]),
            Reply::error("ERR wrong number of arguments for 'set' command")
        );
    }

    #[test]
    fn test_set_rejects_array_argument() {
        let exec = executor();
        let args = vec![Value::array(vec![bulk("k")]), bulk("v")];
        assert_eq!(
            exec.execute("SET", &args),
            Reply::error("ERR first two arguments must be bulk strings")
        );
    }

    #[test]
    fn test_get_rejects_empty_key() {
        let exec = executor();
        assert_eq!(
            run(&exec, "GET", &[""]),
            Reply::error("ERR first argument must be a bulk string")
        );
    }

    #[test]
    fn test_del_is_idempotent() {
        let exec = executor();
        assert_eq!(run(&exec, "DEL", &["ghost"]), Reply::ok());
        run(&exec, "SET", &["k", "v"]);
        assert_eq!(run(&exec, "DEL", &["k", "ghost"]), Reply::ok());
        assert!(run(&exec, "GET", &["k"]).is_error());
    }

    #[test]
    fn test_del_requires_keys() {
        let exec = executor();
        assert_eq!(run(&exec, "DEL", &[]), Reply::error("ERR no key provided"));
    }

    #[test]
    fn test_exists() {
        let exec = executor();
        assert_eq!(run(&exec, "EXISTS", &["k"]), Reply::Bool(false));
        run(&exec, "SET", &["k", "v"]);
        assert_eq!(run(&exec, "EXISTS", &["k"]), Reply::Bool(true));
    }

    #[test]
    fn test_incr_decr() {
        let exec = executor();
        run(&exec, "SET", &["n", "10"]);
        assert_eq!(run(&exec, "INCR", &["n"]), Reply::integer(11));
        assert_eq!(run(&exec, "DECR", &["n"]), Reply::integer(10));
    }

    #[test]
    fn test_incr_missing_key_is_not_a_number() {
        let exec = executor();
        assert_eq!(
            run(&exec, "INCR", &["fresh"]),
            Reply::error("ERR value is not a number")
        );
        // The failed INCR must not create the key
        assert_eq!(run(&exec, "EXISTS", &["fresh"]), Reply::Bool(false));
    }

    #[test]
    fn test_ex_and_immediate_expiry() {
        let exec = executor();
        run(&exec, "SET", &["k", "v"]);
        assert_eq!(run(&exec, "EX", &["k", "0"]), Reply::ok());
        assert_eq!(run(&exec, "GET", &["k"]), Reply::error("ERR key not found"));
    }

    #[test]
    fn test_ex_missing_key() {
        let exec = executor();
        assert_eq!(
            run(&exec, "EX", &["ghost", "10"]),
            Reply::error("ERR key not found")
        );
    }

    #[test]
    fn test_ex_rejects_non_integer_seconds() {
        let exec = executor();
        run(&exec, "SET", &["k", "v"]);
        assert_eq!(
            run(&exec, "EX", &["k", "soon"]),
            Reply::error("ERR second argument must be an integer")
        );
    }

    #[test]
    fn test_ttl_without_expiry_is_not_found() {
        let exec = executor();
        run(&exec, "SET", &["k", "v"]);
        assert_eq!(run(&exec, "TTL", &["k"]), Reply::error("ERR key not found"));
    }

    #[test]
    fn test_ttl_reports_humanized_remainder() {
        let exec = executor();
        run(&exec, "SET", &["k", "v"]);
        run(&exec, "EX", &["k", "90061"]); // 1d 1h 1m 1s
        let reply = run(&exec, "TTL", &["k"]);
        match reply {
            // The clock ticks between EX and TTL, so the seconds part may
            // round down to the previous value.
            Reply::Simple(s) => {
                let text = std::str::from_utf8(&s).unwrap().to_string();
                assert!(text == "1d 1h 1m 1s" || text == "1d 1h 1m", "got {text:?}");
            }
            other => panic!("expected simple reply, got {other:?}"),
        }
    }

    #[test]
    fn test_list_round_trip() {
        let exec = executor();
        assert_eq!(run(&exec, "LPUSH", &["l", "a"]), Reply::ok());
        assert_eq!(run(&exec, "RPUSH", &["l", "b"]), Reply::ok());
        assert_eq!(run(&exec, "LPOP", &["l"]), Reply::simple("a".to_string()));
        assert_eq!(run(&exec, "RPOP", &["l"]), Reply::simple("b".to_string()));
        // Drained but still present
        assert_eq!(run(&exec, "LPOP", &["l"]), Reply::error("ERR list is empty"));
    }

    #[test]
    fn test_pop_missing_list() {
        let exec = executor();
        assert_eq!(
            run(&exec, "RPOP", &["ghost"]),
            Reply::error("ERR key not found")
        );
    }

    #[test]
    fn test_sadd_smembers_dedup() {
        let exec = executor();
        run(&exec, "SADD", &["s", "m"]);
        run(&exec, "SADD", &["s", "m"]);
        assert_eq!(
            run(&exec, "SMEMBERS", &["s"]),
            Reply::Members(vec![Bytes::from("m")])
        );
    }

    #[test]
    fn test_srem_then_empty_set() {
        let exec = executor();
        run(&exec, "SADD", &["s", "m"]);
        assert_eq!(run(&exec, "SREM", &["s", "m"]), Reply::ok());
        assert_eq!(
            run(&exec, "SMEMBERS", &["s"]),
            Reply::error("ERR set is empty")
        );
        // Absent member: no-op, still OK
        assert_eq!(run(&exec, "SREM", &["s", "ghost"]), Reply::ok());
    }

    #[test]
    fn test_srem_missing_set() {
        let exec = executor();
        assert_eq!(
            run(&exec, "SREM", &["ghost", "m"]),
            Reply::error("ERR key not found")
        );
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(Duration::ZERO), "0s");
        assert_eq!(humanize(Duration::from_secs(5)), "5s");
        assert_eq!(humanize(Duration::from_secs(60)), "1m");
        assert_eq!(humanize(Duration::from_secs(61)), "1m 1s");
        assert_eq!(humanize(Duration::from_secs(3600)), "1h");
        assert_eq!(humanize(Duration::from_secs(3661)), "1h 1m 1s");
        assert_eq!(humanize(Duration::from_secs(86400)), "1d");
        assert_eq!(humanize(Duration::from_secs(90061)), "1d 1h 1m 1s");
        // Zero units are omitted, not rendered
        assert_eq!(humanize(Duration::from_secs(86401)), "1d 1s");
    }
}
