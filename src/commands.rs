//! The per-command surface, shared by the client and by pipelines.
//!
//! Every method only builds a [`Command`] and hands it to
//! [`Commands::command`]; the implementor decides whether that dispatches
//! now (client) or queues (pipeline).

use crate::command::{ArgValue, CallArgs, Command, ReplyShape};

fn cmd(name: &str) -> Command {
    Command::new(name)
}

fn key_cmd(name: &str, key: &str) -> Command {
    Command::new(name).arg(key)
}

pub trait Commands {
    type Reply<'a>
    where
        Self: 'a;

    /// Run or queue one command.
    fn command(&self, cmd: Command) -> Self::Reply<'_>;

    /// Raw escape hatch: any command by name.
    fn call(&self, name: &str, args: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(cmd(name).args(args))
    }

    // ── Strings ────────────────────────────────────────────────────

    fn get(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("GET", key))
    }

    fn set(&self, key: &str, value: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("SET", key).arg(value))
    }

    /// SET with an expiry in seconds.
    fn set_ex(&self, key: &str, value: impl Into<ArgValue>, seconds: u64) -> Self::Reply<'_> {
        self.command(key_cmd("SET", key).arg(value).arg("EX").arg(seconds))
    }

    /// SET … NX. Replies nil when the key already exists.
    fn set_nx(&self, key: &str, value: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("SET", key).arg(value).arg("NX"))
    }

    fn setnx(&self, key: &str, value: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("SETNX", key).arg(value))
    }

    fn getset(&self, key: &str, value: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("GETSET", key).arg(value))
    }

    /// Nil entries for missing keys stay in place.
    fn mget(&self, keys: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(cmd("MGET").args(keys))
    }

    fn mset(&self, pairs: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(cmd("MSET").args(pairs))
    }

    fn incr(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("INCR", key))
    }

    fn incrby(&self, key: &str, by: i64) -> Self::Reply<'_> {
        self.command(key_cmd("INCRBY", key).arg(by))
    }

    fn incrbyfloat(&self, key: &str, by: f64) -> Self::Reply<'_> {
        self.command(key_cmd("INCRBYFLOAT", key).arg(by))
    }

    fn decr(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("DECR", key))
    }

    fn decrby(&self, key: &str, by: i64) -> Self::Reply<'_> {
        self.command(key_cmd("DECRBY", key).arg(by))
    }

    fn append(&self, key: &str, value: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("APPEND", key).arg(value))
    }

    fn strlen(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("STRLEN", key))
    }

    // ── Keys ───────────────────────────────────────────────────────

    fn del(&self, keys: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(cmd("DEL").args(keys))
    }

    fn exists(&self, keys: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(cmd("EXISTS").args(keys))
    }

    fn expire(&self, key: &str, seconds: i64) -> Self::Reply<'_> {
        self.command(key_cmd("EXPIRE", key).arg(seconds))
    }

    fn pexpire(&self, key: &str, millis: i64) -> Self::Reply<'_> {
        self.command(key_cmd("PEXPIRE", key).arg(millis))
    }

    fn ttl(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("TTL", key))
    }

    fn pttl(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("PTTL", key))
    }

    fn persist(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("PERSIST", key))
    }

    fn keys(&self, pattern: &str) -> Self::Reply<'_> {
        self.command(key_cmd("KEYS", pattern).shape(ReplyShape::TextList))
    }

    fn rename(&self, key: &str, new_key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("RENAME", key).arg(new_key))
    }

    /// `TYPE`.
    fn key_type(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("TYPE", key))
    }

    // ── Hashes ─────────────────────────────────────────────────────

    fn hget(&self, key: &str, field: &str) -> Self::Reply<'_> {
        self.command(key_cmd("HGET", key).arg(field))
    }

    /// Accepts `[field, value, …]` or an object of field/value pairs.
    fn hset(&self, key: &str, fields: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("HSET", key).args(fields))
    }

    fn hmset(&self, key: &str, fields: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("HMSET", key).args(fields))
    }

    fn hsetnx(&self, key: &str, field: &str, value: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("HSETNX", key).arg(field).arg(value))
    }

    fn hmget(&self, key: &str, fields: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("HMGET", key).args(fields))
    }

    /// Flat `[field, value, …]`.
    fn hgetall(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("HGETALL", key))
    }

    fn hdel(&self, key: &str, fields: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("HDEL", key).args(fields))
    }

    fn hexists(&self, key: &str, field: &str) -> Self::Reply<'_> {
        self.command(key_cmd("HEXISTS", key).arg(field))
    }

    fn hkeys(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("HKEYS", key).shape(ReplyShape::TextList))
    }

    fn hvals(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("HVALS", key).shape(ReplyShape::TextList))
    }

    fn hlen(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("HLEN", key))
    }

    fn hincrby(&self, key: &str, field: &str, by: i64) -> Self::Reply<'_> {
        self.command(key_cmd("HINCRBY", key).arg(field).arg(by))
    }

    // ── Lists ──────────────────────────────────────────────────────

    fn lpush(&self, key: &str, values: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("LPUSH", key).args(values))
    }

    fn rpush(&self, key: &str, values: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("RPUSH", key).args(values))
    }

    fn lpop(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("LPOP", key))
    }

    fn rpop(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("RPOP", key))
    }

    fn llen(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("LLEN", key))
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Self::Reply<'_> {
        self.command(key_cmd("LRANGE", key).arg(start).arg(stop).shape(ReplyShape::TextList))
    }

    fn lindex(&self, key: &str, index: i64) -> Self::Reply<'_> {
        self.command(key_cmd("LINDEX", key).arg(index))
    }

    fn lrem(&self, key: &str, count: i64, value: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("LREM", key).arg(count).arg(value))
    }

    fn ltrim(&self, key: &str, start: i64, stop: i64) -> Self::Reply<'_> {
        self.command(key_cmd("LTRIM", key).arg(start).arg(stop))
    }

    /// `[key, value]`, or nil after `timeout` seconds (0 blocks forever).
    fn blpop(&self, keys: impl Into<CallArgs>, timeout: f64) -> Self::Reply<'_> {
        self.command(cmd("BLPOP").args(keys).arg(timeout))
    }

    fn brpop(&self, keys: impl Into<CallArgs>, timeout: f64) -> Self::Reply<'_> {
        self.command(cmd("BRPOP").args(keys).arg(timeout))
    }

    // ── Sets ───────────────────────────────────────────────────────

    fn sadd(&self, key: &str, members: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("SADD", key).args(members))
    }

    fn srem(&self, key: &str, members: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("SREM", key).args(members))
    }

    fn smembers(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("SMEMBERS", key).shape(ReplyShape::TextList))
    }

    fn sismember(&self, key: &str, member: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("SISMEMBER", key).arg(member))
    }

    fn scard(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("SCARD", key))
    }

    fn sinter(&self, keys: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(cmd("SINTER").args(keys).shape(ReplyShape::TextList))
    }

    fn sunion(&self, keys: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(cmd("SUNION").args(keys).shape(ReplyShape::TextList))
    }

    // ── Sorted sets ────────────────────────────────────────────────

    /// `zadd(key, [score, member, …])`.
    fn zadd(&self, key: &str, entries: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("ZADD", key).args(entries))
    }

    fn zrem(&self, key: &str, members: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(key_cmd("ZREM", key).args(members))
    }

    fn zscore(&self, key: &str, member: &str) -> Self::Reply<'_> {
        self.command(key_cmd("ZSCORE", key).arg(member).shape(ReplyShape::Score))
    }

    fn zincrby(&self, key: &str, by: f64, member: &str) -> Self::Reply<'_> {
        self.command(key_cmd("ZINCRBY", key).arg(by).arg(member).shape(ReplyShape::Score))
    }

    fn zcard(&self, key: &str) -> Self::Reply<'_> {
        self.command(key_cmd("ZCARD", key))
    }

    fn zcount(&self, key: &str, min: impl Into<ArgValue>, max: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("ZCOUNT", key).arg(min).arg(max))
    }

    fn zrank(&self, key: &str, member: &str) -> Self::Reply<'_> {
        self.command(key_cmd("ZRANK", key).arg(member))
    }

    fn zrange(&self, key: &str, start: i64, stop: i64) -> Self::Reply<'_> {
        self.command(key_cmd("ZRANGE", key).arg(start).arg(stop).shape(ReplyShape::TextList))
    }

    /// `[member, score, …]`.
    fn zrange_withscores(&self, key: &str, start: i64, stop: i64) -> Self::Reply<'_> {
        self.command(
            key_cmd("ZRANGE", key)
                .arg(start)
                .arg(stop)
                .arg("WITHSCORES")
                .shape(ReplyShape::Pairs),
        )
    }

    fn zrevrange(&self, key: &str, start: i64, stop: i64) -> Self::Reply<'_> {
        self.command(key_cmd("ZREVRANGE", key).arg(start).arg(stop).shape(ReplyShape::TextList))
    }

    fn zrevrange_withscores(&self, key: &str, start: i64, stop: i64) -> Self::Reply<'_> {
        self.command(
            key_cmd("ZREVRANGE", key)
                .arg(start)
                .arg(stop)
                .arg("WITHSCORES")
                .shape(ReplyShape::Pairs),
        )
    }

    fn zrangebyscore(&self, key: &str, min: impl Into<ArgValue>, max: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("ZRANGEBYSCORE", key).arg(min).arg(max).shape(ReplyShape::TextList))
    }

    fn zrangebyscore_withscores(
        &self,
        key: &str,
        min: impl Into<ArgValue>,
        max: impl Into<ArgValue>,
    ) -> Self::Reply<'_> {
        self.command(
            key_cmd("ZRANGEBYSCORE", key)
                .arg(min)
                .arg(max)
                .arg("WITHSCORES")
                .shape(ReplyShape::Pairs),
        )
    }

    fn zpopmin(&self, key: &str, count: u32) -> Self::Reply<'_> {
        self.command(key_cmd("ZPOPMIN", key).arg(count).shape(ReplyShape::Pairs))
    }

    fn zpopmax(&self, key: &str, count: u32) -> Self::Reply<'_> {
        self.command(key_cmd("ZPOPMAX", key).arg(count).shape(ReplyShape::Pairs))
    }

    /// `[key, member, score]`, or nil on timeout.
    fn bzpopmin(&self, keys: impl Into<CallArgs>, timeout: f64) -> Self::Reply<'_> {
        self.command(cmd("BZPOPMIN").args(keys).arg(timeout).shape(ReplyShape::PopTuple))
    }

    fn bzpopmax(&self, keys: impl Into<CallArgs>, timeout: f64) -> Self::Reply<'_> {
        self.command(cmd("BZPOPMAX").args(keys).arg(timeout).shape(ReplyShape::PopTuple))
    }

    // ── Scripting ──────────────────────────────────────────────────

    fn eval(&self, script: &str, keys: &[&str], args: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(
            key_cmd("EVAL", script)
                .arg(keys.len())
                .args(keys)
                .args(args),
        )
    }

    fn evalsha(&self, sha: &str, keys: &[&str], args: impl Into<CallArgs>) -> Self::Reply<'_> {
        self.command(
            key_cmd("EVALSHA", sha)
                .arg(keys.len())
                .args(keys)
                .args(args),
        )
    }

    /// `SCRIPT LOAD`; replies with the script's SHA1.
    fn script_load(&self, script: &str) -> Self::Reply<'_> {
        self.command(key_cmd("SCRIPT", "LOAD").arg(script))
    }

    // ── Pub/sub & server ───────────────────────────────────────────

    fn publish(&self, channel: &str, message: impl Into<ArgValue>) -> Self::Reply<'_> {
        self.command(key_cmd("PUBLISH", channel).arg(message))
    }

    fn ping(&self) -> Self::Reply<'_> {
        self.command(cmd("PING"))
    }

    fn echo(&self, message: &str) -> Self::Reply<'_> {
        self.command(key_cmd("ECHO", message))
    }

    fn dbsize(&self) -> Self::Reply<'_> {
        self.command(cmd("DBSIZE"))
    }

    fn flushdb(&self) -> Self::Reply<'_> {
        self.command(cmd("FLUSHDB"))
    }

    fn flushall(&self) -> Self::Reply<'_> {
        self.command(cmd("FLUSHALL"))
    }

    fn info(&self, section: Option<&str>) -> Self::Reply<'_> {
        match section {
            Some(section) => self.command(key_cmd("INFO", section)),
            None => self.command(cmd("INFO")),
        }
    }

    /// `[seconds, microseconds]` as text.
    fn time(&self) -> Self::Reply<'_> {
        self.command(cmd("TIME").shape(ReplyShape::TextList))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
