//! Minimal RESP2 server on loopback for exercising [`RedisAccessor`]
//! against real wire traffic.
//!
//! Implements only the read commands the accessor issues, over an
//! in-memory keyspace that tests mutate directly. Every received command
//! is logged so tests can assert on the exact arguments sent.
//!
//! [`RedisAccessor`]: crate::RedisAccessor

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

#[derive(Default)]
struct Keyspace {
    sets: HashMap<String, BTreeSet<String>>,
    lists: HashMap<String, Vec<String>>,
    /// Members kept sorted by score, as ZRANGE returns them.
    zsets: HashMap<String, Vec<(String, f64)>>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    log: Vec<Vec<String>>,
}

pub struct FakeRedis {
    addr: SocketAddr,
    data: Arc<Mutex<Keyspace>>,
}

impl FakeRedis {
    /// Bind an ephemeral loopback port and serve connections on background
    /// threads for the rest of the test process.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let data = Arc::new(Mutex::new(Keyspace::default()));

        let shared = data.clone();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let data = shared.clone();
                thread::spawn(move || serve(stream, data));
            }
        });

        Self { addr, data }
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    fn data(&self) -> MutexGuard<'_, Keyspace> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sadd(&self, key: &str, members: &[&str]) {
        self.data()
            .sets
            .entry(key.to_string())
            .or_default()
            .extend(members.iter().map(|m| m.to_string()));
    }

    pub fn rpush(&self, key: &str, items: &[&str]) {
        self.data()
            .lists
            .entry(key.to_string())
            .or_default()
            .extend(items.iter().map(|i| i.to_string()));
    }

    pub fn zadd(&self, key: &str, member: &str, score: f64) {
        let mut data = self.data();
        let zset = data.zsets.entry(key.to_string()).or_default();
        zset.retain(|(m, _)| m != member);
        zset.push((member.to_string(), score));
        zset.sort_by(|a, b| a.1.total_cmp(&b.1));
    }

    pub fn hset(&self, key: &str, fields: &[(&str, &str)]) {
        self.data().hashes.entry(key.to_string()).or_default().extend(
            fields
                .iter()
                .map(|(f, v)| (f.to_string(), v.to_string())),
        );
    }

    pub fn del(&self, key: &str) {
        let mut data = self.data();
        data.sets.remove(key);
        data.lists.remove(key);
        data.zsets.remove(key);
        data.hashes.remove(key);
    }

    /// Every command received so far whose name matches `name`.
    pub fn commands(&self, name: &str) -> Vec<Vec<String>> {
        self.data()
            .log
            .iter()
            .filter(|args| args.first().is_some_and(|c| c.eq_ignore_ascii_case(name)))
            .cloned()
            .collect()
    }
}

fn serve(stream: TcpStream, data: Arc<Mutex<Keyspace>>) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut writer = stream;
    while let Some(args) = read_command(&mut reader) {
        let reply = {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            let reply = execute(&data, &args);
            data.log.push(args);
            reply
        };
        if writer.write_all(reply.as_bytes()).is_err() {
            return;
        }
    }
}

fn read_command(reader: &mut impl BufRead) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).ok()?;
        buf.truncate(len);
        args.push(String::from_utf8(buf).ok()?);
    }
    Some(args)
}

fn execute(data: &Keyspace, args: &[String]) -> String {
    let command = args[0].to_ascii_uppercase();
    let key = args.get(1).map(String::as_str).unwrap_or_default();
    match command.as_str() {
        "PING" => "+PONG\r\n".to_string(),
        "SMEMBERS" => array(data.sets.get(key).into_iter().flatten().map(|m| Some(m.as_str()))),
        "LLEN" => integer(data.lists.get(key).map_or(0, Vec::len)),
        "ZCARD" => integer(data.zsets.get(key).map_or(0, Vec::len)),
        "ZCOUNT" => {
            let (min, max) = (&args[2], &args[3]);
            let count = data
                .zsets
                .get(key)
                .into_iter()
                .flatten()
                .filter(|(_, score)| above(*score, min) && below(*score, max))
                .count();
            integer(count)
        }
        "ZRANGE" => {
            let members = data.zsets.get(key).map(Vec::as_slice).unwrap_or_default();
            let len = members.len() as i64;
            let index = |raw: &str| {
                let i: i64 = raw.parse().unwrap_or(0);
                if i < 0 { (len + i).max(0) } else { i.min(len) }
            };
            let (start, stop) = (index(&args[2]), index(&args[3]).min(len - 1));
            let picked: Vec<Option<&str>> = if len == 0 || start > stop {
                Vec::new()
            } else {
                members[start as usize..=stop as usize]
                    .iter()
                    .map(|(m, _)| Some(m.as_str()))
                    .collect()
            };
            array(picked.into_iter())
        }
        "EXISTS" => {
            let exists = data.sets.contains_key(key)
                || data.lists.contains_key(key)
                || data.zsets.contains_key(key)
                || data.hashes.contains_key(key);
            integer(usize::from(exists))
        }
        "HMGET" => {
            let hash = data.hashes.get(key);
            array(
                args[2..]
                    .iter()
                    .map(|field| hash.and_then(|h| h.get(field)).map(String::as_str)),
            )
        }
        _ => "+OK\r\n".to_string(),
    }
}

fn bound(raw: &str) -> (f64, bool) {
    let (value, exclusive) = match raw.strip_prefix('(') {
        Some(rest) => (rest, true),
        None => (raw, false),
    };
    let value = match value {
        "+inf" | "inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        other => other.parse().unwrap_or(0.0),
    };
    (value, exclusive)
}

fn above(score: f64, min: &str) -> bool {
    let (min, exclusive) = bound(min);
    if exclusive { score > min } else { score >= min }
}

fn below(score: f64, max: &str) -> bool {
    let (max, exclusive) = bound(max);
    if exclusive { score < max } else { score <= max }
}

fn integer(n: usize) -> String {
    format!(":{n}\r\n")
}

fn array<'a>(items: impl Iterator<Item = Option<&'a str>>) -> String {
    let items: Vec<_> = items.collect();
    let mut out = format!("*{}\r\n", items.len());
    for item in items {
        match item {
            Some(value) => out.push_str(&format!("${}\r\n{value}\r\n", value.len())),
            None => out.push_str("$-1\r\n"),
        }
    }
    out
}
