use std::{cmp::Ordering, collections::HashMap, ops::BitOr, process::exit, sync::{Arc, RwLock}};
use once_cell::sync::Lazy;
use crate::{obj::{try_object_encoding, Object, CRLF, C_ONE, C_ZERO, EMPTY_MULTI_BULK, NULL_BULK, OK, PONG, SYNTAX_ERR, WRONG_TYPE_ERR}, server::{notify_keyspace_event, server_write, signal_modified_key}, skiplist::{sl_compare, RangeSpec, SkipList}, util::{log, LogLevel}};
use super::client::Client;


///
/// Commands.
///


/// Command Table
static CMD_TABLE: Lazy<HashMap<&str, Arc<Command>>> = Lazy::new(|| {
    HashMap::from([
        ("ping", Arc::new(Command { name: "ping", proc: Arc::new(ping_command), arity: 1, flags: CmdFlags::inline() })),
        ("echo", Arc::new(Command { name: "echo", proc: Arc::new(echo_command), arity: 2, flags: CmdFlags::inline() })),
        ("exists", Arc::new(Command { name: "exists", proc: Arc::new(exists_command), arity: 2, flags: CmdFlags::inline() })),
        ("del", Arc::new(Command { name: "del", proc: Arc::new(del_command), arity: -2, flags: CmdFlags::inline() })),
        ("type", Arc::new(Command { name: "type", proc: Arc::new(type_command), arity: 2, flags: CmdFlags::inline() })),
        ("dbsize", Arc::new(Command { name: "dbsize", proc: Arc::new(dbsize_command), arity: 1, flags: CmdFlags::inline() })),
        ("select", Arc::new(Command { name: "select", proc: Arc::new(select_command), arity: 2, flags: CmdFlags::inline() })),
        ("flushdb", Arc::new(Command { name: "flushdb", proc: Arc::new(flushdb_command), arity: 1, flags: CmdFlags::inline() })),
        ("flushall", Arc::new(Command { name: "flushall", proc: Arc::new(flushall_command), arity: 1, flags: CmdFlags::inline() })),
        ("shutdown", Arc::new(Command { name: "shutdown", proc: Arc::new(shutdown_command), arity: 1, flags: CmdFlags::inline() })),

        ("set", Arc::new(Command { name: "set", proc: Arc::new(set_command), arity: 3, flags: CmdFlags::inline() | CmdFlags::deny_oom() })),
        ("get", Arc::new(Command { name: "get", proc: Arc::new(get_command), arity: 2, flags: CmdFlags::inline() })),

        ("sladd", Arc::new(Command { name: "sladd", proc: Arc::new(sladd_command), arity: -4, flags: CmdFlags::inline() | CmdFlags::deny_oom() })),
        ("slrem", Arc::new(Command { name: "slrem", proc: Arc::new(slrem_command), arity: -3, flags: CmdFlags::inline() })),
        ("slall", Arc::new(Command { name: "slall", proc: Arc::new(slall_command), arity: 2, flags: CmdFlags::inline() })),
        ("slrange", Arc::new(Command { name: "slrange", proc: Arc::new(slrange_command), arity: 4, flags: CmdFlags::inline() })),
        ("slsearch", Arc::new(Command { name: "slsearch", proc: Arc::new(slsearch_command), arity: 3, flags: CmdFlags::inline() })),
        ("slcard", Arc::new(Command { name: "slcard", proc: Arc::new(slcard_command), arity: 2, flags: CmdFlags::inline() })),
    ])
});
pub fn lookup_command(name: &str) -> Option<Arc<Command>> {
    let name = name.to_lowercase();
    CMD_TABLE.get(&name[..]).map(|e| e.clone())
}


/// call() is the core of the execution of a command
pub fn call(c: &mut Client, cmd: Arc<Command>) {
    let f = &cmd.proc;
    f(c);

    server_write().stat_numcommands += 1;
}


pub struct Command {
    name: &'static str,
    proc: CommandProc,
    arity: i32,
    flags: CmdFlags,
}
impl Command {
    pub fn arity(&self) -> i32 {
        self.arity
    }
    pub fn name(&self) -> &str {
        self.name
    }
    pub fn flags(&self) -> &CmdFlags {
        &self.flags
    }
}

type CommandProc = Arc<dyn Fn(&mut Client) -> () + Sync + Send>;

/// Command flags
pub struct CmdFlags(u8);
impl CmdFlags {
    /// Inline command
    fn inline() -> CmdFlags {
        CmdFlags(1)
    }
    /// Commands marked with this flag will return an error when the
    /// 'maxmemory' option is set in the config file and the server is using
    /// more than maxmemory bytes of memory. In short these commands are
    /// denied on low memory conditions.
    fn deny_oom() -> CmdFlags {
        CmdFlags(2)
    }
    pub fn is_deny_oom(&self) -> bool {
        (self.0 & Self::deny_oom().0) != 0
    }
}
impl BitOr for CmdFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        CmdFlags(self.0 | rhs.0)
    }
}


fn ping_command(c: &mut Client) {
    c.add_reply(PONG.clone());
}

fn echo_command(c: &mut Client) {
    let arg = c.argv[1].clone();
    c.add_reply_bulk(&arg);
}

fn exists_command(c: &mut Client) {
    let ret = match c.lookup_key_read(c.argv[1].as_key()) {
        Some(_) => C_ONE.clone(),
        None => C_ZERO.clone(),
    };
    c.add_reply(ret);
}

fn del_command(c: &mut Client) {
    let mut deleted = 0;
    for i in 1..c.argv.len() {
        let key = c.argv[i].as_key().to_string();
        match c.delete_key(&key) {
            Some(_) => {
                server_write().dirty += 1;
                deleted += 1;
            },
            None => {},
        }
    }
    c.add_reply_i64(deleted);
}

fn type_command(c: &mut Client) {
    let ret = match c.lookup_key_read(c.argv[1].as_key()) {
        Some(obj) => {
            if obj.read().unwrap().is_string() { "+string" }
            else if obj.read().unwrap().is_skiplist() { "+skiplist" }
            else { "+unknown" }
        },
        None => { "+none" },
    };
    c.add_reply_str(ret);
    c.add_reply(CRLF.clone());
}

fn dbsize_command(c: &mut Client) {
    c.add_reply_i64(c.db_len() as i64);
}

fn select_command(c: &mut Client) {
    let id = match c.argv[1].as_key().parse() {
        Ok(i) => i,
        Err(e) => {
            log(LogLevel::Warning, &format!("failed to parse DB index '{}': {}", c.argv[1].as_key(), e));
            c.add_reply_str("-ERR invalid DB index\r\n");
            return;
        },
    };

    if c.select_db(id) {
        c.add_reply(OK.clone());
    } else {
        c.add_reply_str("-ERR invalid DB index\r\n");
    }
}

fn flushdb_command(c: &mut Client) {
    let removed = c.flush_db();
    server_write().dirty += removed as u128;
    c.add_reply(OK.clone());
}

fn flushall_command(c: &mut Client) {
    let removed = server_write().clear();
    server_write().dirty += removed;
    c.add_reply(OK.clone());
}

fn shutdown_command(_c: &mut Client) {
    log(LogLevel::Warning, "User requested shutdown, bye bye...");
    exit(0);
}

fn set_command(c: &mut Client) {
    let key = c.argv[1].as_key().to_string();
    let val = try_object_encoding(c.argv[2].clone());
    c.insert(&key, Arc::new(RwLock::new(val.as_ref().clone())));
    server_write().dirty += 1;
    c.add_reply(OK.clone());
}

fn get_command(c: &mut Client) {
    let key = c.argv[1].as_key().to_string();
    match c.lookup_key_read_or_reply(&key, NULL_BULK.clone()) {
        None => {},
        Some(obj) => {
            let reply = {
                let obj_r = obj.read().unwrap();
                match obj_r.is_string() {
                    true => Some(Arc::new(obj_r.get_decoded())),
                    false => None,
                }
            };
            match reply {
                Some(v) => { c.add_reply_bulk(&v); },
                None => { c.add_reply(WRONG_TYPE_ERR.clone()); },
            }
        },
    }
}

//
// skiplist
//

fn sladd_command(c: &mut Client) {
    // trailing arguments come in (score, member) pairs
    if c.argv.len() % 2 != 0 {
        c.add_reply(SYNTAX_ERR.clone());
        return;
    }

    let key = c.argv[1].as_key().to_string();
    let slobj = match c.lookup_key_write(&key) {
        Some(obj) => {
            if !obj.read().unwrap().is_skiplist() {
                c.add_reply(WRONG_TYPE_ERR.clone());
                return;
            }
            obj
        },
        None => {
            let new_obj = Arc::new(RwLock::new(Object::SkipList { sl: SkipList::new() }));
            c.insert(&key, new_obj.clone());
            new_obj
        },
    };

    let mut added = 0i64;
    let pairs = (c.argv.len() - 2) / 2;
    for j in 0..pairs {
        let score = try_object_encoding(c.argv[2 + j * 2].clone());
        let member = try_object_encoding(c.argv[3 + j * 2].clone());
        {
            let mut obj_w = slobj.write().unwrap();
            let sl = obj_w.skiplist_mut().unwrap();
            // override an existing equal pair, yielding zero net change
            if sl.delete(&score, &member) {
                added -= 1;
            }
            sl.insert(score, member);
        }
        added += 1;
        server_write().dirty += 1;
    }

    // respond with the number of values added to the skiplist
    c.add_reply_i64(added);
    if added != 0 {
        signal_modified_key(c.db_id(), &key);
        notify_keyspace_event("skiplist", "sladd", &key, c.db_id());
    }
}

fn slrem_command(c: &mut Client) {
    if c.argv.len() % 2 == 0 {
        c.add_reply(SYNTAX_ERR.clone());
        return;
    }

    let key = c.argv[1].as_key().to_string();
    let slobj = match c.lookup_key_write(&key) {
        Some(obj) => {
            if !obj.read().unwrap().is_skiplist() {
                c.add_reply(EMPTY_MULTI_BULK.clone());
                return;
            }
            obj
        },
        None => {
            c.add_reply(EMPTY_MULTI_BULK.clone());
            return;
        },
    };

    // delete the equivalence class of every score argument
    let mut deleted = 0i64;
    let mut key_removed = false;
    for i in 2..c.argv.len() {
        let score = c.argv[i].clone();
        let emptied = {
            let mut obj_w = slobj.write().unwrap();
            let sl = obj_w.skiplist_mut().unwrap();
            deleted += sl.delete_score(&score) as i64;
            sl.len() == 0
        };
        if emptied {
            c.delete_key(&key);
            key_removed = true;
            break;
        }
    }

    // report back what happened
    c.add_reply_i64(deleted);
    if deleted != 0 {
        signal_modified_key(c.db_id(), &key);
        notify_keyspace_event("skiplist", "slrem", &key, c.db_id());
        if key_removed {
            notify_keyspace_event("generic", "del", &key, c.db_id());
        }
    }
}

fn slall_command(c: &mut Client) {
    let key = c.argv[1].as_key().to_string();
    let slobj = match c.lookup_key_read(&key) {
        Some(obj) => {
            if !obj.read().unwrap().is_skiplist() {
                c.add_reply(EMPTY_MULTI_BULK.clone());
                return;
            }
            obj
        },
        None => {
            c.add_reply(EMPTY_MULTI_BULK.clone());
            return;
        },
    };

    let obj_r = slobj.read().unwrap();
    let sl = obj_r.skiplist().unwrap();
    let replylen = c.add_deferred_multi_bulk_len();
    let mut len = 0;

    let mut cursor = sl.front(0);
    while let Some(node) = cursor {
        let (score, member, next) = {
            let n_r = node.read().unwrap();
            (n_r.score().unwrap(), n_r.member().unwrap(), n_r.forward(0))
        };
        c.add_reply_bulk(&score);
        c.add_reply_bulk(&member);
        len += 1;
        cursor = next;
    }

    c.set_deferred_multi_bulk_len(replylen, 2 * len);
}

fn slrange_command(c: &mut Client) {
    let range = match RangeSpec::parse(&c.argv[2], &c.argv[3]) {
        Ok(r) => r,
        Err(e) => {
            log(LogLevel::Debug, &format!("range parse failed: {}", e));
            c.add_reply_error("min or max is not valid");
            return;
        },
    };

    let key = c.argv[1].as_key().to_string();
    let slobj = match c.lookup_key_read(&key) {
        Some(obj) => obj,
        None => {
            c.add_reply(EMPTY_MULTI_BULK.clone());
            return;
        },
    };
    if !slobj.read().unwrap().is_skiplist() {
        c.add_reply(WRONG_TYPE_ERR.clone());
        return;
    }

    let obj_r = slobj.read().unwrap();
    let sl = obj_r.skiplist().unwrap();

    // search the smallest node in the range, if there is none the lowest
    // value is out of range and there's no point in continuing
    let lowend = match sl.range_low_end(&range) {
        Some(n) => n,
        None => {
            c.add_reply(EMPTY_MULTI_BULK.clone());
            return;
        },
    };
    let highend = match sl.range_high_end(&range) {
        Some(n) => n,
        None => {
            c.add_reply(EMPTY_MULTI_BULK.clone());
            return;
        },
    };

    // the two ends cross on bounds like an excluded minimum equal to the
    // included maximum, nothing qualifies then
    let low_score = lowend.read().unwrap().score();
    let high_score = highend.read().unwrap().score();
    if sl_compare(low_score.as_ref(), high_score.as_ref()) == Ordering::Greater {
        c.add_reply(EMPTY_MULTI_BULK.clone());
        return;
    }

    let replylen = c.add_deferred_multi_bulk_len();
    let mut len = 0;

    // loop over the nodes found, up to and including the high end
    let mut cursor = Some(lowend);
    while let Some(node) = cursor {
        let (score, member, next) = {
            let n_r = node.read().unwrap();
            (n_r.score().unwrap(), n_r.member().unwrap(), n_r.forward(0))
        };
        c.add_reply_bulk(&score);
        c.add_reply_bulk(&member);
        len += 1;
        if Arc::ptr_eq(&node, &highend) {
            break;
        }
        cursor = next;
    }

    c.set_deferred_multi_bulk_len(replylen, 2 * len);
}

fn slsearch_command(c: &mut Client) {
    let key = c.argv[1].as_key().to_string();
    let score = c.argv[2].clone();
    let slobj = match c.lookup_key_read(&key) {
        Some(obj) => obj,
        None => {
            c.add_reply(EMPTY_MULTI_BULK.clone());
            return;
        },
    };
    if !slobj.read().unwrap().is_skiplist() {
        c.add_reply(WRONG_TYPE_ERR.clone());
        return;
    }

    let obj_r = slobj.read().unwrap();
    let sl = obj_r.skiplist().unwrap();
    let lowend = match sl.search_smallest_node(&score) {
        Some(n) => n,
        None => {
            c.add_reply(EMPTY_MULTI_BULK.clone());
            return;
        },
    };

    let replylen = c.add_deferred_multi_bulk_len();
    let mut len = 0;

    // we pass on finding the high end, the iteration makes as many
    // comparisons as the search would
    let mut cursor = Some(lowend);
    while let Some(node) = cursor {
        let (node_score, member, next) = {
            let n_r = node.read().unwrap();
            (n_r.score().unwrap(), n_r.member().unwrap(), n_r.forward(0))
        };
        if sl_compare(Some(&node_score), Some(&score)) != Ordering::Equal {
            break;
        }
        c.add_reply_bulk(&node_score);
        c.add_reply_bulk(&member);
        len += 1;
        cursor = next;
    }

    c.set_deferred_multi_bulk_len(replylen, 2 * len);
}

fn slcard_command(c: &mut Client) {
    let key = c.argv[1].as_key().to_string();
    let len = match c.lookup_key_read(&key) {
        Some(obj) => {
            match obj.read().unwrap().skiplist() {
                Some(sl) => sl.len(),
                None => 0,
            }
        },
        None => 0,
    };
    c.add_reply_f64(len as f64);
}
