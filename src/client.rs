use std::sync::{Arc, RwLock};
use crate::{cmd::{call, lookup_command}, obj::{create_string_object, Object}, server::{server_read, Db}, zmalloc::MemCounter};


///
/// Per-client state: parsed arguments, query buffer, reply buffer.
///


pub struct Client {
    pub argv: Vec<Arc<Object>>,
    db: Option<Arc<RwLock<Db>>>,
    query_buf: String,
    multi_bulk: i32,                // remaining multi bulk arguments, 0 when inactive
    bulk_len: i32,                  // pending bulk payload length, -1 if none
    reply: Vec<Arc<Object>>,
    quit: bool,
}

impl Client {
    /// Commands are always executed in the context of a client, so scripted
    /// and test execution goes through a fake one that is not attached to
    /// any connection.
    pub fn fake() -> Client {
        let mut c = Client {
            argv: Vec::new(),
            db: None,
            query_buf: String::new(),
            multi_bulk: 0,
            bulk_len: -1,
            reply: Vec::new(),
            quit: false,
        };
        c.select_db(0);
        c
    }

    pub fn select_db(&mut self, id: i32) -> bool {
        let server = server_read();
        if id < 0 || id >= server.dbnum || id as usize >= server.dbs.len() {
            return false;
        }
        self.db = Some(server.dbs[id as usize].clone());
        true
    }

    pub fn db_id(&self) -> i32 {
        self.db.as_ref().unwrap().read().unwrap().id
    }

    pub fn wants_quit(&self) -> bool {
        self.quit
    }

    /// Append raw protocol input and process every complete command in it.
    pub fn feed(&mut self, data: &str) {
        self.query_buf.push_str(data);
        self.process_input_buf();
    }

    /// Consume the buffered input line by line. Both the inline format and
    /// the multi bulk format (`*N` followed by `$len` framed arguments) are
    /// accepted.
    fn process_input_buf(&mut self) {
        loop {
            let pos = match self.query_buf.find('\n') {
                Some(p) => p,
                None => return,
            };
            let mut line = self.query_buf[..pos].to_string();
            self.query_buf.drain(..=pos);
            if line.ends_with('\r') {
                line.pop();
            }

            if self.bulk_len != -1 {
                // the line is the pending bulk argument
                if line.len() != self.bulk_len as usize {
                    self.add_reply_str("-ERR Protocol error: bulk length mismatch\r\n");
                    self.reset();
                    continue;
                }
                self.argv.push(create_string_object(&line));
                self.bulk_len = -1;
                self.multi_bulk -= 1;
                if self.multi_bulk == 0 {
                    self.process_command();
                }
                continue;
            }

            if self.multi_bulk > 0 {
                match line.strip_prefix('$').map(|rest| rest.parse::<i32>()) {
                    Some(Ok(n)) if n >= 0 && n <= 1024 * 1024 * 1024 => {
                        self.bulk_len = n;
                    },
                    _ => {
                        self.add_reply_str("-ERR invalid bulk write count\r\n");
                        self.reset();
                    },
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix('*') {
                match rest.parse::<i32>() {
                    Ok(n) if n > 0 => {
                        self.multi_bulk = n;
                        self.argv.clear();
                    },
                    Ok(_) => { self.reset(); },
                    Err(_) => {
                        self.add_reply_str("-ERR multi bulk protocol error\r\n");
                        self.reset();
                    },
                }
                continue;
            }

            // Now we can split the inline query in arguments
            self.argv = line.split_whitespace()
                .map(|a| create_string_object(a))
                .collect();
            if !self.argv.is_empty() {
                self.process_command();
            }
        }
    }

    /// If this function gets called we already read a whole command,
    /// arguments are in the argv field. Looks the command up and checks
    /// ASAP about trivial error conditions such as wrong arity or bad
    /// command name, then executes it.
    fn process_command(&mut self) {
        let name_arg = self.argv[0].clone();
        let name = name_arg.as_key();

        // The QUIT command is handled as a special case. Normal command
        // procs are unable to close the client connection safely.
        if name.eq_ignore_ascii_case("quit") {
            self.quit = true;
            self.reset();
            return;
        }

        match lookup_command(name) {
            None => {
                self.add_reply_str(&format!("-ERR unknown command '{}'\r\n", name));
                self.reset();
            },
            Some(cmd) => {
                if (cmd.arity() > 0 && cmd.arity() != self.argv.len() as i32)
                    || (self.argv.len() as i32) < -cmd.arity() {
                    self.add_reply_str(&format!("-ERR wrong number of arguments for '{}' command\r\n", cmd.name()));
                    self.reset();
                    return;
                }
                let max_memory = server_read().max_memory;
                if max_memory > 0 && cmd.flags().is_deny_oom()
                    && MemCounter::used_memory() as u128 > max_memory {
                    self.add_reply_str("-ERR command not allowed when used memory > 'maxmemory'\r\n");
                    self.reset();
                    return;
                }
                call(self, cmd);
                self.reset();
            },
        }
    }

    /// Prepare the client to process the next command.
    fn reset(&mut self) {
        self.argv.clear();
        self.multi_bulk = 0;
        self.bulk_len = -1;
    }

    pub fn add_reply(&mut self, obj: Arc<Object>) {
        self.reply.push(obj);
    }

    pub fn add_reply_str(&mut self, s: &str) {
        self.add_reply(create_string_object(s));
    }

    pub fn add_reply_error(&mut self, s: &str) {
        self.add_reply_str(&format!("-ERR {}\r\n", s));
    }

    pub fn add_reply_i64(&mut self, n: i64) {
        self.add_reply_str(&format!(":{}\r\n", n));
    }

    /// Doubles travel as bulk strings, integral values without the
    /// fractional part.
    pub fn add_reply_f64(&mut self, v: f64) {
        let s = match v.is_finite() && v == v.trunc() {
            true => format!("{}", v as i64),
            false => format!("{}", v),
        };
        self.add_reply_bulk_str(&s);
    }

    pub fn add_reply_bulk_str(&mut self, s: &str) {
        self.add_reply_str(&format!("${}\r\n{}\r\n", s.len(), s));
    }

    pub fn add_reply_bulk(&mut self, obj: &Arc<Object>) {
        let decoded = obj.get_decoded();
        self.add_reply_bulk_str(decoded.as_key());
    }

    /// Reserve a slot for a multi bulk length that is only known after the
    /// items were emitted. The returned handle is finalized with
    /// set_deferred_multi_bulk_len.
    pub fn add_deferred_multi_bulk_len(&mut self) -> usize {
        self.reply.push(create_string_object(""));
        self.reply.len() - 1
    }

    pub fn set_deferred_multi_bulk_len(&mut self, handle: usize, len: usize) {
        self.reply[handle] = create_string_object(&format!("*{}\r\n", len));
    }

    /// Drain the accumulated reply into its wire form.
    pub fn take_reply(&mut self) -> String {
        let mut out = String::new();
        for chunk in self.reply.drain(..) {
            out.push_str(chunk.get_decoded().as_key());
        }
        out
    }

    pub fn lookup_key_read(&self, key: &str) -> Option<Arc<RwLock<Object>>> {
        let db = self.db.clone().unwrap();
        let db_r = db.read().unwrap();
        db_r.dict.get(key).map(|v| v.clone())
    }

    pub fn lookup_key_write(&self, key: &str) -> Option<Arc<RwLock<Object>>> {
        self.lookup_key_read(key)
    }

    pub fn lookup_key_read_or_reply(&mut self, key: &str, reply: Arc<Object>) -> Option<Arc<RwLock<Object>>> {
        match self.lookup_key_read(key) {
            None => {
                self.add_reply(reply);
                None
            },
            Some(v) => Some(v),
        }
    }

    pub fn lookup_key_write_or_reply(&mut self, key: &str, reply: Arc<Object>) -> Option<Arc<RwLock<Object>>> {
        match self.lookup_key_write(key) {
            None => {
                self.add_reply(reply);
                None
            },
            Some(v) => Some(v),
        }
    }

    pub fn insert(&mut self, key: &str, obj: Arc<RwLock<Object>>) {
        self.db.as_ref().unwrap().write().unwrap().dict.insert(key.to_string(), obj);
    }

    pub fn delete_key(&mut self, key: &str) -> Option<Arc<RwLock<Object>>> {
        self.db.as_ref().unwrap().write().unwrap().dict.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.db.as_ref().unwrap().read().unwrap().dict.contains_key(key)
    }

    pub fn db_len(&self) -> usize {
        self.db.as_ref().unwrap().read().unwrap().dict.len()
    }

    /// Drop every key of the selected db, returning how many were removed.
    pub fn flush_db(&mut self) -> usize {
        let mut db_w = self.db.as_ref().unwrap().write().unwrap();
        let removed = db_w.dict.len();
        db_w.dict.clear();
        removed
    }
}


#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Once;
    use crate::server::server_write;
    use super::Client;

    /// The keyspace is process global, initialize it exactly once for the
    /// whole test run.
    pub(crate) fn fake_client() -> Client {
        static INIT: Once = Once::new();
        INIT.call_once(|| { server_write().init_server(); });
        Client::fake()
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::fake_client;

    #[test]
    fn inline_command_test() {
        let mut c = fake_client();
        c.feed("ping\r\n");
        assert_eq!(c.take_reply(), "+PONG\r\n");
        c.feed("  ping  \r\n");
        assert_eq!(c.take_reply(), "+PONG\r\n");
    }

    #[test]
    fn partial_input_is_buffered() {
        let mut c = fake_client();
        c.feed("pi");
        assert_eq!(c.take_reply(), "");
        c.feed("ng\r\n");
        assert_eq!(c.take_reply(), "+PONG\r\n");
    }

    #[test]
    fn multi_bulk_command_test() {
        let mut c = fake_client();
        c.feed("*1\r\n$4\r\nping\r\n");
        assert_eq!(c.take_reply(), "+PONG\r\n");
    }

    #[test]
    fn multi_bulk_protocol_errors() {
        let mut c = fake_client();
        c.feed("*x\r\n");
        assert_eq!(c.take_reply(), "-ERR multi bulk protocol error\r\n");
        c.feed("*1\r\nping\r\n");
        assert_eq!(c.take_reply(), "-ERR invalid bulk write count\r\n");
        c.feed("*1\r\n$2\r\nping\r\n");
        assert_eq!(c.take_reply(), "-ERR Protocol error: bulk length mismatch\r\n");
        // the parser recovers afterwards
        c.feed("ping\r\n");
        assert_eq!(c.take_reply(), "+PONG\r\n");
    }

    #[test]
    fn unknown_command_and_arity() {
        let mut c = fake_client();
        c.feed("nosuchcommand\r\n");
        assert_eq!(c.take_reply(), "-ERR unknown command 'nosuchcommand'\r\n");
        c.feed("ping extra\r\n");
        assert_eq!(c.take_reply(), "-ERR wrong number of arguments for 'ping' command\r\n");
    }

    #[test]
    fn quit_flags_the_client() {
        let mut c = fake_client();
        assert!(!c.wants_quit());
        c.feed("quit\r\n");
        assert!(c.wants_quit());
    }

    #[test]
    fn deferred_multi_bulk_len() {
        let mut c = fake_client();
        let handle = c.add_deferred_multi_bulk_len();
        c.add_reply_bulk_str("x");
        c.add_reply_bulk_str("y");
        c.set_deferred_multi_bulk_len(handle, 2);
        assert_eq!(c.take_reply(), "*2\r\n$1\r\nx\r\n$1\r\ny\r\n");
    }
}
