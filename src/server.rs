use std::{collections::HashMap, fs::File, io::{self, BufRead, BufReader, Read}, process::{exit, id}, sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard}};
use once_cell::sync::Lazy;
use crate::{obj::Object, util::{log, timestamp, LogLevel}};


///
/// Server state.
///


static DEFAULT_DBNUM: i32 = 16;
pub static RUSKIP_VERSION: &str = "0.1.0";


pub static SERVER: Lazy<Arc<RwLock<Server>>> = Lazy::new(|| { Arc::new(RwLock::new(Server::new())) });
pub fn server_read() -> RwLockReadGuard<'static, Server> {
    SERVER.read().unwrap()
}
pub fn server_write() -> RwLockWriteGuard<'static, Server> {
    SERVER.write().unwrap()
}

pub struct Server {
    pub dbs: Vec<Arc<RwLock<Db>>>,
    pub dirty: u128,                        // changes to the keyspace since startup
    // Fields used only for stats
    stat_starttime: u64,                    // server start time (in seconds)
    pub stat_numcommands: u128,             // number of processed commands
    pub stat_keyspace_events: u128,         // number of keyspace events fired
    // Configuration
    verbosity: LogLevel,
    log_file: String,
    pub dbnum: i32,
    pub max_memory: u128,
}

impl Server {
    pub fn new() -> Server {
        Server {
            dbs: Vec::with_capacity(DEFAULT_DBNUM as usize),
            dirty: 0,
            stat_starttime: timestamp().as_secs(),
            stat_numcommands: 0,
            stat_keyspace_events: 0,
            verbosity: LogLevel::Verbose,
            log_file: String::new(),        // "" = log on standard output
            dbnum: DEFAULT_DBNUM,
            max_memory: 0,                  // 0 = unlimited
        }
    }

    pub fn init_server(&mut self) {
        for i in 0..self.dbnum {
            self.dbs.push(Arc::new(RwLock::new(Db::new(i))));
        }
    }

    /// I agree, this is a very rudimental way to load a configuration...
    /// will improve later if the config gets more complex
    pub fn load_server_config(&mut self, filename: &str) {
        let reader: Box<dyn Read>;
        if filename.eq("-") {
            reader = Box::new(io::stdin());
        } else {
            if let Ok(f) = File::open(filename) {
                reader = Box::new(f);
            } else {
                eprintln!("Fatal error, can't open config file '{}'", filename);
                exit(1);
            }
        }
        self.load_config(reader);
    }

    fn load_config(&mut self, reader: Box<dyn Read>) {
        let mut line_num = 0;

        let load_err = |err: &str, line: &str, line_num: i32| {
            eprintln!("*** FATAL CONFIG FILE ERROR ***");
            eprintln!("Reading the configuration file, at line {line_num}");
            eprintln!(">>> '{line}'");
            eprintln!("{err}");
            exit(1);
        };

        let buf_reader = BufReader::new(reader);
        for line in buf_reader.lines() {
            if let Ok(line) = line {
                line_num += 1;
                let trimed_line = line.trim();

                // Skip comments and blank lines
                if trimed_line.starts_with("#") || trimed_line.is_empty() {
                    continue;
                }

                // Split into arguments
                let argv: Vec<&str> = trimed_line.split_whitespace().collect();
                let argc = argv.len();

                // Execute config directives
                match &argv[0].to_ascii_lowercase()[..] {
                    "loglevel" if argc == 2 => {
                        match &argv[1].to_ascii_lowercase()[..] {
                            "debug" => { self.verbosity = LogLevel::Debug; },
                            "verbose" => { self.verbosity = LogLevel::Verbose; },
                            "notice" => { self.verbosity = LogLevel::Notice; },
                            "warning" => { self.verbosity = LogLevel::Warning; },
                            _ => {
                                let err = "Invalid log level. Must be one of debug, verbose, notice or warning";
                                load_err(err, &line, line_num);
                            },
                        }
                    },
                    "logfile" if argc == 2 => {
                        match &argv[1].to_ascii_lowercase()[..] {
                            "stdout" => { self.log_file = String::new(); },
                            filename if !filename.is_empty() => {
                                self.log_file = filename.to_string();
                            },
                            _ => { load_err("logfile can't be empty", &line, line_num); },
                        }
                    },
                    "databases" if argc == 2 => {
                        let mut err = String::new();
                        match argv[1].parse() {
                            Ok(n) => { self.dbnum = n; },
                            Err(e) => { err = e.to_string(); },
                        }
                        if self.dbnum < 1 {
                            err = "Invalid number of databases".to_string();
                        }
                        if !err.is_empty() { load_err(&err, trimed_line, line_num); }
                    },
                    "maxmemory" if argc == 2 => {
                        match argv[1].parse() {
                            Ok(m_m) => { self.max_memory = m_m; },
                            Err(e) => { load_err(&e.to_string(), trimed_line, line_num); },
                        }
                    },
                    "include" if argc == 2 => { self.load_server_config(argv[1]); },
                    _ => {
                        let err = "Bad directive or wrong number of arguments";
                        load_err(err, &line, line_num);
                    },
                }
            } else {
                let err = "Directive parsing failed";
                load_err(err, "", line_num);
            }
        }
    }

    pub fn clear(&mut self) -> u128 {
        let mut removed = 0u128;
        for db in &self.dbs {
            let mut db_w = db.write().unwrap();
            removed += db_w.dict.len() as u128;
            db_w.dict.clear();
        }
        removed
    }

    pub fn log_file(&self) -> &str {
        &self.log_file
    }
    pub fn verbosity(&self) -> &LogLevel {
        &self.verbosity
    }
    pub fn stat_starttime(&self) -> u64 {
        self.stat_starttime
    }
}


pub struct Db {
    pub dict: HashMap<String, Arc<RwLock<Object>>>,     // The keyspace for this DB
    pub id: i32,
}
impl Db {
    pub fn new(id: i32) -> Db {
        Db { dict: HashMap::new(), id }
    }
}


/// Every mutation of a key goes through here before the reply is finalized.
pub fn signal_modified_key(db_id: i32, key: &str) {
    log(LogLevel::Debug, &format!("key '{}' modified in db {}", key, db_id));
}

/// The keyspace-change notification bus. Without subscribers the events are
/// accounted and traced only.
pub fn notify_keyspace_event(class: &str, event: &str, key: &str, db_id: i32) {
    {
        server_write().stat_keyspace_events += 1;
    }
    log(LogLevel::Verbose, &format!("keyspace event {}: {} '{}' (db {})", class, event, key, db_id));
}


pub fn print_banner() {
    log(LogLevel::Notice, &format!("Ruskip {}", RUSKIP_VERSION));
    log(LogLevel::Notice, &format!("PID: {}, reading commands from stdin", id()));
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn config_directives_test() {
        let text = "# a comment\n\nloglevel warning\nmaxmemory 1048576\ndatabases 4\n".to_string();
        let mut server = Server::new();
        server.load_config(Box::new(Cursor::new(text)));
        assert!(matches!(*server.verbosity(), LogLevel::Warning));
        assert_eq!(server.max_memory, 1048576);
        assert_eq!(server.dbnum, 4);
    }

    #[test]
    fn clear_counts_removed_keys() {
        let mut server = Server::new();
        server.dbnum = 2;
        server.init_server();
        server.dbs[0].write().unwrap().dict.insert(
            "k".to_string(),
            Arc::new(RwLock::new(crate::obj::Object::String { ptr: crate::obj::StringValue::Raw("v".to_string()) })),
        );
        assert_eq!(server.clear(), 1);
        assert_eq!(server.dbs[0].read().unwrap().dict.len(), 0);
    }
}
