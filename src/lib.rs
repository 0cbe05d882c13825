pub mod client;
pub mod cmd;
pub mod obj;
pub mod server;
pub mod skiplist;
pub mod util;
pub mod zmalloc;
