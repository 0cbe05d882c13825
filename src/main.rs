use ruskip::{
    client::Client, server::{print_banner, server_write}, util::{log, LogLevel}
};
use std::{env, io::{self, BufRead, Write}, process::exit};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() == 2 {
        server_write().load_server_config(&args[1]);
    } else if args.len() > 2 {
        eprintln!("Usage: ./ruskip [/path/to/ruskip.conf]");
        exit(1);
    } else {
        log(LogLevel::Warning, "Warning: no config file specified, using the default config. In order to specify a config file use 'ruskip /path/to/ruskip.conf'");
    }

    server_write().init_server();
    print_banner();

    let mut client = Client::fake();
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut buf = String::new();
    loop {
        buf.clear();
        match input.read_line(&mut buf) {
            Ok(0) => break,
            Ok(_) => {},
            Err(e) => {
                log(LogLevel::Warning, &format!("Reading from stdin failed: {}", e));
                break;
            },
        }
        client.feed(&buf);
        let reply = client.take_reply();
        if !reply.is_empty() {
            print!("{}", reply);
            io::stdout().flush().ok();
        }
        if client.wants_quit() {
            break;
        }
    }
}
