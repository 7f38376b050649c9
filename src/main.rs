use rcache::{
    config::parse_args, log::{configure_log, log, LogLevel}, server::Server,
};
use std::{env, process::exit};

static RCACHE_VERSION: &str = "0.1.0";

fn main() {
    let args: Vec<String> = env::args().collect();

    let cfg = match parse_args(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Usage: rcache [/path/to/rcache.conf] [--port <port>] [--bind <addr>] [--arena <bytes>]");
            exit(1);
        },
    };
    configure_log(cfg.verbosity, &cfg.log_file);
    if args.len() == 1 {
        log(LogLevel::Warning, "Warning: no config file specified, using the default config. In order to specify a config file use 'rcache /path/to/rcache.conf'");
    }

    let mut server = match Server::new(&cfg) {
        Ok(s) => s,
        Err(e) => {
            log(LogLevel::Warning, &format!("Opening the listening socket: {}", e));
            exit(1);
        },
    };

    log(LogLevel::Notice, &format!("rcache {} started, arena capacity {} bytes", RCACHE_VERSION, cfg.arena_cap));
    log(LogLevel::Notice, &format!("The server is now ready to accept connections on port {}", cfg.port));
    server.run();
    log(LogLevel::Notice, "rcache is now exiting, bye bye...");
}
