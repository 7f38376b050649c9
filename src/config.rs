use std::{fs::File, io::{BufRead, BufReader}, process::exit};
use crate::arena::DEFAULT_ARENA_CAP;
use crate::log::LogLevel;

const SERVER_PORT: u16 = 6379;
const LISTEN_BACKLOG: i32 = 512;

pub struct Config {
    pub port: u16,
    pub bindaddr: String,       // "" = wildcard
    pub arena_cap: usize,
    pub backlog: i32,
    pub verbosity: LogLevel,
    pub log_file: String,       // "" = log on standard output
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: SERVER_PORT,
            bindaddr: String::new(),
            arena_cap: DEFAULT_ARENA_CAP,
            backlog: LISTEN_BACKLOG,
            verbosity: LogLevel::Notice,
            log_file: String::new(),
        }
    }
}

impl Config {
    /// I agree, this is a very rudimental way to load a configuration...
    /// will improve later if the config gets more complex
    pub fn load(&mut self, filename: &str) {
        let file = match File::open(filename) {
            Ok(f) => f,
            Err(_) => {
                eprintln!("Fatal error, can't open config file '{filename}'");
                exit(1);
            },
        };

        fn load_err(err: &str, line: &str, line_num: i32) -> ! {
            eprintln!("*** FATAL CONFIG FILE ERROR ***");
            eprintln!("Reading the configuration file, at line {line_num}");
            eprintln!(">>> '{line}'");
            eprintln!("{err}");
            exit(1);
        }

        let mut line_num = 0;
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => { load_err("Directive parsing failed", "", line_num); },
            };
            line_num += 1;
            let trimed_line = line.trim();

            // Skip comments and blank lines
            if trimed_line.starts_with('#') || trimed_line.is_empty() {
                continue;
            }

            // Split into arguments
            let argv: Vec<&str> = trimed_line.split_whitespace().collect();
            let argc = argv.len();

            // Execute config directives
            match &argv[0].to_ascii_lowercase()[..] {
                "port" if argc == 2 => {
                    match argv[1].parse() {
                        Ok(p) if p >= 1 => { self.port = p; },
                        _ => { load_err("Invalid port", trimed_line, line_num); },
                    }
                },
                "bind" if argc == 2 => { self.bindaddr = argv[1].to_string(); },
                "arenacap" if argc == 2 => {
                    match memtoll(argv[1]) {
                        Ok(cap) if cap >= 1 => { self.arena_cap = cap; },
                        _ => { load_err("Invalid arena capacity", trimed_line, line_num); },
                    }
                },
                "backlog" if argc == 2 => {
                    match argv[1].parse() {
                        Ok(b) if b >= 1 => { self.backlog = b; },
                        _ => { load_err("Invalid listen backlog", trimed_line, line_num); },
                    }
                },
                "loglevel" if argc == 2 => {
                    match &argv[1].to_ascii_lowercase()[..] {
                        "debug" => { self.verbosity = LogLevel::Debug; },
                        "verbose" => { self.verbosity = LogLevel::Verbose; },
                        "notice" => { self.verbosity = LogLevel::Notice; },
                        "warning" => { self.verbosity = LogLevel::Warning; },
                        _ => {
                            let err = "Invalid log level. Must be one of debug, verbose, notice or warning";
                            load_err(err, trimed_line, line_num);
                        },
                    }
                },
                "logfile" if argc == 2 => {
                    match &argv[1].to_ascii_lowercase()[..] {
                        "stdout" => { self.log_file = String::new(); },
                        filename if !filename.is_empty() => { self.log_file = filename.to_string(); },
                        _ => { load_err("logfile can't be empty", trimed_line, line_num); },
                    }
                },
                "include" if argc == 2 => { self.load(argv[1]); },
                _ => {
                    let err = "Bad directive or wrong number of arguments";
                    load_err(err, trimed_line, line_num);
                },
            }
        }
    }
}

/// Parse process arguments: an optional config file path, then flag
/// overrides.
pub fn parse_args(args: &[String]) -> Result<Config, String> {
    let mut cfg = Config::default();
    let mut i = 1;
    if i < args.len() && !args[i].starts_with("--") {
        cfg.load(&args[i]);
        i += 1;
    }
    while i < args.len() {
        match &args[i][..] {
            "--port" if i + 1 < args.len() => {
                cfg.port = args[i + 1].parse().map_err(|_| format!("Invalid port '{}'", args[i + 1]))?;
                i += 2;
            },
            "--bind" if i + 1 < args.len() => {
                cfg.bindaddr = args[i + 1].clone();
                i += 2;
            },
            "--arena" if i + 1 < args.len() => {
                cfg.arena_cap = memtoll(&args[i + 1])?;
                i += 2;
            },
            arg => {
                return Err(format!("Bad argument or missing value: '{arg}'"));
            },
        }
    }
    Ok(cfg)
}

/// Convert "100", "64kb", "2mb" or "1gb" into a byte count.
fn memtoll(s: &str) -> Result<usize, String> {
    let digits_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(digits_end);
    let n: usize = num.parse().map_err(|_| format!("Invalid size '{s}'"))?;
    let mult = match &unit.to_ascii_lowercase()[..] {
        "" | "b" => 1,
        "kb" => 1024,
        "mb" => 1024 * 1024,
        "gb" => 1024 * 1024 * 1024,
        _ => { return Err(format!("Invalid size unit '{s}'")); },
    };
    n.checked_mul(mult).ok_or_else(|| format!("Size '{s}' overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memtoll_understands_suffixes() {
        assert_eq!(memtoll("100").unwrap(), 100);
        assert_eq!(memtoll("64kb").unwrap(), 64 * 1024);
        assert_eq!(memtoll("2MB").unwrap(), 2 * 1024 * 1024);
        assert_eq!(memtoll("1gb").unwrap(), 1024 * 1024 * 1024);
        assert!(memtoll("12xb").is_err());
        assert!(memtoll("mb").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let args: Vec<String> = ["rcache", "--port", "7000", "--bind", "127.0.0.1", "--arena", "1mb"]
            .iter().map(|s| s.to_string()).collect();
        let cfg = parse_args(&args).unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.bindaddr, "127.0.0.1");
        assert_eq!(cfg.arena_cap, 1024 * 1024);
        assert_eq!(cfg.backlog, 512);
    }

    #[test]
    fn bad_flag_is_rejected() {
        let args: Vec<String> = ["rcache", "--nope"].iter().map(|s| s.to_string()).collect();
        assert!(parse_args(&args).is_err());
    }

    #[test]
    fn defaults_match_the_documented_ones() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 6379);
        assert_eq!(cfg.arena_cap, 64 * 1024 * 1024);
        assert!(cfg.bindaddr.is_empty());
    }
}
