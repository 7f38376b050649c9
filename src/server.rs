//! The single-threaded event loop: accept, read, parse, execute,
//! write. The only blocking call is the readiness wait at the top of
//! each cycle; every endpoint is nonblocking and registered
//! edge-triggered, so the accept and read paths drain until the
//! operation reports would-block.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use libc::{c_int, c_void, read, sighandler_t, signal, write, EAGAIN, SIGHUP, SIGINT, SIGPIPE,
    SIGTERM, SIG_IGN};
use crate::buffer::{ClientBuffer, RX_CAP};
use crate::cmd::{dispatch, Reply};
use crate::config::Config;
use crate::db::Db;
use crate::event::{FiredEvent, Poller};
use crate::log::{log, LogLevel};
use crate::net::{accept, nonblock, tcp_no_delay, tcp_server, Fd};
use crate::resp::Parser;
use crate::util::{error, error_str};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn sigterm_handler(_sig: c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Per-connection state: the owned endpoint and its buffers. The
/// descriptor number doubles as the connection identifier.
struct Client {
    sock: Fd,
    buf: ClientBuffer,
    write_registered: bool,
}

pub struct Server {
    // Shutdown drops fields in declaration order: the listener closes
    // first, then the remaining connections.
    listener: Fd,
    clients: HashMap<i32, Client>,
    poller: Poller,
    db: Db,
    fired: Vec<FiredEvent>,
}

impl Server {
    pub fn new(cfg: &Config) -> Result<Server, String> {
        unsafe {
            signal(SIGHUP, SIG_IGN);
            signal(SIGPIPE, SIG_IGN);
            signal(SIGINT, sigterm_handler as extern "C" fn(c_int) as sighandler_t);
            signal(SIGTERM, sigterm_handler as extern "C" fn(c_int) as sighandler_t);
        }

        let listener = Fd::new(tcp_server(cfg.port, &cfg.bindaddr, cfg.backlog)?);
        nonblock(listener.raw())?;
        let poller = Poller::create()?;
        poller.add_readable(listener.raw())?;

        Ok(Server {
            listener,
            clients: HashMap::new(),
            poller,
            db: Db::with_arena_capacity(cfg.arena_cap),
            fired: Vec::new(),
        })
    }

    /// One cycle: wait for readiness, drain acceptance on the
    /// listener, drain input and flush output on connections. Runs
    /// until a shutdown signal flips the flag or the readiness
    /// facility itself fails.
    pub fn run(&mut self) {
        while !SHUTDOWN.load(Ordering::Relaxed) {
            let num_events = match self.poller.poll(&mut self.fired) {
                Ok(n) => n,
                Err(e) => {
                    log(LogLevel::Warning, &format!("Waiting for events: {}", e));
                    break;
                },
            };
            for j in 0..num_events {
                let (fd, mask) = (self.fired[j].fd, self.fired[j].mask);
                if fd == self.listener.raw() {
                    if mask.is_readable() && !self.accept_clients() {
                        // Listener failure is fatal to the process,
                        // not to one connection.
                        SHUTDOWN.store(true, Ordering::Relaxed);
                    }
                    continue;
                }
                if mask.is_readable() {
                    self.handle_readable(fd);
                }
                if mask.is_writable() {
                    self.handle_writable(fd);
                }
            }
        }
        log(LogLevel::Notice, &format!("Shutting down, closing {} connections", self.clients.len()));
    }

    /// Drain the listener: accept until the call reports would-block,
    /// so the edge-triggered notification is fully consumed. Returns
    /// false when the listener itself failed.
    fn accept_clients(&mut self) -> bool {
        loop {
            match accept(self.listener.raw()) {
                Ok(Some((fd, c_ip, c_port))) => {
                    let sock = Fd::new(fd);
                    if let Err(e) = self.add_client(sock, c_ip, c_port) {
                        log(LogLevel::Warning, &format!("Error allocating resources for the client: {}", e));
                    }
                },
                Ok(None) => return true,
                Err(e) => {
                    log(LogLevel::Warning, &format!("Accepting client connection: {}", e));
                    return false;
                },
            }
        }
    }

    fn add_client(&mut self, sock: Fd, c_ip: u32, c_port: u16) -> Result<(), String> {
        nonblock(sock.raw())?;
        tcp_no_delay(sock.raw())?;
        self.poller.add_readable(sock.raw())?;
        log(LogLevel::Verbose, &format!("Accepted {}:{c_port}", Ipv4Addr::from(c_ip)));
        self.clients.insert(sock.raw(), Client {
            sock,
            buf: ClientBuffer::new(),
            write_registered: false,
        });
        Ok(())
    }

    fn handle_readable(&mut self, fd: i32) {
        // The event may concern a connection an earlier event in this
        // cycle already tore down; check it is still there.
        let mut c = match self.clients.remove(&fd) {
            Some(c) => c,
            None => return,
        };
        if self.drain_input(&mut c) && self.flush_output(&mut c) {
            self.clients.insert(fd, c);
        } else {
            self.teardown(c);
        }
    }

    fn handle_writable(&mut self, fd: i32) {
        let mut c = match self.clients.remove(&fd) {
            Some(c) => c,
            None => return,
        };
        if self.flush_output(&mut c) {
            self.clients.insert(fd, c);
        } else {
            self.teardown(c);
        }
    }

    /// Read into the tail of the receive buffer until would-block,
    /// running the parser loop after every successful read. A partial
    /// drain under edge triggering could stall the connection forever.
    /// Returns false when the connection must be torn down.
    fn drain_input(&mut self, c: &mut Client) -> bool {
        loop {
            let nread = unsafe {
                read(c.sock.raw(), c.buf.rx[c.buf.lrx..].as_mut_ptr() as *mut c_void, RX_CAP - c.buf.lrx)
            };
            if nread == -1 {
                if error() == EAGAIN {
                    break;
                }
                log(LogLevel::Verbose, &format!("Reading from client: {}", error_str()));
                return false;
            }
            if nread == 0 {
                log(LogLevel::Verbose, "Client closed connection");
                return false;
            }
            c.buf.lrx += nread as usize;
            // Parsing frees buffer space whenever a command completed,
            // so a full buffer here means the client is violating.
            if !process_input(&mut self.db, &mut c.buf) {
                return false;
            }
        }
        true
    }

    /// One write of the entire pending buffer. A partial write or
    /// would-block keeps the remainder queued and arms write readiness
    /// so the flush resumes on a later cycle; unsent bytes are never
    /// discarded. Returns false when the connection must be torn down.
    fn flush_output(&mut self, c: &mut Client) -> bool {
        if !c.buf.tx.is_empty() {
            let nwritten = unsafe {
                write(c.sock.raw(), c.buf.tx.as_ptr() as *const c_void, c.buf.tx.len())
            };
            if nwritten == -1 {
                if error() != EAGAIN {
                    log(LogLevel::Verbose, &format!("Error writing to client: {}", error_str()));
                    return false;
                }
            } else if nwritten as usize == c.buf.tx.len() {
                c.buf.tx.clear();
            } else {
                c.buf.tx.drain(..nwritten as usize);
            }
        }

        if c.buf.tx.is_empty() {
            if c.write_registered {
                if let Err(e) = self.poller.disable_writable(c.sock.raw()) {
                    log(LogLevel::Warning, &e);
                }
                c.write_registered = false;
            }
            // QUIT schedules teardown once everything is flushed.
            !c.buf.close_after_reply
        } else {
            if !c.write_registered {
                match self.poller.enable_writable(c.sock.raw()) {
                    Ok(()) => { c.write_registered = true; },
                    Err(e) => {
                        log(LogLevel::Warning, &e);
                        return false;
                    },
                }
            }
            true
        }
    }

    fn teardown(&mut self, c: Client) {
        let _ = self.poller.remove(c.sock.raw());
        log(LogLevel::Verbose, &format!("Closing connection fd {}", c.sock.raw()));
        // Dropping the client releases the descriptor.
    }
}

/// The parser loop: decode and execute every complete command in the
/// unconsumed receive region, then compact. Returns false when the
/// connection is protocol violating, either because the parser flagged
/// an impossible header or because a single command filled the whole
/// buffer without completing.
fn process_input(db: &mut Db, buf: &mut ClientBuffer) -> bool {
    let violated;
    {
        let ClientBuffer { rx, lrx, prx, tx, close_after_reply } = &mut *buf;
        let mut parser = Parser::new(&rx[*prx..*lrx]);
        let mut reply = Reply { out: tx, close: close_after_reply };
        let mut tokens: Vec<&[u8]> = Vec::new();
        loop {
            if parser.try_parse_command(&mut tokens) == 0 {
                break;
            }
            // "*0" consumes bytes but carries no verb.
            if !tokens.is_empty() {
                dispatch(db, &mut reply, &tokens);
            }
        }
        *prx += parser.pos();
        violated = parser.violated();
    }
    buf.compact();
    if violated || buf.lrx == RX_CAP {
        log(LogLevel::Verbose, "Client protocol error");
        return false;
    }
    true
}
