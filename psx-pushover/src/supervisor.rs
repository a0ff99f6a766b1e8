//! Connection supervisor for the PSX main server.
//!
//! Keeps exactly one TCP session alive for as long as the process runs:
//!
//! ```text
//! Disconnected --delay--> Connecting --ok--> Connected --eof/reset/error--> Disconnected
//!                              |                                                ^
//!                              +--refused/timeout (long delay)------------------+
//! ```
//!
//! Any state moves to `Terminating` when the shutdown future resolves.
//! Every session ends with an `exit` line to the server, whatever ended it.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use tokio::{
    io::{AsyncBufRead, AsyncWriteExt, BufReader},
    net::{TcpStream, tcp::OwnedWriteHalf},
    select,
    sync::watch,
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};

use crate::protocol::{LineParser, read_line, write_exit};
use crate::store::Store;

/// Delays used between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the first attempt and after a session ends.
    pub connect_delay: Duration,
    /// Wait after an attempt fails to connect.
    pub retry_delay: Duration,
    /// Give up on a single connect attempt after this long.
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_secs(2),
            retry_delay: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Published on every transition. `attempts` counts connect attempts so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected { attempts: u64 },
    Connecting { attempt: u64 },
    Connected { attempt: u64 },
    Terminating,
}

enum Attempt {
    Refused,
    Ended,
    Shutdown,
}

enum SessionEnd {
    PeerClosed,
    PeerReset,
    Failed(io::Error),
    Shutdown,
}

pub struct Supervisor {
    addr: String,
    policy: RetryPolicy,
    parser: LineParser,
    store: Store,
    state: watch::Sender<ConnectionState>,
    attempts: u64,
}

impl Supervisor {
    /// `addr` is anything `TcpStream::connect` accepts, e.g. `"127.0.0.1:10747"`.
    pub fn new(
        addr: impl Into<String>,
        store: Store,
        parser: LineParser,
        policy: RetryPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected { attempts: 0 });
        Self {
            addr: addr.into(),
            policy,
            parser,
            store,
            state,
            attempts: 0,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Watches state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connects and reconnects until `shutdown` resolves, then hands the
    /// store back.
    pub async fn run_until<F>(mut self, shutdown: F) -> Store
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut delay = self.policy.connect_delay;

        loop {
            self.publish(ConnectionState::Disconnected {
                attempts: self.attempts,
            });
            if !pause(delay, &mut shutdown).await {
                break;
            }

            delay = match self.attempt(&mut shutdown).await {
                Attempt::Refused => self.policy.retry_delay,
                Attempt::Ended => self.policy.connect_delay,
                Attempt::Shutdown => break,
            };
        }

        self.publish(ConnectionState::Terminating);
        info!(attempts = self.attempts, "supervisor stopped");
        debug!(variables = ?self.store.snapshot(), "final PSX state");
        self.store
    }

    pub async fn run_until_ctrl_c(self) -> Store {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
                // Without a handler there is no way to stop; keep running.
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    fn publish(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn attempt<F>(&mut self, shutdown: &mut Pin<&mut F>) -> Attempt
    where
        F: Future<Output = ()>,
    {
        self.attempts += 1;
        let attempt = self.attempts;
        self.publish(ConnectionState::Connecting { attempt });
        info!(addr = %self.addr, attempt, "attempting to connect to PSX main server");

        let connect = timeout(
            self.policy.connect_timeout,
            TcpStream::connect(self.addr.as_str()),
        );
        let connected = select! {
            biased;
            _ = shutdown.as_mut() => return Attempt::Shutdown,
            connected = connect => connected,
        };

        let stream = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                warn!(
                    addr = %self.addr,
                    error = %err,
                    "connection failed, has the PSX main server been started?"
                );
                info!(retry_in = ?self.policy.retry_delay, "will retry");
                return Attempt::Refused;
            }
            Err(_) => {
                warn!(addr = %self.addr, timeout = ?self.policy.connect_timeout, "connection attempt timed out");
                info!(retry_in = ?self.policy.retry_delay, "will retry");
                return Attempt::Refused;
            }
        };

        self.publish(ConnectionState::Connected { attempt });
        info!(addr = %self.addr, "connected to PSX main server");

        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let end = self.read_session(&mut reader, shutdown).await;
        log_session_end(&end);

        // Release runs on every path out of the read loop.
        if timeout(self.policy.connect_timeout, close_session(writer))
            .await
            .is_err()
        {
            debug!("timed out closing PSX session");
        }

        match end {
            SessionEnd::Shutdown => Attempt::Shutdown,
            _ => Attempt::Ended,
        }
    }

    async fn read_session<R, F>(&mut self, reader: &mut R, shutdown: &mut Pin<&mut F>) -> SessionEnd
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut buf = Vec::new();
        loop {
            let line = select! {
                biased;
                _ = shutdown.as_mut() => return SessionEnd::Shutdown,
                line = read_line(reader, &mut buf) => line,
            };

            match line {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => return SessionEnd::PeerClosed,
                Err(err) if err.kind() == io::ErrorKind::ConnectionReset => {
                    return SessionEnd::PeerReset;
                }
                Err(err) => return SessionEnd::Failed(err),
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(entry) = self.parser.parse(line) else {
            return;
        };
        debug!(key = %entry.key, value = %entry.value, "psx update");
        self.store.set(&entry.key, &entry.value);
    }
}

/// Sleeps for `delay` unless shutdown comes first. Returns `false` on shutdown.
async fn pause<F>(delay: Duration, shutdown: &mut Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    select! {
        biased;
        _ = shutdown.as_mut() => false,
        _ = sleep(delay) => true,
    }
}

fn log_session_end(end: &SessionEnd) {
    match end {
        SessionEnd::PeerClosed => info!("PSX main server closed the connection"),
        SessionEnd::PeerReset => warn!("lost connection to PSX main server"),
        SessionEnd::Failed(err) => warn!(error = %err, "reading from PSX main server failed"),
        SessionEnd::Shutdown => info!("disconnecting from PSX main server"),
    }
}

async fn close_session(mut writer: OwnedWriteHalf) {
    if let Err(error) = write_exit(&mut writer).await {
        debug!(?error, "failed to send exit to PSX main server");
    }
    if let Err(error) = writer.shutdown().await {
        debug!(?error, "failed to shut down PSX connection cleanly");
    }
}
