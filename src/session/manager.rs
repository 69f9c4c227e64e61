//! Chat session ownership.
//!
//! A session pairs one stream with a read loop and a write loop. The
//! [`SessionManager`] owns every live session: when either loop fails, or the
//! session is shut down, the sibling loop is aborted and the stream dropped.
//! Running out of operator input only stops the write loop.

use crate::transport::{read_loop, write_loop};
use crate::utils::{ChatError, Console, Result, SessionError};
use futures::io::BufReader;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite};
use libp2p::PeerId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinError;
use uuid::Uuid;

/// Which side opened the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The remote peer opened it
    Inbound,
    /// This node opened it
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
        }
    }
}

/// Description of a live session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session identifier
    pub id: Uuid,
    /// Remote peer
    pub peer: PeerId,
    /// Which side opened the stream
    pub direction: Direction,
    /// When the stream was opened
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Why a session ended
#[derive(Debug, Clone)]
pub enum SessionEnd {
    /// The read loop stopped
    ReadLoop(ChatError),
    /// The write loop stopped
    WriteLoop(ChatError),
    /// The session was shut down
    Shutdown,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadLoop(e) => write!(f, "read loop ended: {e}"),
            Self::WriteLoop(e) => write!(f, "write loop ended: {e}"),
            Self::Shutdown => write!(f, "shut down"),
        }
    }
}

struct SessionEntry {
    info: SessionInfo,
    shutdown: oneshot::Sender<()>,
}

/// Registry of live chat sessions
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    console: Console,
}

impl SessionManager {
    /// Create an empty manager whose sessions talk to `console`
    pub fn new(console: Console) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            console,
        }
    }

    /// Start a session bound to `stream`
    ///
    /// Returns as soon as both loops are running.
    pub async fn spawn<S>(&self, peer: PeerId, direction: Direction, stream: S) -> Uuid
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let info = SessionInfo {
            id: Uuid::new_v4(),
            peer,
            direction,
            started_at: chrono::Utc::now(),
        };
        let id = info.id;
        let (shutdown, shutdown_signal) = oneshot::channel();

        log::info!("Starting {} session {} with {}", direction, id, peer);
        self.sessions
            .write()
            .await
            .insert(id, SessionEntry { info, shutdown });

        let manager = self.clone();
        tokio::spawn(async move {
            let end = run_session(stream, manager.console.clone(), shutdown_signal).await;
            manager.finish(id, peer, end).await;
        });

        id
    }

    async fn finish(&self, id: Uuid, peer: PeerId, end: SessionEnd) {
        self.sessions.write().await.remove(&id);

        log::info!("Session {} with {} ended: {}", id, peer, end);
        self.console
            .notice(format!("Session with {peer} closed ({end})"));
    }

    /// Shut one session down
    pub async fn shutdown(&self, id: Uuid) -> Result<()> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| SessionError::NotFound {
                session_id: id.to_string(),
            })?;

        let _ = entry.shutdown.send(());
        Ok(())
    }

    /// Shut every session down
    pub async fn shutdown_all(&self) {
        let entries: Vec<SessionEntry> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        log::info!("Shutting down {} sessions", entries.len());
        for entry in entries {
            let _ = entry.shutdown.send(());
        }
    }

    /// Live sessions
    pub async fn active(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

async fn run_session<S>(stream: S, console: Console, mut shutdown: oneshot::Receiver<()>) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (reader, mut writer) = stream.split();

    let read_console = console.clone();
    let mut reading = tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        read_loop(&mut reader, &read_console).await
    });
    let mut writing = tokio::spawn(async move { write_loop(&mut writer, &console).await });

    let end = tokio::select! {
        result = &mut reading => SessionEnd::ReadLoop(loop_error(result)),
        result = &mut writing => match loop_error(result) {
            // Operator input is gone; the peer can still be heard.
            ChatError::Session(SessionError::InputClosed) => {
                log::debug!("Operator input closed, session keeps reading");
                tokio::select! {
                    result = &mut reading => SessionEnd::ReadLoop(loop_error(result)),
                    _ = &mut shutdown => SessionEnd::Shutdown,
                }
            }
            e => SessionEnd::WriteLoop(e),
        },
        _ = &mut shutdown => SessionEnd::Shutdown,
    };

    reading.abort();
    writing.abort();
    end
}

fn loop_error(result: std::result::Result<Result<()>, JoinError>) -> ChatError {
    match result {
        Ok(Ok(())) => ChatError::unexpected("loop returned without error"),
        Ok(Err(e)) => e,
        Err(e) => ChatError::unexpected(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, wait_for_sessions};
    use crate::utils::ConsoleEvent;
    use futures::{AsyncBufReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_session_displays_remote_lines() {
        let (console, mut io) = Console::channel();
        let manager = SessionManager::new(console);
        let (local, mut remote) = testing::pipe();
        let peer = PeerId::random();

        manager.spawn(peer, Direction::Outbound, local).await;
        remote.write_all(b"hello\n\n").await.unwrap();

        assert_eq!(
            io.output.recv().await,
            Some(ConsoleEvent::Message("hello".to_string()))
        );

        let active = manager.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].peer, peer);
        assert_eq!(active[0].direction, Direction::Outbound);
    }

    #[tokio::test]
    async fn test_session_sends_operator_lines() {
        let (console, io) = Console::channel();
        let manager = SessionManager::new(console);
        let (local, remote) = testing::pipe();

        manager.spawn(PeerId::random(), Direction::Inbound, local).await;
        io.input.send("from operator\n".to_string()).unwrap();

        let mut remote = futures::io::BufReader::new(remote);
        let mut line = String::new();
        remote.read_line(&mut line).await.unwrap();
        assert_eq!(line, "from operator\n");
        line.clear();
        remote.read_line(&mut line).await.unwrap();
        assert_eq!(line, "\n");
    }

    #[tokio::test]
    async fn test_session_ends_when_remote_closes() {
        let (console, mut io) = Console::channel();
        let manager = SessionManager::new(console);
        let (local, remote) = testing::pipe();

        manager.spawn(PeerId::random(), Direction::Outbound, local).await;
        assert_eq!(manager.len().await, 1);
        drop(remote);

        assert!(wait_for_sessions(&manager, 0).await);
        match io.output.recv().await {
            Some(ConsoleEvent::Notice(text)) => assert!(text.contains("read loop ended")),
            other => panic!("unexpected console event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_session_survives_closed_operator_input() {
        let (console, mut io) = Console::channel();
        drop(io.input);
        let manager = SessionManager::new(console);
        let (local, mut remote) = testing::pipe();

        manager.spawn(PeerId::random(), Direction::Inbound, local).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        remote.write_all(b"hello from peer\n").await.unwrap();

        assert_eq!(
            io.output.recv().await,
            Some(ConsoleEvent::Message("hello from peer".to_string()))
        );
        assert_eq!(manager.len().await, 1);

        drop(remote);
        assert!(wait_for_sessions(&manager, 0).await);
        match io.output.recv().await {
            Some(ConsoleEvent::Notice(text)) => assert!(text.contains("read loop ended")),
            other => panic!("unexpected console event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_stream() {
        let (console, _io) = Console::channel();
        let manager = SessionManager::new(console);
        let (local, mut remote) = testing::pipe();

        let id = manager.spawn(PeerId::random(), Direction::Outbound, local).await;
        manager.shutdown(id).await.unwrap();
        assert!(manager.is_empty().await);

        let mut buf = Vec::new();
        let read = remote.read_to_end(&mut buf).await.unwrap();
        assert_eq!(read, 0);

        assert!(matches!(
            manager.shutdown(id).await,
            Err(ChatError::Session(SessionError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let (console, _io) = Console::channel();
        let manager = SessionManager::new(console);
        let (a, _remote_a) = testing::pipe();
        let (b, _remote_b) = testing::pipe();

        manager.spawn(PeerId::random(), Direction::Outbound, a).await;
        manager.spawn(PeerId::random(), Direction::Inbound, b).await;
        assert_eq!(manager.len().await, 2);

        manager.shutdown_all().await;
        assert!(manager.is_empty().await);
    }
}
