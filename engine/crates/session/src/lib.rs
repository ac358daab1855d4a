use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// One encoded TCP frame addressed to a session.
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub session_id: SessionId,
    pub bytes: Vec<u8>,
    /// When true, the output router will close the session's write channel
    /// after delivering this frame, causing the TCP connection to shut down.
    pub disconnect: bool,
}

impl SessionOutput {
    pub fn new(session_id: SessionId, bytes: Vec<u8>) -> Self {
        Self {
            session_id,
            bytes,
            disconnect: false,
        }
    }

    /// A final frame that disconnects the session after delivery.
    pub fn with_disconnect(session_id: SessionId, bytes: Vec<u8>) -> Self {
        Self {
            session_id,
            bytes,
            disconnect: true,
        }
    }

    /// Closes the session without sending anything further.
    pub fn close(session_id: SessionId) -> Self {
        Self::with_disconnect(session_id, Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no account bound yet.
    Connected,
    /// Bound to an account and subscribed to broadcasts.
    Identified,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSession {
    pub session_id: SessionId,
    pub state: SessionState,
    pub peer: SocketAddr,
    pub account: Option<u64>,
    pub temp_id: u16,
    /// Learned from the first UDP packet; UDP sends are skipped until set.
    pub udp_addr: Option<SocketAddr>,
}

impl PlayerSession {
    pub fn new(session_id: SessionId, peer: SocketAddr, temp_id: u16) -> Self {
        Self {
            session_id,
            state: SessionState::Connected,
            peer,
            account: None,
            temp_id,
            udp_addr: None,
        }
    }

    pub fn is_identified(&self) -> bool {
        self.state == SessionState::Identified
    }
}

/// Immutable copy of an identified session handed to broadcast loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionView {
    pub session_id: SessionId,
    pub account: u64,
    pub temp_id: u16,
    pub udp_addr: Option<SocketAddr>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} does not exist")]
    Unknown(SessionId),

    #[error("session {0} is closed")]
    Closed(SessionId),

    #[error("session {session} is already bound to account {account}")]
    AlreadyIdentified { session: SessionId, account: u64 },

    #[error("no temp id available")]
    TempIdsExhausted,
}

/// Result of a successful identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identified {
    pub temp_id: u16,
    /// An older session of the same account that was closed in favour of
    /// this one.
    pub replaced: Option<PlayerSession>,
}

/// Open sessions keyed by id, with the account index kept in step.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: BTreeMap<SessionId, PlayerSession>,
    by_account: BTreeMap<u64, SessionId>,
    temp_ids: BTreeSet<u16>,
    next_id: u64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_temp_id(&mut self) -> Result<u16, SessionError> {
        let free = (1..=u16::MAX)
            .find(|id| !self.temp_ids.contains(id))
            .ok_or(SessionError::TempIdsExhausted)?;
        self.temp_ids.insert(free);
        Ok(free)
    }

    /// Create a new session, returning its id.
    pub fn create_session(&mut self, peer: SocketAddr) -> Result<SessionId, SessionError> {
        let id = SessionId(self.next_id);
        self.create_session_with_id(id, peer)?;
        Ok(id)
    }

    /// Create a session with a specific id (used when the network layer assigns ids).
    pub fn create_session_with_id(&mut self, id: SessionId, peer: SocketAddr) -> Result<u16, SessionError> {
        let temp_id = self.allocate_temp_id()?;
        self.sessions.insert(id, PlayerSession::new(id, peer, temp_id));
        if id.0 >= self.next_id {
            self.next_id = id.0 + 1;
        }
        tracing::debug!(session_id = %id, %peer, temp_id, "session created");
        Ok(temp_id)
    }

    pub fn get(&self, id: SessionId) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    pub fn session_for_account(&self, account: u64) -> Option<&PlayerSession> {
        let sid = self.by_account.get(&account)?;
        self.sessions.get(sid)
    }

    pub fn account_of(&self, id: SessionId) -> Option<u64> {
        self.sessions
            .get(&id)
            .filter(|s| s.is_identified())
            .and_then(|s| s.account)
    }

    /// `Connected -> Identified`. A previous session of the same account is
    /// closed and returned so the caller can disconnect it.
    pub fn identify(&mut self, id: SessionId, account: u64) -> Result<Identified, SessionError> {
        let session = self.sessions.get(&id).ok_or(SessionError::Unknown(id))?;
        match (session.state, session.account) {
            (SessionState::Closed, _) => return Err(SessionError::Closed(id)),
            (SessionState::Identified, Some(bound)) if bound != account => {
                return Err(SessionError::AlreadyIdentified { session: id, account: bound });
            }
            (SessionState::Identified, Some(_)) => {
                return Ok(Identified {
                    temp_id: session.temp_id,
                    replaced: None,
                });
            }
            _ => {}
        }

        let replaced = match self.by_account.get(&account).copied() {
            Some(old) if old != id => {
                tracing::info!(account, old_session = %old, new_session = %id, "account reconnected, closing older session");
                self.close(old)
            }
            _ => None,
        };

        let session = self.sessions.get_mut(&id).ok_or(SessionError::Unknown(id))?;
        session.state = SessionState::Identified;
        session.account = Some(account);
        let temp_id = session.temp_id;
        self.by_account.insert(account, id);
        tracing::info!(session_id = %id, account, temp_id, "session identified");
        Ok(Identified { temp_id, replaced })
    }

    /// Binds the UDP source `addr` to the identified session of `account`
    /// whose TCP peer shares its IP. Returns the bound session.
    pub fn bind_udp(&mut self, account: u64, addr: SocketAddr) -> Option<SessionId> {
        let sid = *self.by_account.get(&account)?;
        let session = self.sessions.get_mut(&sid)?;
        if !session.is_identified() || session.peer.ip() != addr.ip() {
            tracing::debug!(account, %addr, "udp bind rejected");
            return None;
        }
        if session.udp_addr != Some(addr) {
            tracing::debug!(session_id = %sid, %addr, "udp endpoint bound");
            session.udp_addr = Some(addr);
        }
        Some(sid)
    }

    /// Marks a session Closed and drops it from the registry, freeing its
    /// temp id. Returns the final state of the session.
    pub fn close(&mut self, id: SessionId) -> Option<PlayerSession> {
        let mut session = self.sessions.remove(&id)?;
        session.state = SessionState::Closed;
        self.temp_ids.remove(&session.temp_id);
        if let Some(account) = session.account {
            if self.by_account.get(&account) == Some(&id) {
                self.by_account.remove(&account);
            }
        }
        tracing::debug!(session_id = %id, account = ?session.account, "session closed");
        Some(session)
    }

    /// Owned copy of every identified session, ordered by session id.
    pub fn broadcast_snapshot(&self) -> Vec<SessionView> {
        self.sessions
            .values()
            .filter(|s| s.is_identified())
            .filter_map(|s| {
                Some(SessionView {
                    session_id: s.session_id,
                    account: s.account?,
                    temp_id: s.temp_id,
                    udp_addr: s.udp_addr,
                })
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn identified_count(&self) -> usize {
        self.by_account.len()
    }
}
