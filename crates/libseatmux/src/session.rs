use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use tracing::{debug, error, info, warn};

use crate::broker::{EventBroker, SessionEvent};
use crate::config::SessionManagerConfig;
use crate::error::SessionError;
use crate::shell::{Atom, Compositor, Socket, SocketId, Uid, UserDb, Xwayland, XwaylandId};
use crate::worker::SettingWorker;

/// Login-session identifier assigned by the session origin (e.g. logind).
pub type SessionId = i32;

/// Shared owning handle to a session. The registry holds the primary one;
/// resources are released when the last handle goes away.
pub type SessionRef = Rc<RefCell<Session>>;

/// One user's provisioned compositor context: a Wayland socket, the
/// Xwayland instance bound to it, and (after Xwayland readiness) a setting
/// worker propagating the display scale.
pub struct Session {
    pub id: SessionId,
    pub uid: Uid,
    pub username: String,
    /// Interned once the session's Xwayland instance is ready; `None` when
    /// interning failed, which only disables the no-titlebar tagging.
    pub no_titlebar_atom: Option<Atom>,
    socket: Option<Box<dyn Socket>>,
    xwayland: Option<Box<dyn Xwayland>>,
    worker: Option<SettingWorker>,
    // Teardown needs both: the Xwayland handle is detached through the
    // compositor, and subscribers are told before resources go away.
    compositor: Rc<RefCell<dyn Compositor>>,
    events: EventBroker,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("uid", &self.uid)
            .field("username", &self.username)
            .field("no_titlebar_atom", &self.no_titlebar_atom)
            .field("socket", &self.socket.is_some())
            .field("xwayland", &self.xwayland.is_some())
            .field("worker", &self.worker.is_some())
            .finish()
    }
}

impl Session {
    pub fn socket(&self) -> Option<&dyn Socket> {
        self.socket.as_deref()
    }

    pub fn xwayland(&self) -> Option<&dyn Xwayland> {
        self.xwayland.as_deref()
    }

    pub fn has_setting_worker(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(uid = self.uid, user = %self.username, "deleting session");
        self.events.broadcast(SessionEvent::SessionAboutToBeDestroyed {
            id: self.id,
            uid: self.uid,
        });

        // Cooperative quit plus a bounded wait; a stuck worker is detached.
        self.worker = None;

        if let Some(xwayland) = self.xwayland.take() {
            self.events
                .broadcast(SessionEvent::XwaylandDestroyed { uid: self.uid });
            self.compositor.borrow_mut().remove_xwayland(xwayland);
        }
        self.socket = None;
    }
}

static MANAGER_LIVE: AtomicBool = AtomicBool::new(false);

/// Registry of all provisioned sessions and the provisioning/switching
/// protocol. Lives on the compositor thread; nothing here is shared across
/// threads, so no locking.
pub struct SessionManager {
    compositor: Rc<RefCell<dyn Compositor>>,
    users: Box<dyn UserDb>,
    config: SessionManagerConfig,
    events: EventBroker,
    sessions: Vec<SessionRef>,
    active_session: Weak<RefCell<Session>>,
}

impl SessionManager {
    /// One manager per process; constructing a second while one is live is
    /// a bug in the embedding compositor.
    pub fn new(
        compositor: Rc<RefCell<dyn Compositor>>,
        users: Box<dyn UserDb>,
        config: SessionManagerConfig,
    ) -> Self {
        assert!(
            !MANAGER_LIVE.swap(true, Ordering::SeqCst),
            "a SessionManager is already live in this process"
        );
        Self {
            compositor,
            users,
            config,
            events: EventBroker::new(),
            sessions: Vec::new(),
            active_session: Weak::new(),
        }
    }

    /// Subscribe to registry notifications. Events are queued before the
    /// triggering call returns; drain the receiver on the compositor thread.
    pub fn subscribe(&self) -> mpsc::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Snapshot of all live sessions.
    pub fn sessions(&self) -> Vec<SessionRef> {
        self.sessions.clone()
    }

    /// The currently active session, if any.
    pub fn active_session(&self) -> Weak<RefCell<Session>> {
        self.active_session.clone()
    }

    pub fn active_socket_enabled(&self) -> bool {
        self.active_session.upgrade().is_some_and(|session| {
            session
                .borrow()
                .socket
                .as_deref()
                .is_some_and(|socket| socket.enabled())
        })
    }

    pub fn set_active_socket_enabled(&mut self, enabled: bool) {
        let Some(session) = self.active_session.upgrade() else {
            warn!("no active socket to change enabled state on");
            return;
        };
        let mut guard = session.borrow_mut();
        match guard.socket.as_deref_mut() {
            Some(socket) => socket.set_enabled(enabled),
            None => warn!("no active socket to change enabled state on"),
        }
    }

    /// Drop a session from the registry.
    ///
    /// If it is the active one, the active reference is cleared and the
    /// activated surface released first. Resource teardown itself happens
    /// when the last owning handle is released.
    pub fn remove_session(&mut self, session: &SessionRef) {
        let was_active = self
            .active_session
            .upgrade()
            .is_some_and(|active| Rc::ptr_eq(&active, session));
        if was_active {
            self.active_session = Weak::new();
            self.compositor.borrow_mut().clear_activated_surface();
        }
        self.sessions.retain(|s| !Rc::ptr_eq(s, session));
    }

    /// Find or fully provision the session for `username`.
    ///
    /// Safe to call repeatedly: an existing session is returned as-is, with
    /// only its missing pieces filled in. On any provisioning failure the
    /// registry holds no entry for `username` afterwards.
    pub fn ensure_session(
        &mut self,
        id: SessionId,
        username: &str,
    ) -> Result<SessionRef, SessionError> {
        if let Some(session) = self.session_for_user(username) {
            let filled = self.fill_missing(&mut session.borrow_mut());
            if let Err(err) = filled {
                self.remove_session(&session);
                return Err(err);
            }
            return Ok(session);
        }

        let Some(uid) = self.users.uid_for_name(username) else {
            error!(user = %username, "unknown user, refusing to create session");
            return Err(SessionError::UnknownUser(username.to_string()));
        };

        let session = Rc::new(RefCell::new(Session {
            id,
            uid,
            username: username.to_string(),
            no_titlebar_atom: None,
            socket: None,
            xwayland: None,
            worker: None,
            compositor: Rc::clone(&self.compositor),
            events: self.events.clone(),
        }));
        // On failure the shell is dropped here, never registered.
        self.fill_missing(&mut session.borrow_mut())?;
        self.sessions.push(Rc::clone(&session));
        debug!(session_id = id, uid, user = %username, "session created");
        Ok(session)
    }

    fn fill_missing(&self, session: &mut Session) -> Result<(), SessionError> {
        if session.socket.is_none() {
            let socket = self.compositor.borrow_mut().create_socket().map_err(|err| {
                error!(user = %session.username, "failed to create wayland socket: {err:#}");
                SessionError::Socket(err)
            })?;
            session.socket = Some(socket);
        }

        if session.xwayland.is_none()
            && let Some(socket) = session.socket.as_deref()
        {
            match self.compositor.borrow_mut().create_xwayland(socket) {
                Ok(xwayland) => {
                    session.xwayland = Some(xwayland);
                    self.events
                        .broadcast(SessionEvent::XwaylandCreated { uid: session.uid });
                }
                Err(err) => {
                    error!(user = %session.username, "failed to create xwayland instance: {err:#}");
                    return Err(SessionError::Xwayland(err));
                }
            }
        }
        Ok(())
    }

    /// Make `username`'s session the active one, provisioning it first if
    /// needed.
    ///
    /// On provisioning failure the previous session stays active and its
    /// socket stays enabled; connected clients never notice. Re-activating
    /// the already-active session only logs the socket path.
    pub fn update_active_user_session(&mut self, username: &str, id: SessionId) {
        let previous = self.active_session.upgrade();
        let session = match self.ensure_session(id, username) {
            Ok(session) => session,
            Err(err) => {
                warn!(user = %username, "failed to ensure session: {err}");
                return;
            }
        };

        let same = previous.as_ref().is_some_and(|p| Rc::ptr_eq(p, &session));
        if !same {
            self.active_session = Rc::downgrade(&session);
            // The outgoing session's surface must not keep focus.
            self.compositor.borrow_mut().clear_activated_surface();
            if let Some(previous) = previous {
                if let Some(socket) = previous.borrow_mut().socket.as_deref_mut() {
                    socket.set_enabled(false);
                }
            }
            if let Some(socket) = session.borrow_mut().socket.as_deref_mut() {
                socket.set_enabled(true);
            }
            self.events.broadcast(SessionEvent::SocketFileChanged);
            self.events.broadcast(SessionEvent::SessionChanged);
        }
        if let Some(socket) = session.borrow().socket.as_deref() {
            info!(user = %username, socket = %socket.server_name(), "listening on");
        }
    }

    /// Follow-up once a session's Xwayland instance reports ready: intern
    /// the no-titlebar atom and start the setting worker. Both failures
    /// here are tolerated; the session stays usable without them.
    pub fn handle_xwayland_ready(&mut self, id: XwaylandId) {
        let Some(session) = self.session_for_xwayland(id) else {
            warn!(xwayland = %id, "ready signal for unknown xwayland instance");
            return;
        };
        let mut guard = session.borrow_mut();
        if guard.worker.is_some() {
            debug!(uid = guard.uid, "setting worker already running");
            return;
        }
        let Some(xwayland) = guard.xwayland.as_deref() else {
            return;
        };

        let atom = xwayland.intern_atom(&self.config.no_titlebar_atom);
        if atom.is_none() {
            warn!(atom = %self.config.no_titlebar_atom, "failed to intern atom");
        }

        let settings = self.compositor.borrow_mut().create_setting_manager(xwayland);
        let worker = match SettingWorker::spawn(settings, self.config.worker_shutdown_timeout()) {
            Ok(worker) => worker,
            Err(err) => {
                error!(uid = guard.uid, "failed to start setting worker: {err}");
                return;
            }
        };
        let sink = worker.sink();
        sink.send(self.compositor.borrow().device_pixel_ratio());
        self.compositor.borrow_mut().watch_device_pixel_ratio(sink);

        guard.no_titlebar_atom = atom;
        guard.worker = Some(worker);
    }

    /// A socket's listening path changed. Only the active session's socket
    /// is relevant to clients, so anything else is ignored.
    pub fn handle_server_name_changed(&self, id: SocketId) {
        let is_active_socket = self.active_session.upgrade().is_some_and(|session| {
            session
                .borrow()
                .socket
                .as_deref()
                .is_some_and(|socket| socket.id() == id)
        });
        if is_active_socket {
            self.events.broadcast(SessionEvent::SocketFileChanged);
        }
    }

    pub fn session_for_id(&self, id: SessionId) -> Option<SessionRef> {
        self.sessions.iter().find(|s| s.borrow().id == id).cloned()
    }

    pub fn session_for_uid(&self, uid: Uid) -> Option<SessionRef> {
        self.sessions.iter().find(|s| s.borrow().uid == uid).cloned()
    }

    pub fn session_for_user(&self, username: &str) -> Option<SessionRef> {
        self.sessions
            .iter()
            .find(|s| s.borrow().username == username)
            .cloned()
    }

    pub fn session_for_socket(&self, id: SocketId) -> Option<SessionRef> {
        self.sessions
            .iter()
            .find(|s| {
                s.borrow()
                    .socket
                    .as_deref()
                    .is_some_and(|socket| socket.id() == id)
            })
            .cloned()
    }

    pub fn session_for_xwayland(&self, id: XwaylandId) -> Option<SessionRef> {
        self.sessions
            .iter()
            .find(|s| {
                s.borrow()
                    .xwayland
                    .as_deref()
                    .is_some_and(|xwayland| xwayland.id() == id)
            })
            .cloned()
    }

    /// The reserved compositor account's session, independent of whichever
    /// user is interactively active.
    pub fn global_session(&self) -> Option<SessionRef> {
        self.session_for_user(&self.config.global_username)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.active_session = Weak::new();
        // Each session tears down through its own Drop.
        self.sessions.clear();
        MANAGER_LIVE.store(false, Ordering::SeqCst);
    }
}
