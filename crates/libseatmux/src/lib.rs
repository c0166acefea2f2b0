//! Per-user session registry for a multi-seat Wayland compositor.
//!
//! Each session pairs a listening Wayland socket with an Xwayland instance
//! and a background xsettings worker. [`SessionManager`] provisions them on
//! demand, switches the active one when the seat changes user, and tears
//! them down in order when they go away.

pub mod broker;
pub mod config;
pub mod error;
pub mod session;
pub mod shell;
pub mod worker;

pub use broker::{EventBroker, SessionEvent};
pub use config::SessionManagerConfig;
pub use error::SessionError;
pub use session::{Session, SessionId, SessionManager, SessionRef};
pub use shell::{
    Atom, Compositor, NssUserDb, SettingManager, Socket, SocketId, Uid, UserDb, Xwayland,
    XwaylandId,
};
pub use worker::{ScaleSink, SettingWorker};
