use std::fmt;

use anyhow::Result;

use crate::worker::ScaleSink;

/// Raw system user id.
pub type Uid = u32;

/// X11 atom resolved over an Xwayland instance's connection.
pub type Atom = u32;

/// Identifies one listening Wayland socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one Xwayland instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XwaylandId(pub u64);

impl fmt::Display for XwaylandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A listening Wayland socket owned by exactly one session.
///
/// Only the active session's socket accepts connections; the manager flips
/// the enabled state during a seat switch.
pub trait Socket {
    fn id(&self) -> SocketId;
    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    /// Full path clients connect to (e.g. `$XDG_RUNTIME_DIR/wayland-1`).
    fn server_name(&self) -> String;
}

/// An Xwayland instance bound to one session's socket.
pub trait Xwayland {
    fn id(&self) -> XwaylandId;
    /// Resolve an atom over this instance's X connection. `None` when the
    /// name is empty or the connection refuses; callers tolerate that.
    fn intern_atom(&self, name: &str) -> Option<Atom>;
}

/// Applies xsettings (currently the global scale factor) for one session.
///
/// Instances are moved onto the session's worker thread and only ever
/// called from there; updates arrive through the worker's queue.
pub trait SettingManager: Send {
    fn set_global_scale(&mut self, scale: f64);
    fn apply(&mut self);
}

/// The seam between the session registry and the rest of the compositor.
///
/// Implementations must not call back into the [`SessionManager`] from
/// these methods; the registry invokes them while it is mid-mutation.
///
/// [`SessionManager`]: crate::session::SessionManager
pub trait Compositor {
    fn create_socket(&mut self) -> Result<Box<dyn Socket>>;
    fn create_xwayland(&mut self, socket: &dyn Socket) -> Result<Box<dyn Xwayland>>;
    /// Detach an Xwayland instance from the shell. Called from session
    /// teardown, before the owning session disappears.
    fn remove_xwayland(&mut self, xwayland: Box<dyn Xwayland>);
    fn create_setting_manager(&mut self, xwayland: &dyn Xwayland) -> Box<dyn SettingManager>;
    /// Drop focus from whatever surface is currently activated.
    fn clear_activated_surface(&mut self);
    /// Effective device pixel ratio of the render window.
    fn device_pixel_ratio(&self) -> f64;
    /// Deliver every future scale change to `sink`, in emission order.
    fn watch_device_pixel_ratio(&mut self, sink: ScaleSink);
}

/// Resolves usernames to system user ids.
pub trait UserDb {
    fn uid_for_name(&self, username: &str) -> Option<Uid>;
}

/// [`UserDb`] backed by the system account database.
pub struct NssUserDb;

impl UserDb for NssUserDb {
    fn uid_for_name(&self, username: &str) -> Option<Uid> {
        nix::unistd::User::from_name(username)
            .ok()
            .flatten()
            .map(|user| user.uid.as_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::{NssUserDb, UserDb};

    #[test]
    fn resolves_root() {
        assert_eq!(NssUserDb.uid_for_name("root"), Some(0));
    }

    #[test]
    fn unknown_user_is_none() {
        assert_eq!(NssUserDb.uid_for_name("seatmux-no-such-user"), None);
    }
}
