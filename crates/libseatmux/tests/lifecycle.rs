//! End-to-end lifecycle coverage against a scripted mock compositor:
//! login, seat switch, Xwayland readiness, scale propagation, logout.

use anyhow::bail;
use libseatmux::{
    Atom, Compositor, ScaleSink, SessionEvent, SessionManager, SessionManagerConfig,
    SettingManager, Socket, SocketId, Uid, UserDb, Xwayland, XwaylandId,
};
use serial_test::serial;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Users;

impl UserDb for Users {
    fn uid_for_name(&self, username: &str) -> Option<Uid> {
        match username {
            "alice" => Some(1000),
            "bob" => Some(1001),
            _ => None,
        }
    }
}

struct FakeSocket {
    id: u64,
    enabled: bool,
}

impl Socket for FakeSocket {
    fn id(&self) -> SocketId {
        SocketId(self.id)
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn server_name(&self) -> String {
        format!("/run/user/1000/wayland-{}", self.id)
    }
}

struct FakeXwayland {
    id: u64,
}

impl Xwayland for FakeXwayland {
    fn id(&self) -> XwaylandId {
        XwaylandId(self.id)
    }

    fn intern_atom(&self, _name: &str) -> Option<Atom> {
        Some(451)
    }
}

struct FakeSettings {
    staged: Option<f64>,
    applied: Arc<Mutex<Vec<f64>>>,
}

impl SettingManager for FakeSettings {
    fn set_global_scale(&mut self, scale: f64) {
        self.staged = Some(scale);
    }

    fn apply(&mut self) {
        if let Some(scale) = self.staged.take() {
            self.applied.lock().unwrap().push(scale);
        }
    }
}

#[derive(Default)]
struct FakeShell {
    next_id: u64,
    fail_xwayland: bool,
    xwaylands_removed: usize,
    surfaces_cleared: usize,
    scale: f64,
    sinks: Vec<ScaleSink>,
    applied_scales: Arc<Mutex<Vec<f64>>>,
}

impl Compositor for FakeShell {
    fn create_socket(&mut self) -> anyhow::Result<Box<dyn Socket>> {
        self.next_id += 1;
        Ok(Box::new(FakeSocket {
            id: self.next_id,
            enabled: false,
        }))
    }

    fn create_xwayland(&mut self, _socket: &dyn Socket) -> anyhow::Result<Box<dyn Xwayland>> {
        if self.fail_xwayland {
            bail!("Xwayland binary unavailable");
        }
        self.next_id += 1;
        Ok(Box::new(FakeXwayland { id: self.next_id }))
    }

    fn remove_xwayland(&mut self, _xwayland: Box<dyn Xwayland>) {
        self.xwaylands_removed += 1;
    }

    fn create_setting_manager(&mut self, _xwayland: &dyn Xwayland) -> Box<dyn SettingManager> {
        Box::new(FakeSettings {
            staged: None,
            applied: Arc::clone(&self.applied_scales),
        })
    }

    fn clear_activated_surface(&mut self) {
        self.surfaces_cleared += 1;
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.scale
    }

    fn watch_device_pixel_ratio(&mut self, sink: ScaleSink) {
        self.sinks.push(sink);
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "libseatmux=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn new_manager(shell: &Rc<RefCell<FakeShell>>) -> SessionManager {
    let compositor: Rc<RefCell<dyn Compositor>> = shell.clone();
    SessionManager::new(
        compositor,
        Box::new(Users),
        SessionManagerConfig {
            worker_shutdown_ms: 2_000,
            ..SessionManagerConfig::default()
        },
    )
}

fn drain(rx: &mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn wait_for_scales(shell: &Rc<RefCell<FakeShell>>, expected: &[f64]) {
    let applied = Arc::clone(&shell.borrow().applied_scales);
    let deadline = Instant::now() + Duration::from_secs(5);
    while *applied.lock().unwrap() != expected {
        assert!(
            Instant::now() < deadline,
            "setting worker never applied {expected:?}"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
#[serial]
fn multi_seat_login_cycle() {
    init_logging();
    let shell = Rc::new(RefCell::new(FakeShell {
        scale: 2.0,
        ..FakeShell::default()
    }));
    let mut manager = new_manager(&shell);
    let events = manager.subscribe();

    // First login provisions and activates alice.
    manager.update_active_user_session("alice", 1);
    let alice = manager.session_for_user("alice").expect("alice session");
    assert!(alice.borrow().socket().expect("socket").enabled());
    assert_eq!(
        drain(&events),
        vec![
            SessionEvent::XwaylandCreated { uid: 1000 },
            SessionEvent::SocketFileChanged,
            SessionEvent::SessionChanged,
        ]
    );

    // Xwayland readiness brings up the setting worker with the current scale.
    let xwayland_id = alice.borrow().xwayland().expect("xwayland").id();
    manager.handle_xwayland_ready(xwayland_id);
    assert_eq!(alice.borrow().no_titlebar_atom, Some(451));
    wait_for_scales(&shell, &[2.0]);

    // A DPI change reaches the worker asynchronously, in order.
    let sink = shell.borrow().sinks[0].clone();
    sink.send(1.0);
    wait_for_scales(&shell, &[2.0, 1.0]);

    // Seat switch to bob flips the sockets and re-announces the endpoint.
    manager.update_active_user_session("bob", 2);
    let bob = manager.session_for_user("bob").expect("bob session");
    assert!(!alice.borrow().socket().expect("socket").enabled());
    assert!(bob.borrow().socket().expect("socket").enabled());
    assert_eq!(
        drain(&events),
        vec![
            SessionEvent::XwaylandCreated { uid: 1001 },
            SessionEvent::SocketFileChanged,
            SessionEvent::SessionChanged,
        ]
    );

    // Alice logs out: registry entry goes, then the context tears down.
    manager.remove_session(&alice);
    assert!(manager.session_for_user("alice").is_none());
    drop(alice);
    assert_eq!(
        drain(&events),
        vec![
            SessionEvent::SessionAboutToBeDestroyed { id: 1, uid: 1000 },
            SessionEvent::XwaylandDestroyed { uid: 1000 },
        ]
    );
    assert_eq!(shell.borrow().xwaylands_removed, 1);

    // Compositor shutdown releases whatever is left.
    drop(bob);
    drop(manager);
    assert_eq!(shell.borrow().xwaylands_removed, 2);
}

#[test]
#[serial]
fn provisioning_failure_never_interrupts_clients() {
    init_logging();
    let shell = Rc::new(RefCell::new(FakeShell {
        scale: 1.0,
        ..FakeShell::default()
    }));
    let mut manager = new_manager(&shell);

    manager.update_active_user_session("alice", 1);
    let alice = manager.session_for_user("alice").expect("alice session");

    shell.borrow_mut().fail_xwayland = true;
    manager.update_active_user_session("bob", 2);

    // Switch aborted: alice stays active, her socket stays enabled, and no
    // half-provisioned bob entry is left behind.
    let active = manager.active_session().upgrade().expect("active session");
    assert!(Rc::ptr_eq(&active, &alice));
    assert!(manager.active_socket_enabled());
    assert!(manager.session_for_user("bob").is_none());
    // No surface was cleared beyond alice's original activation.
    assert_eq!(shell.borrow().surfaces_cleared, 1);
}
