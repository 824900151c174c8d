//! Background poller against a scripted backend

use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streampad::controller::device::{DeviceCaps, DeviceId};
use streampad::controller::foreground::ForegroundPump;
use streampad::controller::mapping::LogicalButton;
use streampad::controller::mock_backend::MockBackend;
use streampad::controller::poller::{
    Idle, InputPoller, PollOutcome, PollerHandle, PollerSettings, Polling,
};
use streampad::controller::session::{share_backend, SharedSession, StreamSession};

const PAD: DeviceCaps = DeviceCaps {
    buttons: 15,
    axes: 6,
    hats: 1,
};

struct Rig {
    mock: MockBackend,
    session: SharedSession,
    focus: Arc<AtomicBool>,
    pump: ForegroundPump,
}

impl Rig {
    fn new() -> Self {
        let mock = MockBackend::new();
        let backend = share_backend(mock.clone());
        let session = StreamSession::default().shared();
        let pump = ForegroundPump::new(
            backend,
            session.clone(),
            true,
            chrono::Duration::milliseconds(2000),
        );
        Self {
            mock,
            session,
            focus: Arc::new(AtomicBool::new(false)),
            pump,
        }
    }

    fn connect(&mut self, name: &str) -> DeviceId {
        let pad = self.mock.connect(name, PAD, Local::now());
        self.pump.initial_scan().unwrap();
        pad
    }

    fn poller(&self) -> InputPoller<Idle> {
        InputPoller::create(
            share_backend(self.mock.clone()),
            self.session.clone(),
            self.focus.clone(),
            PollerSettings::default(),
        )
    }

    fn polling(&self) -> InputPoller<Polling> {
        self.poller().start()
    }
}

#[test]
fn focused_window_skips_polling() {
    let mut rig = Rig::new();
    let pad = rig.connect("Xbox Wireless Controller");
    rig.focus.store(true, Ordering::Relaxed);
    rig.mock.set_button(pad, 0, true);

    let mut poller = rig.polling();
    assert_eq!(poller.poll_once().unwrap(), PollOutcome::SkippedFocused);
    assert!(!rig.session.lock().unwrap().store().is_pressed(LogicalButton::A));
    assert_eq!(poller.stats().skipped, 1);
}

#[test]
fn no_active_device_is_reported() {
    let rig = Rig::new();
    let mut poller = rig.polling();
    assert_eq!(poller.poll_once().unwrap(), PollOutcome::NoDevice);
}

#[test]
fn unfocused_poll_emits_each_transition_once() {
    let mut rig = Rig::new();
    let pad = rig.connect("Xbox Wireless Controller");
    let mut poller = rig.polling();

    assert_eq!(
        poller.poll_once().unwrap(),
        PollOutcome::Polled { transitions: 0 }
    );

    rig.mock.set_button(pad, 0, true);
    rig.mock.set_axis(pad, 0, -0.9);
    assert_eq!(
        poller.poll_once().unwrap(),
        PollOutcome::Polled { transitions: 2 }
    );
    assert_eq!(
        poller.poll_once().unwrap(),
        PollOutcome::Polled { transitions: 0 }
    );

    {
        let session = rig.session.lock().unwrap();
        assert!(session.store().is_pressed(LogicalButton::A));
        assert!(session.store().is_pressed(LogicalButton::DPadLeft));
        assert_eq!(session.notes().active_count(), 2);
    }

    rig.mock.set_button(pad, 0, false);
    rig.mock.set_axis(pad, 0, 0.0);
    assert_eq!(
        poller.poll_once().unwrap(),
        PollOutcome::Polled { transitions: 2 }
    );
    assert!(rig.session.lock().unwrap().store().pressed().is_empty());
    assert_eq!(poller.stats().transitions, 4);
}

#[test]
fn press_seen_by_both_paths_counts_once() {
    let mut rig = Rig::new();
    let pad = rig.connect("Xbox Wireless Controller");
    rig.pump.pump(Local::now(), true).unwrap();

    rig.mock.button(pad, 0, true, Local::now());
    rig.pump.pump(Local::now(), true).unwrap();

    // The poller never saw the press, so its snapshot still differs
    let mut poller = rig.polling();
    assert_eq!(
        poller.poll_once().unwrap(),
        PollOutcome::Polled { transitions: 1 }
    );

    let session = rig.session.lock().unwrap();
    assert_eq!(session.store().total_presses(), 1);
    assert_eq!(session.notes().notes().len(), 1);
}

#[test]
fn failed_read_drops_the_tick() {
    let mut rig = Rig::new();
    rig.connect("Xbox Wireless Controller");
    rig.mock.set_failing(true);

    let mut poller = rig.polling();
    assert_eq!(poller.poll_once().unwrap(), PollOutcome::ReadFailed);
    assert_eq!(poller.stats().read_failures, 1);

    rig.mock.set_failing(false);
    assert_eq!(
        poller.poll_once().unwrap(),
        PollOutcome::Polled { transitions: 0 }
    );
}

#[tokio::test]
async fn spawned_poller_stops_on_shutdown() {
    let rig = Rig::new();
    rig.focus.store(true, Ordering::Relaxed);

    let handle = PollerHandle::spawn(rig.poller());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = handle.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(stats.ticks >= 1);
    assert_eq!(stats.skipped, stats.ticks);
}

#[tokio::test]
async fn spawned_poller_feeds_the_session_while_unfocused() {
    let mut rig = Rig::new();
    let pad = rig.connect("Xbox Wireless Controller");
    rig.mock.set_button(pad, 1, true);

    let handle = PollerHandle::spawn(rig.poller());
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = handle.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(stats.transitions, 1);
    assert!(rig.session.lock().unwrap().store().is_pressed(LogicalButton::B));
}
