//! End-to-end flows through the foreground pump with a scripted backend

use chrono::{DateTime, Duration, Local, TimeZone};
use streampad::controller::device::{DeviceCaps, RawSnapshot};
use streampad::controller::foreground::ForegroundPump;
use streampad::controller::mapping::LogicalButton;
use streampad::controller::mock_backend::MockBackend;
use streampad::controller::normalizer::{InputPath, PathSnapshot};
use streampad::controller::session::{share_backend, SharedSession, StreamSession};

const PAD: DeviceCaps = DeviceCaps {
    buttons: 15,
    axes: 6,
    hats: 1,
};

const SNES: DeviceCaps = DeviceCaps {
    buttons: 15,
    axes: 4,
    hats: 1,
};

fn at(ms: i64) -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::milliseconds(ms)
}

fn rig(background_polling: bool) -> (MockBackend, SharedSession, ForegroundPump) {
    let mock = MockBackend::new();
    let backend = share_backend(mock.clone());
    let session = StreamSession::default().shared();
    let pump = ForegroundPump::new(
        backend,
        session.clone(),
        background_polling,
        Duration::milliseconds(2000),
    );
    (mock, session, pump)
}

#[test]
fn hat_press_and_release_grow_then_freeze_a_note() {
    let (mock, session, mut pump) = rig(true);
    let pad = mock.connect("Xbox Wireless Controller", PAD, at(0));
    pump.initial_scan().unwrap();
    pump.pump(at(0), true).unwrap();

    mock.hat(pad, -1, 0, at(10));
    let report = pump.pump(at(16), true).unwrap();
    assert_eq!(report.transitions, 1);
    {
        let session = session.lock().unwrap();
        assert!(session.store().is_pressed(LogicalButton::DPadLeft));
        assert!(session.notes().active_note(LogicalButton::DPadLeft).is_some());
    }

    mock.hat(pad, 0, 0, at(500));
    pump.pump(at(510), true).unwrap();

    let session = session.lock().unwrap();
    assert!(!session.store().is_pressed(LogicalButton::DPadLeft));
    assert_eq!(session.notes().active_count(), 0);
    let notes = session.notes().notes();
    assert_eq!(notes.len(), 1);
    assert!(!notes[0].growing);
    let settings = session.notes().settings();
    let expected = settings.min_height + 490.0 * settings.growth_rate / 1000.0;
    assert!((notes[0].height - expected).abs() < 1e-3);
}

#[test]
fn hat_only_pad_drops_echoed_dpad_buttons() {
    let (mock, session, mut pump) = rig(true);
    let pad = mock.connect("SNES Controller for Switch", SNES, at(0));
    pump.initial_scan().unwrap();
    pump.pump(at(0), true).unwrap();

    mock.hat(pad, -1, 0, at(100));
    // Echo of the hat on the generic d-pad index
    mock.button(pad, 13, true, at(105));
    // Family d-pad index, inside the debounce window
    mock.button(pad, 11, true, at(110));
    mock.button(pad, 0, true, at(200));

    let report = pump.pump(at(210), true).unwrap();
    assert_eq!(report.events, 4);
    assert_eq!(report.transitions, 2);

    let session = session.lock().unwrap();
    assert!(session.store().is_pressed(LogicalButton::DPadLeft));
    assert!(session.store().is_pressed(LogicalButton::A));
    assert!(!session.store().is_pressed(LogicalButton::DPadUp));
    assert_eq!(session.store().total_presses(), 2);
}

#[test]
fn removing_the_active_device_resets_and_falls_back() {
    let (mock, session, mut pump) = rig(true);
    let first = mock.connect("Xbox Wireless Controller", PAD, at(0));
    let second = mock.connect("Wireless Controller PS4", PAD, at(0));
    assert_eq!(pump.initial_scan().unwrap(), Some(first));
    pump.pump(at(0), true).unwrap();

    mock.button(first, 0, true, at(20));
    pump.pump(at(30), true).unwrap();
    assert!(session.lock().unwrap().store().is_pressed(LogicalButton::A));

    mock.disconnect(first, at(40));
    let report = pump.pump(at(50), true).unwrap();
    assert!(report.roster_changed);

    let session = session.lock().unwrap();
    assert_eq!(session.active_device(), Some(second));
    assert!(session.store().pressed().is_empty());
    assert!(session.notes().notes().is_empty());
    assert_eq!(session.stats().emergency_resets, 1);
}

#[test]
fn hotplugged_device_becomes_active_when_none_is() {
    let (mock, session, mut pump) = rig(true);
    assert_eq!(pump.initial_scan().unwrap(), None);

    let pad = mock.connect("Pro Controller", PAD, at(0));
    let report = pump.pump(at(0), true).unwrap();
    assert!(report.roster_changed);
    assert_eq!(pump.roster().len(), 1);
    assert_eq!(session.lock().unwrap().active_device(), Some(pad));
}

#[test]
fn refresh_keeps_the_selected_device_by_name() {
    let (mock, session, mut pump) = rig(true);
    mock.connect("Xbox Wireless Controller", PAD, at(0));
    let second = mock.connect("DualSense Wireless Controller", PAD, at(0));
    pump.initial_scan().unwrap();
    pump.switch_device().unwrap();

    assert_eq!(pump.refresh_devices().unwrap(), Some(second));
    let session = session.lock().unwrap();
    assert_eq!(session.active_device(), Some(second));
    assert_eq!(session.stats().emergency_resets, 1);
}

#[test]
fn periodic_validation_releases_a_lost_release() {
    let (mock, session, mut pump) = rig(true);
    let pad = mock.connect("Xbox Wireless Controller", PAD, at(0));
    pump.initial_scan().unwrap();
    pump.pump(at(0), true).unwrap();
    assert!(pump.tick_reconcile(at(0)).unwrap().is_empty());

    mock.button(pad, 0, true, at(100));
    pump.pump(at(110), true).unwrap();
    // Release never reaches the event queue
    mock.set_button(pad, 0, false);

    assert!(pump.tick_reconcile(at(1000)).unwrap().is_empty());
    assert!(session.lock().unwrap().store().is_pressed(LogicalButton::A));

    assert_eq!(
        pump.tick_reconcile(at(2500)).unwrap(),
        vec![LogicalButton::A]
    );
    let session = session.lock().unwrap();
    assert!(!session.store().is_pressed(LogicalButton::A));
    assert_eq!(session.notes().active_count(), 0);
    assert_eq!(session.notes().notes().len(), 1);
    assert_eq!(session.stats().reconcile_releases, 1);
}

#[test]
fn button_released_by_validation_can_be_pressed_again() {
    let (mock, session, mut pump) = rig(true);
    let pad = mock.connect("Xbox Wireless Controller", PAD, at(0));
    pump.initial_scan().unwrap();
    pump.pump(at(0), true).unwrap();
    assert!(pump.tick_reconcile(at(0)).unwrap().is_empty());

    mock.button(pad, 0, true, at(100));
    pump.pump(at(110), true).unwrap();
    mock.set_button(pad, 0, false);
    assert!(pump.tick_reconcile(at(1000)).unwrap().is_empty());
    assert_eq!(
        pump.tick_reconcile(at(2500)).unwrap(),
        vec![LogicalButton::A]
    );

    mock.button(pad, 0, true, at(2600));
    let report = pump.pump(at(2610), true).unwrap();
    assert_eq!(report.transitions, 1);

    let session = session.lock().unwrap();
    assert!(session.store().is_pressed(LogicalButton::A));
    assert_eq!(session.store().total_presses(), 2);
    assert_eq!(session.notes().active_count(), 1);
    assert_eq!(session.notes().notes().len(), 2);
}

#[test]
fn validation_keeps_buttons_that_are_still_held() {
    let (mock, session, mut pump) = rig(true);
    let pad = mock.connect("Xbox Wireless Controller", PAD, at(0));
    pump.initial_scan().unwrap();
    pump.pump(at(0), true).unwrap();

    mock.button(pad, 0, true, at(100));
    mock.hat(pad, 0, 1, at(100));
    pump.pump(at(110), true).unwrap();

    assert!(pump.validate(at(3000)).unwrap().is_empty());
    let session = session.lock().unwrap();
    assert!(session.store().is_pressed(LogicalButton::A));
    assert!(session.store().is_pressed(LogicalButton::DPadUp));
}

#[test]
fn failed_validation_read_triggers_emergency_reset() {
    let (mock, session, mut pump) = rig(true);
    let pad = mock.connect("Xbox Wireless Controller", PAD, at(0));
    pump.initial_scan().unwrap();
    pump.pump(at(0), true).unwrap();

    mock.button(pad, 1, true, at(100));
    pump.pump(at(110), true).unwrap();
    mock.set_failing(true);

    assert!(pump.validate(at(200)).unwrap().is_empty());
    let session = session.lock().unwrap();
    assert!(session.store().pressed().is_empty());
    assert!(session.notes().notes().is_empty());
    assert_eq!(session.stats().emergency_resets, 1);
}

#[test]
fn focus_regain_adopts_state_moved_by_the_poller() {
    let (mock, session, mut pump) = rig(true);
    let pad = mock.connect("Xbox Wireless Controller", PAD, at(0));
    pump.initial_scan().unwrap();
    pump.pump(at(0), true).unwrap();

    // Press while unfocused: the pump drops the event, the poller applies it
    mock.button(pad, 0, true, at(100));
    let report = pump.pump(at(110), false).unwrap();
    assert_eq!(report.skipped, 1);
    {
        let mut session = session.lock().unwrap();
        let snapshot = RawSnapshot::capture(&mock, pad, PAD, at(120)).unwrap();
        assert_eq!(session.ingest_snapshot(InputPath::Background, &snapshot).len(), 1);
        assert!(session.store().is_pressed(LogicalButton::A));
    }

    pump.pump(at(200), true).unwrap();
    mock.button(pad, 0, false, at(300));
    let report = pump.pump(at(310), true).unwrap();

    assert_eq!(report.transitions, 1);
    let session = session.lock().unwrap();
    assert!(!session.store().is_pressed(LogicalButton::A));
    assert_eq!(session.store().total_presses(), 1);
}

#[test]
fn emergency_reset_clears_everything_but_keeps_the_device() {
    let (mock, session, mut pump) = rig(true);
    let pad = mock.connect("Xbox Wireless Controller", PAD, at(0));
    pump.initial_scan().unwrap();
    pump.pump(at(0), true).unwrap();

    mock.button(pad, 0, true, at(100));
    mock.button(pad, 2, true, at(100));
    pump.pump(at(110), true).unwrap();

    let mut session = session.lock().unwrap();
    session.emergency_reset("test");
    assert!(session.store().pressed().is_empty());
    assert!(session.notes().notes().is_empty());
    assert_eq!(session.active_device(), Some(pad));
    assert_eq!(
        *session.normalizer().snapshot(InputPath::Foreground),
        PathSnapshot::default()
    );
}
