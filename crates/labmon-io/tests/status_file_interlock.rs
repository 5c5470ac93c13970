use interlock_core::{ChannelBank, ChannelHistory, Condition, Interlock, Range, Reading};
use labmon_io::{FileStatusSink, LogReporter};

fn bank() -> ChannelBank {
    ChannelBank::with_channels(vec![
        ChannelHistory::new("Heater", 1, 3).unwrap(),
        ChannelHistory::new("Turbo", 1, 3).unwrap(),
    ])
}

#[test]
fn status_file_tracks_each_tick() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("status.txt");

    let mut interlock = Interlock::new(
        Condition::new("Heater").idle(Range::new(0.0, 5.0)),
        vec![Condition::new("Turbo")
            .running(Range::new(18.0, 30.0))
            .lockout(Range::new(0.0, 45.0))],
        Box::new(LogReporter),
        Box::new(FileStatusSink::new(&path)),
    );

    let mut bank = bank();
    bank.record("Heater", Reading::single(9.0)).unwrap();
    bank.record("Turbo", Reading::single(50.0)).unwrap();
    interlock.check_interlock(&bank);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        content,
        "Interlock: ENGAGED\nLockout: Turbo\nStatus: running\nWarnings: Turbo\n"
    );

    // Three fresh readings push the excursion out of both histories.
    for _ in 0..3 {
        bank.record("Turbo", Reading::single(25.0)).unwrap();
        bank.record("Heater", Reading::single(1.0)).unwrap();
    }
    interlock.check_interlock(&bank);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "Status: idle\nWarnings: \n");
}
