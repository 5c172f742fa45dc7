use std::thread;
use std::time::Duration;

use crate::{Error, Event, EventStatus, status};

#[test]
fn test_event_lifecycle() {
    let event = Event::new();
    assert_eq!(event.status(), EventStatus::Queued);

    event.set_running();
    assert_eq!(event.status(), EventStatus::Running);

    event.complete();
    assert_eq!(event.status(), EventStatus::Complete);
    event.wait().unwrap();
}

#[test]
fn test_terminal_state_is_final() {
    let event = Event::new();
    event.fail(status::OUT_OF_RESOURCES);
    event.complete();
    event.set_running();

    assert_eq!(event.status(), EventStatus::Failed(status::OUT_OF_RESOURCES));
    assert!(matches!(event.wait(), Err(Error::EventFailed { code: status::OUT_OF_RESOURCES, .. })));
}

#[test]
fn test_wait_concurrent() {
    let event = Event::new();
    let signaller = {
        let event = event.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            event.complete();
        })
    };

    event.wait_timeout(5000).unwrap();
    signaller.join().unwrap();
}

#[test]
fn test_wait_timeout() {
    let event = Event::new();
    assert!(matches!(event.wait_timeout(20), Err(Error::Runtime { .. })));
}

#[test]
fn test_event_ids_are_unique() {
    assert_ne!(Event::new().id(), Event::new().id());
}

#[test]
fn test_wait_for_reports_pending_then_terminal() {
    let event = Event::new();
    assert_eq!(event.wait_for(Duration::from_millis(5)), None);

    event.fail(status::OUT_OF_RESOURCES);
    assert_eq!(event.wait_for(Duration::ZERO), Some(EventStatus::Failed(status::OUT_OF_RESOURCES)));
}
