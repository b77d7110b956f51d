//! The state machine and lamp controller through their public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use andino_fsm::lamp::{ACTIVE, DOWN, PIN_CHANGE_EVENT};
use andino_fsm::{FsmError, Lamp, LampController, LampOutputs, State, StateMachine};

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: &'static str) -> impl FnMut() + Send + 'static {
    let log = Arc::clone(log);
    move || log.lock().unwrap().push(entry.to_string())
}

/// Input levels as reported by the I/O board, input 0 first.
fn terminal(log: &Log) -> StateMachine<Vec<u8>> {
    let mut fsm = StateMachine::new();
    fsm.add_start_state(
        DOWN,
        State::new()
            .on(PIN_CHANGE_EVENT, |inputs: &Vec<u8>| {
                (inputs.first() == Some(&1)).then(|| ACTIVE.to_string())
            })
            .on_exit(push(log, "exit down")),
    );
    fsm.add_state(
        ACTIVE,
        State::new()
            .on("downtime", |_| Some(DOWN.to_string()))
            .on_enter(push(log, "enter active")),
    );
    fsm
}

#[test]
fn test_pin_change_activates_terminal() {
    let log = Log::default();
    let mut fsm = terminal(&log);

    assert_eq!(
        fsm.send_event(PIN_CHANGE_EVENT, &vec![1]).unwrap_err(),
        FsmError::NotStarted
    );

    fsm.run().unwrap();
    assert!(fsm.send_event(PIN_CHANGE_EVENT, &vec![0, 1]).unwrap().is_none());
    assert_eq!(fsm.current_state(), Some(DOWN));

    let transition = fsm
        .send_event(PIN_CHANGE_EVENT, &vec![1, 0])
        .unwrap()
        .unwrap();
    assert_eq!((transition.from.as_str(), transition.to.as_str()), (DOWN, ACTIVE));
    assert_eq!(*log.lock().unwrap(), vec!["exit down", "enter active"]);

    fsm.send_event("downtime", &vec![]).unwrap();
    assert_eq!(fsm.current_state(), Some(DOWN));
    assert_eq!(fsm.history().len(), 2);
}

#[derive(Clone, Default)]
struct Lamps(Arc<Mutex<Vec<Lamp>>>);

impl LampOutputs for Lamps {
    fn show(&self, lamp: Lamp) {
        self.0.lock().unwrap().push(lamp);
    }
}

#[tokio::test(start_paused = true)]
async fn test_production_shift() {
    let lamps = Lamps::default();
    let controller = LampController::start(lamps.clone(), Duration::from_secs(30)).unwrap();
    let mut updates = controller.subscribe();

    for _ in 0..3 {
        controller.pin_change(0, true);
        updates.changed().await.unwrap();
        controller.pin_change(0, false);
        updates.changed().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
    controller.pin_change(1, true);
    updates.changed().await.unwrap();

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.state, ACTIVE);
    assert_eq!((snapshot.pieces, snapshot.secondary), (3, 1));

    tokio::time::sleep(Duration::from_secs(31)).await;
    updates.changed().await.unwrap();
    assert_eq!(controller.snapshot().state, DOWN);
    assert_eq!(
        *lamps.0.lock().unwrap(),
        vec![Lamp::Red, Lamp::Green, Lamp::Red]
    );

    controller.shutdown().await;
}
