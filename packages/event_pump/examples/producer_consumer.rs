//! Two producer threads feeding one consumer through a single queue, with bounded waits
//! and source-scoped eviction.

use std::thread;
use std::time::Duration;

use event_pump::{EventQueue, EventSource, WaitTimedOut};

fn main() {
    let queue = EventQueue::new();

    let sensor = EventSource::new();
    let ticker = EventSource::new();
    queue.register_source(&sensor);
    queue.register_source(&ticker);

    let sensor_producer = {
        let sensor = sensor.clone();
        thread::spawn(move || {
            for reading in [1.25, 2.5, 3.75] {
                sensor.emit(("sensor", reading));
                thread::sleep(Duration::from_millis(10));
            }
        })
    };

    let ticker_producer = {
        let ticker = ticker.clone();
        thread::spawn(move || {
            for tick in 0_u32..3 {
                ticker.emit(("tick", f64::from(tick)));
                thread::sleep(Duration::from_millis(15));
            }
        })
    };

    let mut received = 0;
    while received < 6 {
        match queue.wait_for_event_timed(Duration::from_secs(1)) {
            Ok(event) => {
                let (kind, value) = *event.payload();
                println!("{kind}: {value}");
                received += 1;
            }
            Err(WaitTimedOut) => {
                println!("no event arrived within a second, giving up");
                break;
            }
        }
    }

    sensor_producer.join().unwrap();
    ticker_producer.join().unwrap();

    // The ticker is no longer interesting; removing it also discards anything it still
    // has buffered, while sensor events are unaffected.
    queue.unregister_source(&ticker);
    ticker.emit(("tick", 99.0));

    println!("events left after evicting the ticker: {}", queue.len());
}
