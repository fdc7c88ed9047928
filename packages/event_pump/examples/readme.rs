//! The quick-start example from the crate documentation.

use std::thread;

use event_pump::{EventQueue, EventSource};

fn main() {
    let queue = EventQueue::new();
    let source = EventSource::new();
    queue.register_source(&source);

    let producer = thread::spawn(move || {
        for step in 0..3 {
            source.emit(step);
        }
    });

    for expected in 0..3 {
        let event = queue.wait_for_event();
        assert_eq!(*event.payload(), expected);
        println!("received {}", event.payload());
    }

    producer.join().unwrap();
}
