//! The ingress queue between interrupt handlers and the supervisor.
use crate::devices::supervisor::{IngressEvent, EVENT_QUEUE_SIZE};
use core::{
    cell::RefCell,
    sync::atomic::{AtomicBool, Ordering},
};
use cortex_m::interrupt::{self, Mutex};
use heapless::spsc::{Consumer, Producer, Queue};

type EventProducer = Producer<'static, IngressEvent, EVENT_QUEUE_SIZE>;
pub type EventConsumer = Consumer<'static, IngressEvent, EVENT_QUEUE_SIZE>;

static mut QUEUE: Queue<IngressEvent, EVENT_QUEUE_SIZE> = Queue::new();
static PRODUCER: Mutex<RefCell<Option<EventProducer>>> = Mutex::new(RefCell::new(None));
static SPLIT: AtomicBool = AtomicBool::new(false);

/// Splits the queue, keeping the producer for interrupt handlers. Only
/// the first call yields the consumer.
pub fn take_consumer() -> Option<EventConsumer> {
    if SPLIT.swap(true, Ordering::AcqRel) {
        return None;
    }
    // Safety: guarded by `SPLIT`, so the queue is only borrowed once.
    let (producer, consumer) = unsafe { (*core::ptr::addr_of_mut!(QUEUE)).split() };
    interrupt::free(|cs| *PRODUCER.borrow(cs).borrow_mut() = Some(producer));
    Some(consumer)
}

/// Posts from interrupt context. A full queue drops the event; the next
/// tick samples every line and services every bus anyway.
pub fn post(event: IngressEvent) {
    interrupt::free(|cs| {
        if let Some(producer) = PRODUCER.borrow(cs).borrow_mut().as_mut() {
            let _ = producer.enqueue(event);
        }
    });
}

/// Called by the board support package on any edge of a connector input.
#[no_mangle]
pub extern "C" fn ubm_signal_interrupt() { post(IngressEvent::SignalChange) }
