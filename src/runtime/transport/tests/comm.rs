//! Comm wrapper tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::runtime::transport::{Comm, LocalCluster, TransportError};

const POLL: Duration = Duration::from_millis(1);

#[test]
fn test_thread_safe_comm_passes_through() {
    let cluster = LocalCluster::new(2);
    let c0 = Comm::new(cluster.transport(0), POLL);
    let c1 = Comm::new(cluster.transport(1), POLL);
    assert!(c0.thread_safe());
    assert_eq!(c1.node_id(), 1);
    assert_eq!(c1.num_nodes(), 2);

    c0.send(1, 3, vec![7, 7]).unwrap();
    let packet = c1.recv(Some(0), 3, &|| false).unwrap();
    assert_eq!(packet.bytes, vec![7, 7]);
}

#[test]
fn test_polling_recv_does_not_hold_the_lock() {
    let cluster = LocalCluster::thread_unsafe(1);
    let comm = Arc::new(Comm::new(cluster.transport(0), POLL));
    assert!(!comm.thread_safe());

    let receiver = {
        let comm = comm.clone();
        thread::spawn(move || comm.recv(None, 4, &|| false).map(|p| p.bytes))
    };
    thread::sleep(Duration::from_millis(10));
    // would deadlock if the receiver kept the lock while waiting
    comm.send(0, 4, vec![1]).unwrap();
    assert_eq!(receiver.join().unwrap().unwrap(), vec![1]);
}

#[test]
fn test_polling_recv_is_interrupted() {
    let cluster = LocalCluster::thread_unsafe(1);
    let comm = Arc::new(Comm::new(cluster.transport(0), POLL));
    let stop = Arc::new(AtomicBool::new(false));

    let receiver = {
        let comm = comm.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let interrupted = || stop.load(Ordering::SeqCst);
            comm.recv(None, 4, &interrupted)
        })
    };
    thread::sleep(Duration::from_millis(10));
    stop.store(true, Ordering::SeqCst);
    let err = receiver.join().unwrap().unwrap_err();
    assert!(matches!(err, TransportError::Interrupted));
}
