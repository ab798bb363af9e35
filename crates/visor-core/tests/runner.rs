use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use visor_core::{
    Network, RegistryError, RunnerClient, RunnerEvent, RunnerStatus, Store, TcpNetwork,
};

fn store() -> Store {
    Store::dial("mem:", "/visor").unwrap().init().unwrap()
}

#[test]
fn test_runner_register_and_get() {
    let s = store();
    s.new_runner("box-1:9000", 42).unwrap().register().unwrap();
    let runner = s.get_runner("box-1:9000").unwrap();
    assert_eq!(runner.addr, "box-1:9000");
    assert_eq!(runner.instance_id, 42);
}

#[test]
fn test_runner_rejects_bad_addresses() {
    let s = store();
    for addr in ["box-1", ":9000", "box-1:port", "box-1:70000"] {
        let err = s.new_runner(addr, 1).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)), "{addr}: {err:?}");
    }
}

#[test]
fn test_runner_unregister() {
    let s = store();
    let runner = s.new_runner("box-1:9000", 1).unwrap().register().unwrap();
    runner.unregister().unwrap();
    assert!(s.get_runner("box-1:9000").unwrap_err().is_not_found());
}

#[test]
fn test_runners_by_host() {
    let s = store();
    s.new_runner("box-1:9000", 1).unwrap().register().unwrap();
    s.new_runner("box-1:9001", 2).unwrap().register().unwrap();
    s.new_runner("box-2:9000", 3).unwrap().register().unwrap();

    let box1: Vec<i64> = s
        .runners_by_host("box-1")
        .unwrap()
        .iter()
        .map(|r| r.instance_id)
        .collect();
    assert_eq!(box1, vec![1, 2]);
    assert_eq!(s.get_runners().unwrap().len(), 3);
    assert!(s.runners_by_host("box-3").unwrap().is_empty());
}

#[test]
fn test_watch_runner_start_and_stop() {
    let s = store();
    let starts = s.watch_runner_start("box-1").timeout(Duration::from_millis(200));
    let stops = s.watch_runner_stop("box-1").timeout(Duration::from_millis(200));

    let runner = s.new_runner("box-1:9000", 7).unwrap().register().unwrap();
    s.new_runner("box-2:9000", 8).unwrap().register().unwrap();
    runner.unregister().unwrap();

    let started: Vec<(String, i64)> = starts
        .map(|e| match e.unwrap() {
            RunnerEvent::Started(r) => (r.addr, r.instance_id),
            RunnerEvent::Stopped(addr) => panic!("unexpected stop of {addr}"),
        })
        .collect();
    assert_eq!(started, vec![("box-1:9000".to_string(), 7)]);

    let stopped: Vec<String> = stops
        .map(|e| match e.unwrap() {
            RunnerEvent::Stopped(addr) => addr,
            RunnerEvent::Started(r) => panic!("unexpected start of {r}"),
        })
        .collect();
    assert_eq!(stopped, vec!["box-1:9000"]);
}

/// A runner control port answering the given replies in order after `raw`.
fn fake_runner(replies: &'static [&'static str]) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut seen = Vec::new();
        let mut replies = std::iter::once("OK").chain(replies.iter().copied());
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let cmd = line.trim().to_string();
            seen.push(cmd.clone());
            if cmd == "kill" {
                break;
            }
            if let Some(reply) = replies.next() {
                writeln!(writer, "{reply}").unwrap();
            }
        }
        seen
    });
    (addr, handle)
}

#[test]
fn test_client_pid_and_status() {
    let (addr, server) = fake_runner(&["4242", "up 6 0", "OK"]);
    let mut client = RunnerClient::new(&addr, TcpNetwork);
    client.connect().unwrap();

    assert_eq!(client.pid().unwrap(), 4242);
    assert_eq!(
        client.status().unwrap(),
        RunnerStatus {
            up: true,
            service_restarts: 6,
            log_restarts: 0,
        }
    );
    client.down().unwrap();
    client.kill().unwrap();

    assert_eq!(server.join().unwrap(), vec!["raw", "pid", "status", "down", "kill"]);
}

#[test]
fn test_client_rejects_bad_replies() {
    let (addr, server) = fake_runner(&["not-a-pid", "sideways 1 2", "FAIL"]);
    let mut client = RunnerClient::new(&addr, TcpNetwork);
    client.connect().unwrap();

    assert!(matches!(client.pid().unwrap_err(), RegistryError::Runner { .. }));
    assert!(matches!(client.status().unwrap_err(), RegistryError::Runner { .. }));
    assert!(matches!(client.down().unwrap_err(), RegistryError::Runner { .. }));
    client.disconnect();
    server.join().unwrap();
}

#[test]
fn test_client_commands_need_connection() {
    let mut client = RunnerClient::new("127.0.0.1:1", TcpNetwork);
    assert!(matches!(client.pid().unwrap_err(), RegistryError::Runner { .. }));
}

struct Unreachable(Arc<AtomicUsize>);

impl Network for Unreachable {
    type Stream = std::net::TcpStream;

    fn dial(&self, _addr: &str) -> io::Result<Self::Stream> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
    }
}

#[test]
fn test_client_retries_dial_three_times() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut client = RunnerClient::new("box-1:9000", Unreachable(Arc::clone(&attempts)));
    let err = client.connect().unwrap_err();
    assert!(matches!(err, RegistryError::Runner { .. }), "got {err:?}");
    assert!(err.to_string().contains("refused"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}
