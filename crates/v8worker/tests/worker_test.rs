use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use v8worker::{
    FnRouter, HandlerKind, LoadStatus, SendStatus, Worker, WorkerConfig, WorkerError,
};

type Inbox = Arc<Mutex<Vec<String>>>;

/// A worker whose `$send` messages land in the returned inbox and whose
/// `$sendSync` requests are answered with "pong".
fn collecting_worker() -> (Worker, Inbox) {
    let inbox: Inbox = Arc::default();
    let router = FnRouter::new(
        |msg: &str, inbox: &Inbox| inbox.lock().unwrap().push(msg.to_string()),
        |_: &str, _: &Inbox| "pong".to_string(),
        inbox.clone(),
    );
    (Worker::new(router).unwrap(), inbox)
}

fn received(inbox: &Inbox) -> Vec<String> {
    inbox.lock().unwrap().clone()
}

#[test]
fn test_version_is_reported() {
    assert!(!v8worker::version().is_empty());
}

#[test]
fn test_compile_error_names_script_and_line() {
    let (worker, _) = collecting_worker();

    let result = worker.load("bad.js", "var ok = 1;\nvar x = ;");
    assert!(matches!(result, Err(WorkerError::Compile(_))));

    let diagnostic = worker.last_exception();
    assert!(diagnostic.contains("bad.js:2"), "{diagnostic}");
    assert!(diagnostic.contains("SyntaxError"), "{diagnostic}");
}

#[test]
fn test_load_status_codes() {
    let (worker, _) = collecting_worker();

    assert_eq!(worker.load_status("a.js", "1 + 1"), LoadStatus::Ok);
    assert_eq!(worker.load_status("b.js", "}{"), LoadStatus::CompileError);
    assert_eq!(worker.load_status("c.js", "null.x"), LoadStatus::RuntimeError);
}

#[test]
fn test_runtime_error_shows_source_line() {
    let (worker, _) = collecting_worker();

    let result = worker.load("throw.js", "var a = 1;\nthrow new Error('boom');");
    assert!(matches!(result, Err(WorkerError::Runtime(_))));

    let diagnostic = worker.last_exception();
    assert!(diagnostic.contains("throw new Error('boom');"), "{diagnostic}");
    assert!(diagnostic.contains("boom"), "{diagnostic}");
}

#[test]
fn test_last_exception_survives_success() {
    let (worker, _) = collecting_worker();
    assert_eq!(worker.last_exception(), "");

    assert!(worker.load("throw.js", "throw new Error('first');").is_err());
    worker.load("ok.js", "1").unwrap();

    assert!(worker.last_exception().contains("first"));
}

#[test]
fn test_send_roundtrip() {
    let (worker, inbox) = collecting_worker();

    worker
        .load("echo.js", "$recv(function (msg) { $send(msg); });")
        .unwrap();
    worker.send("ping").unwrap();

    assert_eq!(received(&inbox), vec!["ping".to_string()]);
}

#[test]
fn test_send_without_handler() {
    let (worker, _) = collecting_worker();
    worker.load("empty.js", "var x = 1;").unwrap();

    for _ in 0..3 {
        let result = worker.send("hello");
        assert!(matches!(result, Err(WorkerError::NoHandler(HandlerKind::Message))));
    }
    assert!(worker.last_exception().contains("handler not registered"));
    assert_eq!(worker.send_status("hello"), SendStatus::NoHandler);

    worker.load("late.js", "$recv(function () {});").unwrap();
    assert_eq!(worker.send_status("hello"), SendStatus::Ok);
}

#[test]
fn test_exception_in_handler() {
    let (worker, _) = collecting_worker();
    worker
        .load("h.js", "$recv(function (msg) { throw new Error('bad ' + msg); });")
        .unwrap();

    assert_eq!(worker.send_status("input"), SendStatus::RuntimeError);
    assert!(worker.last_exception().contains("bad input"));
}

#[test]
fn test_send_sync_roundtrip() {
    let (worker, _) = collecting_worker();
    worker
        .load("upper.js", "$recvSync(function (msg) { return msg.toUpperCase(); });")
        .unwrap();

    assert_eq!(worker.send_sync("abc").unwrap(), "ABC");
    assert_eq!(worker.send_sync_compat("xyz"), "XYZ");
}

#[test]
fn test_script_send_sync_gets_host_reply() {
    let (worker, inbox) = collecting_worker();

    worker
        .load("ask.js", "var reply = $sendSync('ping'); $send(reply);")
        .unwrap();

    assert_eq!(received(&inbox), vec!["pong".to_string()]);
}

#[test]
fn test_send_sync_non_string_reply() {
    let (worker, _) = collecting_worker();
    worker.load("num.js", "$recvSync(function () { return 42; });").unwrap();

    let result = worker.send_sync("x");
    assert!(matches!(result, Err(WorkerError::ProtocolViolation(_))));
    assert_eq!(worker.send_sync_compat("x"), "err: non-string return value");
}

#[test]
fn test_send_sync_without_handler() {
    let (worker, _) = collecting_worker();

    let result = worker.send_sync("x");
    assert!(matches!(result, Err(WorkerError::NoHandler(HandlerKind::Request))));
    assert_eq!(worker.send_sync_compat("x"), "err: $recvSync not called");
}

#[test]
fn test_send_sync_handler_throws() {
    let (worker, _) = collecting_worker();
    worker
        .load("t.js", "$recvSync(function () { throw new Error('nope'); });")
        .unwrap();

    assert!(matches!(worker.send_sync("x"), Err(WorkerError::Runtime(_))));
    assert!(worker.send_sync_compat("x").starts_with(v8worker::SENTINEL_PREFIX));
}

#[test]
fn test_loads_share_global_context() {
    let (worker, inbox) = collecting_worker();

    worker.load("first.js", "var counter = 41;").unwrap();
    worker.load("second.js", "counter++; $send(String(counter));").unwrap();

    assert_eq!(received(&inbox), vec!["42".to_string()]);
}

#[test]
fn test_send_rejects_non_string() {
    let (worker, inbox) = collecting_worker();

    let result = worker.load("bad_send.js", "$send(42);");
    assert!(matches!(result, Err(WorkerError::Runtime(_))));
    assert!(worker.last_exception().contains("TypeMismatch"));

    worker
        .load(
            "caught.js",
            "try { $recv('not a function'); } catch (e) { $send(e.name + ': ' + e.message); }",
        )
        .unwrap();
    let messages = received(&inbox);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("TypeError: TypeMismatch: $recv"), "{}", messages[0]);
}

#[test]
fn test_handler_replacement() {
    let (worker, inbox) = collecting_worker();

    worker
        .load("one.js", "$recv(function (m) { $send('one:' + m); });")
        .unwrap();
    worker
        .load("two.js", "$recv(function (m) { $send('two:' + m); });")
        .unwrap();
    worker.send("x").unwrap();

    assert_eq!(received(&inbox), vec!["two:x".to_string()]);
}

#[test]
fn test_typed_arrays() {
    let (worker, inbox) = collecting_worker();

    worker
        .load(
            "bytes.js",
            "var a = new Uint8Array(256); a[255] = 7; $send(a.length + ',' + a[255]);",
        )
        .unwrap();

    assert_eq!(received(&inbox), vec!["256,7".to_string()]);
}

#[test]
fn test_promise_jobs_run_before_return() {
    let (worker, inbox) = collecting_worker();

    worker
        .load("p.js", "Promise.resolve('later').then(function (v) { $send(v); });")
        .unwrap();

    assert_eq!(received(&inbox), vec!["later".to_string()]);
}

#[test]
fn test_dispose() {
    let (worker, _) = collecting_worker();
    worker.load("a.js", "$recv(function () {});").unwrap();

    worker.dispose().unwrap();
    assert!(worker.is_disposed());

    assert!(matches!(worker.send("x"), Err(WorkerError::Disposed)));
    assert!(matches!(worker.load("b.js", "1"), Err(WorkerError::Disposed)));
    assert!(matches!(worker.dispose(), Err(WorkerError::Disposed)));
}

#[test]
fn test_execution_timeout() {
    let config = WorkerConfig::default()
        .with_name("looper")
        .with_execution_timeout(Duration::from_millis(200));
    let worker = Worker::with_config(config, FnRouter::discard(())).unwrap();

    let result = worker.load("spin.js", "while (true) {}");
    assert!(matches!(result, Err(WorkerError::Timeout(_))));

    // The worker is still usable afterwards.
    worker.load("after.js", "var fine = true;").unwrap();
}

#[test]
fn test_terminate_from_another_thread() {
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let router = FnRouter::new(
        move |_: &str, _: &()| {
            let _ = started_tx.lock().unwrap().send(());
        },
        v8worker::discard_request,
        (),
    );
    let worker = Arc::new(Worker::new(router).unwrap());

    let killer = {
        let worker = worker.clone();
        thread::spawn(move || {
            started_rx.recv().unwrap();
            thread::sleep(Duration::from_millis(50));
            worker.terminate_execution();
        })
    };

    let result = worker.load("spin.js", "$send('started'); while (true) {}");
    killer.join().unwrap();

    assert!(matches!(result, Err(WorkerError::Terminated)));
    worker.load("after.js", "1").unwrap();
}

#[test]
fn test_reentrant_call_is_rejected() {
    let slot: Arc<OnceLock<Weak<Worker>>> = Arc::default();
    let errors: Arc<Mutex<Vec<String>>> = Arc::default();

    let router = FnRouter::new(
        |msg: &str, (slot, errors): &(Arc<OnceLock<Weak<Worker>>>, Arc<Mutex<Vec<String>>>)| {
            if let Some(worker) = slot.get().and_then(Weak::upgrade) {
                if let Err(e) = worker.send(msg) {
                    errors.lock().unwrap().push(e.to_string());
                }
            }
        },
        v8worker::discard_request,
        (slot.clone(), errors.clone()),
    );
    let worker = Arc::new(Worker::new(router).unwrap());
    let _ = slot.set(Arc::downgrade(&worker));

    worker.load("loop.js", "$send('again');").unwrap();

    let errors = errors.lock().unwrap().clone();
    assert_eq!(errors, vec![WorkerError::Reentrant.to_string()]);
}

#[test]
fn test_workers_are_isolated() {
    let (first, first_inbox) = collecting_worker();
    let (second, second_inbox) = collecting_worker();

    first.load("set.js", "var shared = 'first';").unwrap();
    second.load("get.js", "$send(typeof shared);").unwrap();
    first.load("get.js", "$send(typeof shared);").unwrap();

    assert_eq!(received(&second_inbox), vec!["undefined".to_string()]);
    assert_eq!(received(&first_inbox), vec!["string".to_string()]);
}

#[test]
fn test_workers_on_many_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let (worker, inbox) = collecting_worker();
                worker
                    .load("id.js", &format!("$recv(function (m) {{ $send(m + ':{i}'); }});"))
                    .unwrap();
                worker.send("hi").unwrap();
                worker.dispose().unwrap();
                received(&inbox)
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), vec![format!("hi:{i}")]);
    }
}

#[test]
fn test_shared_worker_serializes_calls() {
    let (worker, inbox) = collecting_worker();
    worker
        .load("count.js", "var n = 0; $recv(function () { n++; $send(String(n)); });")
        .unwrap();
    let worker = Arc::new(worker);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let worker = worker.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    worker.send("tick").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected: Vec<String> = (1..=100).map(|n| n.to_string()).collect();
    assert_eq!(received(&inbox), expected);
}

#[test]
fn test_create_dispose_loop() {
    for i in 0..20 {
        let config = WorkerConfig::default().with_name(format!("churn-{i}"));
        let worker = Worker::with_config(config, FnRouter::discard(())).unwrap();
        worker.load("x.js", "var big = new Array(1000).fill(0);").unwrap();
        worker.dispose().unwrap();
    }
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = WorkerConfig::default().with_heap_limits(Some(64 << 20), 32 << 20);
    let result = Worker::with_config(config, FnRouter::discard(()));
    assert!(matches!(result, Err(WorkerError::InvalidConfig(_))));
}

#[test]
fn test_host_data_is_passed_back() {
    let router = FnRouter::new(
        |_: &str, _: &String| {},
        |msg: &str, prefix: &String| format!("{prefix}{msg}"),
        "host:".to_string(),
    );
    let worker = Worker::new(router).unwrap();

    worker
        .load("relay.js", "$recvSync(function (m) { return $sendSync(m); });")
        .unwrap();
    assert_eq!(worker.send_sync("42").unwrap(), "host:42");
}

#[test]
fn test_failed_load_does_not_leak_promise_work() {
    let (worker, inbox) = collecting_worker();

    let result = worker.load(
        "a.js",
        "Promise.reject(new Error('stale'));\n\
         Promise.resolve().then(function () { $send('late'); });\n\
         throw new Error('x');",
    );
    assert!(matches!(result, Err(WorkerError::Runtime(_))));
    assert!(worker.last_exception().contains("Error: x"));
    assert_eq!(received(&inbox), vec!["late".to_string()]);

    worker.load("b.js", "var fine = 1;").unwrap();
    worker.load("c.js", "$recv(function () {});").unwrap();
    worker.send("x").unwrap();

    assert!(worker.last_exception().contains("Error: x"));
    assert_eq!(received(&inbox), vec!["late".to_string()]);
}

#[test]
fn test_unhandled_rejection_fails_its_own_load() {
    let (worker, _) = collecting_worker();

    let result = worker.load("reject.js", "var a = 1;\nPromise.reject(new Error('nobody caught'));");
    assert!(matches!(result, Err(WorkerError::Runtime(_))));
    assert!(worker.last_exception().contains("nobody caught"));

    worker.load("next.js", "var fine = 1;").unwrap();
}

#[test]
fn test_sync_handler_replacement() {
    let (worker, _) = collecting_worker();

    worker
        .load("one.js", "$recvSync(function (m) { return 'one:' + m; });")
        .unwrap();
    worker
        .load("two.js", "$recvSync(function (m) { return 'two:' + m; });")
        .unwrap();

    assert_eq!(worker.send_sync("x").unwrap(), "two:x");
}

#[test]
fn test_calls_racing_dispose_report_disposed() {
    let (worker, _) = collecting_worker();
    worker.load("h.js", "$recv(function () {});").unwrap();
    let worker = Arc::new(worker);

    let senders: Vec<_> = (0..4)
        .map(|_| {
            let worker = worker.clone();
            thread::spawn(move || {
                let mut errors = Vec::new();
                for _ in 0..200 {
                    if let Err(e) = worker.send("tick") {
                        errors.push(e.to_string());
                    }
                }
                errors
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(5));
    worker.dispose().unwrap();

    for sender in senders {
        for error in sender.join().unwrap() {
            assert_eq!(error, WorkerError::Disposed.to_string());
        }
    }
}
