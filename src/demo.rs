// Demo mode: run a scripted target program under verification
//
// The script plays a small request/response system: a main process spawns a
// server, the server answers two requests and spawns a worker that dies
// before acknowledging. Two properties are instrumented:
// - server responsiveness (satisfied: verdict yes)
// - worker acknowledgement (violated: verdict no)
//
// Run with: vigil demo [--external]

use anyhow::Result;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use vigil::config::Config;
use vigil::storage::{audit_hook, session_id, AuditLog};
use vigil::tracer::registry;
use vigil::{
    start, stop, AnalysisMode, EntryPoint, Env, Event, Mon, Pid, PredicateMap, SimSource,
};

/// A server must come up, accept a request and answer it.
fn server_monitor() -> Mon {
    Mon::act(
        Env::new().with_var("up").with_label("server up"),
        |e| matches!(e, Event::Spawned { .. }),
        |_| {
            Mon::act(
                Env::new().with_var("req"),
                |e| matches!(e, Event::Receive { .. }),
                |_| {
                    Mon::act(
                        Env::new().with_var("resp"),
                        |e| matches!(e, Event::Send { .. }),
                        |_| Mon::yes(),
                    )
                },
            )
        },
    )
}

/// A worker's first action after coming up must be an acknowledgement.
fn worker_monitor() -> Mon {
    Mon::act(
        Env::new().with_var("up").with_label("worker up"),
        |e| matches!(e, Event::Spawned { .. }),
        |_| {
            Mon::chs(
                Env::new(),
                Mon::act(
                    Env::new().with_var("ack"),
                    |e| matches!(e, Event::Send { .. }),
                    |_| Mon::yes(),
                ),
                Mon::act(
                    Env::new().with_var("offense"),
                    |e| !matches!(e, Event::Send { .. }),
                    |_| Mon::no(),
                ),
            )
        },
    )
}

/// The script: (delay before emitting, event).
fn script() -> Vec<(u64, Event)> {
    let main = Pid(1);
    let server = Pid(2);
    let worker = Pid(3);
    let server_entry = EntryPoint::new("server", "loop", 1);
    let worker_entry = EntryPoint::new("worker", "run", 0);

    vec![
        (0, Event::Spawn { src: main, child: server, entry: server_entry.clone() }),
        (20, Event::Spawned { src: server, parent: main, entry: server_entry }),
        (20, Event::Receive { src: server, msg: json!({"req": 1}) }),
        (10, Event::Send { src: server, to: main, msg: json!({"resp": 1}) }),
        (20, Event::Spawn { src: server, child: worker, entry: worker_entry.clone() }),
        (20, Event::Spawned { src: worker, parent: server, entry: worker_entry }),
        (10, Event::Exit { src: worker, reason: "crash".into() }),
        (20, Event::Receive { src: server, msg: json!({"req": 2}) }),
        (10, Event::Send { src: server, to: main, msg: json!({"resp": 2}) }),
        (20, Event::Exit { src: server, reason: "normal".into() }),
        (20, Event::Exit { src: main, reason: "normal".into() }),
    ]
}

/// Drive the scripted target and report what the monitors concluded.
pub async fn run_demo(config: Config, analysis: AnalysisMode) -> Result<()> {
    let source = SimSource::new();
    let predicate = PredicateMap::new()
        .register("server", "loop", server_monitor)
        .register("worker", "run", worker_monitor)
        .into_predicate();

    // verdict reports fan out to the audit task (if enabled)
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let audit_handle = if config.audit {
        let audit = AuditLog::new(config.log_dir.clone(), session_id(), report_rx)?;
        let path = audit.log_file_path();
        tracing::info!("writing verdict reports to {}", path.display());
        Some(tokio::spawn(audit.run()))
    } else {
        drop(report_rx);
        None
    };

    let mut root = start(
        Pid(1),
        predicate,
        analysis,
        source.clone(),
        Some(audit_hook(report_tx)),
    );

    for (delay_ms, event) in script() {
        sleep(Duration::from_millis(delay_ms)).await;
        tracing::debug!(%event, "target step");
        source.emit(event);
    }

    let down = tokio::time::timeout(Duration::from_secs(10), root.down.recv())
        .await
        .map_err(|_| anyhow::anyhow!("root tracer did not terminate"))?
        .ok_or_else(|| anyhow::anyhow!("root tracer dropped its down channel"))?;

    println!("target program finished");
    println!("root tracer {}: {}", down.tracer, down.stats);
    for snapshot in registry::all() {
        tracing::warn!(tracer = %snapshot.id, "tracer still live after target exit");
    }
    stop();

    // all hooks are gone once the tracers are; the audit task drains and exits
    if let Some(handle) = audit_handle {
        if let Err(e) = handle.await? {
            tracing::error!("audit log error: {e:#}");
        }
    }
    Ok(())
}
