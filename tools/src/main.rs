//! segment-runner: headless runner for the customer analytics pipeline.
//!
//! Usage:
//!   segment-runner --source-dir ./data/relations --db cache.db
//!   segment-runner --seed 12345 --customers 500
//!   segment-runner --source-dir ./data/relations --ipc-mode

use anyhow::Result;
use segment_core::{
    config::AnalyticsConfig,
    error::AnalyticsResult,
    orchestrator::RunHandle,
    segmentation::{AbcClass, ChurnRisk},
    service::AnalyticsService,
    source::{JsonDirSource, RecordSource},
    store::{KeyValueStore, SqliteKv},
    synthetic::{SyntheticShape, SyntheticSource},
    types::ArtifactKind,
    worker::ThreadExecutor,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Ping,
    GetSegments,
    GetSegmentsMeta,
    GetCohort,
    GetTimeline,
    Reload { kind: ArtifactKind },
    Status { task_id: String },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let customers = parse_arg(&args, "--customers", 200usize);
    let timeout_secs = parse_arg(&args, "--timeout-secs", 300u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let source_dir = string_arg(&args, "--source-dir");

    if !ipc_mode {
        println!("segment-runner");
        println!("  source:    {}", source_dir.unwrap_or("synthetic"));
        if source_dir.is_none() {
            println!("  seed:      {seed}");
            println!("  customers: {customers}");
        }
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = AnalyticsConfig::load(data_dir)?;

    let kv = if db == ":memory:" { SqliteKv::in_memory()? } else { SqliteKv::open(db)? };
    kv.migrate()?;
    let kv: Arc<dyn KeyValueStore> = Arc::new(kv);

    let source: Arc<dyn RecordSource> = match source_dir {
        Some(dir) => Arc::new(JsonDirSource::new(dir)),
        None => Arc::new(SyntheticSource::new(
            seed,
            SyntheticShape { customers, ..SyntheticShape::default() },
        )),
    };

    let service = AnalyticsService::build(source, kv, config, Arc::new(ThreadExecutor::new()))?;
    let handles = service.startup();

    if ipc_mode {
        run_ipc_loop(&service)?;
    } else {
        let timeout = Duration::from_secs(timeout_secs);
        for handle in &handles {
            service.wait(&handle.task_id, Some(timeout));
        }
        print_summary(&service, &handles)?;
    }

    Ok(())
}

fn run_ipc_loop(service: &AnalyticsService) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let response = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Ping => serde_json::json!({ "status": service.ping() }),
            IpcCommand::GetSegments => render(service.segments())?,
            IpcCommand::GetSegmentsMeta => render(
                service
                    .segments_updated_at()
                    .map(|ts| serde_json::json!({ "updated_at": ts })),
            )?,
            IpcCommand::GetCohort => render(service.cohort())?,
            IpcCommand::GetTimeline => render(service.timeline())?,
            IpcCommand::Reload { kind } => {
                let handle = service.trigger_recompute(kind);
                serde_json::json!({
                    "status": "recompute started",
                    "task_id": handle.task_id,
                    "kind": handle.kind,
                    "run_seq": handle.run_seq,
                })
            }
            IpcCommand::Status { task_id } => match service.poll(&task_id) {
                Some(status) => serde_json::json!({ "task_id": task_id, "status": status }),
                None => serde_json::json!({ "task_id": task_id, "error": "unknown task" }),
            },
        };
        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
    }
    Ok(())
}

/// A cache miss is an answer, not a failure of the runner.
fn render<T: serde::Serialize>(result: AnalyticsResult<T>) -> Result<serde_json::Value> {
    Ok(match result {
        Ok(value) => serde_json::to_value(value)?,
        Err(e) if e.is_not_computed() => {
            serde_json::json!({ "error": e.to_string(), "not_computed": true })
        }
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    })
}

fn print_summary(service: &AnalyticsService, handles: &[RunHandle]) -> Result<()> {
    println!("=== RUN SUMMARY ===");
    for handle in handles {
        let status = service
            .poll(&handle.task_id)
            .map(|s| match s.detail() {
                Some(detail) => format!("failed: {detail}"),
                None => format!("{s:?}").to_lowercase(),
            })
            .unwrap_or_else(|| "unknown".to_string());
        println!("  run {:>2} {:<9} {status}", handle.run_seq, handle.kind.name());
    }

    println!();
    println!("=== SEGMENTS ===");
    match service.segments() {
        Ok(latest) => {
            let records = &latest.payload;
            println!("  updated_at:     {}", latest.updated_at.to_rfc3339());
            println!("  customers:      {}", records.len());
            for risk in ChurnRisk::ALL {
                let n = records.iter().filter(|r| r.churn_risk == risk).count();
                println!("  {:<15} {n}", format!("{}:", risk.label()));
            }
            for class in [AbcClass::A, AbcClass::B, AbcClass::C] {
                let n = records.iter().filter(|r| r.abc_class == class).count();
                println!("  {:<15} {n}", format!("class {class}:"));
            }
        }
        Err(e) => println!("  ({e})"),
    }

    println!();
    println!("=== COHORTS ===");
    match service.cohort() {
        Ok(latest) => {
            let cohort = &latest.payload;
            println!("  cohorts:        {}", cohort.cohort_data.index.len());
            println!("  max index:      {}", cohort.cohort_data.columns.last().map_or("-", String::as_str));
            println!("  states:         {}", cohort.state_list.join(", "));
        }
        Err(e) => println!("  ({e})"),
    }

    println!();
    println!("=== TIMELINE ===");
    match service.timeline() {
        Ok(latest) => {
            let timeline = &latest.payload;
            let recent: Vec<_> = timeline.by_churn.iter().rev().take(6).collect();
            for row in recent.iter().rev() {
                println!(
                    "  {} | {:<11} | {} orders",
                    row.order_purchase_timestamp,
                    row.churn_risk.label(),
                    row.count
                );
            }
        }
        Err(e) => println!("  ({e})"),
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
