//! Demo of an upstream service handing its trace to a downstream service and
//! merging the result back.

use serde::Serialize;
use stagetrace::{TraceWriter, Tracer, WriterConfig, record_value, with_tracer};
use tracing_subscriber::EnvFilter;

// Domain-specific trace data
#[derive(Serialize)]
struct RouteDecision {
    handler: String,
    cached: bool,
}

#[derive(Serialize)]
struct QueryStats {
    table: String,
    rows: u64,
    elapsed_ms: u64,
}

async fn upstream_request() -> &'static str {
    record_value("parse", "method", "GET");
    record_value("parse", "path", "/orders/42");
    record_value(
        "route",
        "decision",
        serde_json::to_value(RouteDecision {
            handler: "orders::show".to_string(),
            cached: false,
        })
        .unwrap_or_default(),
    );
    record_value("parse", "ok", true);
    "dispatched"
}

/// Pretend to be another process: decode, extend, encode.
fn downstream_service(incoming: &[u8]) -> Result<Vec<u8>, stagetrace::TraceError> {
    let tracer = Tracer::deserialize(incoming)?;
    tracer.record_serialized(
        "query",
        "stats",
        &QueryStats {
            table: "orders".to_string(),
            rows: 1,
            elapsed_ms: 3,
        },
    )?;
    tracer.record_value("route", "served_by", "orders-db-replica");
    tracer.serialize()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (result, tracer) = with_tracer(upstream_request()).await;
    println!("Request result: {}", result);

    let returned = downstream_service(&tracer.serialize()?)?;
    tracer.merge_bytes(&returned)?;

    println!("Stages: {:?}", tracer.stage_names());
    println!("\n--- Merged Trace JSON ---");
    println!("{}", String::from_utf8(tracer.serialize_pretty()?)?);

    let writer = TraceWriter::new(WriterConfig::default())?;
    writer.write(&tracer)?;
    println!(
        "\n--- Trace written to {} ---",
        writer.current_file_path().display()
    );

    Ok(())
}
