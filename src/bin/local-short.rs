use anyhow::Context;
use local_short::{
    api::{self, ShortenPayload, ShortenedUrl, StatsRow},
    config,
    events::LinkEvent,
    link::LinkRecord,
    service::{MAX_BATCH_INPUTS, ShortenError, shortening_service_capsule},
    validator::ShortenRequest,
};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let container = config::init_container().await;
    let (service, events) =
        container.read((shortening_service_capsule, config::event_sink_capsule));

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read shortening requests from stdin")?;
    let mut payloads: Vec<ShortenPayload> =
        serde_json::from_str(&input).context("Expected a JSON array of shortening requests")?;

    if payloads.len() > MAX_BATCH_INPUTS {
        warn!(
            submitted = payloads.len(),
            "Only {MAX_BATCH_INPUTS} URLs can be shortened at a time; ignoring the rest"
        );
        events.emit(&LinkEvent::MaxUrlInputsReached {
            max: MAX_BATCH_INPUTS,
        });
        payloads.truncate(MAX_BATCH_INPUTS);
    }

    let requests = payloads.into_iter().map(ShortenRequest::from).collect();
    for result in service.shorten_batch(requests).await {
        println!("{}", to_output_line(&result)?);
    }

    for row in service.statistics().await.iter().map(StatsRow::from) {
        info!(
            shortcode = %row.shortcode,
            original_url = %row.original_url,
            shortened_url = %row.shortened_url,
            status = %row.status,
            "Statistics row"
        );
    }
    Ok(())
}

fn to_output_line(result: &Result<LinkRecord, ShortenError>) -> anyhow::Result<String> {
    fn encode(value: &impl Serialize) -> anyhow::Result<String> {
        serde_json::to_string(value).context("Failed to encode result")
    }

    match result {
        Ok(record) => encode(&ShortenedUrl::from(record)),
        Err(err) => encode(&api::Error {
            error: err.to_string(),
        }),
    }
}
