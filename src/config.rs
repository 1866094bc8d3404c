use std::{
    env::{self, VarError},
    fmt::Display,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use rearch::{CData, CapsuleHandle, Container};
use tracing::{info, instrument, warn};

use crate::{
    backend::DEFAULT_ROUND_TRIP_DELAY,
    events::{EventSink, LinkEvent, TracingEventSink},
    link::{BaseUrl, DEFAULT_BASE_URL},
    registry::LinkRegistry,
    store::key_value_store_capsule,
};

const DEFAULT_STORE_PATH: &str = "shortened_urls.json";

/// Builds the container and loads the link registry into it.
#[instrument]
pub async fn init_container() -> Container {
    info!("Initializing container");
    let container = Container::new();

    let (store, events, set_registry) = container.read((
        key_value_store_capsule,
        event_sink_capsule,
        link_registry_init_action,
    ));

    events.emit(&LinkEvent::AppMounted);
    set_registry(Arc::new(LinkRegistry::load(store, events).await));

    info!("Container initialized");
    container
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceOptions {
    pub round_trip_delay: Duration,
    pub recheck_on_commit: bool,
}

pub fn event_sink_capsule(_: CapsuleHandle) -> Arc<dyn EventSink> {
    Arc::new(TracingEventSink)
}

pub fn base_url_capsule(_: CapsuleHandle) -> BaseUrl {
    const ENV_VAR_NAME: &str = "LOCAL_SHORT_BASE_URL";
    env_setting(
        ENV_VAR_NAME,
        env::var(ENV_VAR_NAME),
        DEFAULT_BASE_URL,
        BaseUrl::new,
    )
    .unwrap_or_default()
}

pub fn store_path_capsule(_: CapsuleHandle) -> PathBuf {
    const ENV_VAR_NAME: &str = "LOCAL_SHORT_STORE_PATH";
    env_setting(ENV_VAR_NAME, env::var(ENV_VAR_NAME), DEFAULT_STORE_PATH, |raw| {
        Ok::<_, String>(PathBuf::from(raw))
    })
    .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
}

pub fn service_options_capsule(_: CapsuleHandle) -> ServiceOptions {
    const DELAY_VAR_NAME: &str = "LOCAL_SHORT_DELAY_MS";
    const RECHECK_VAR_NAME: &str = "LOCAL_SHORT_RECHECK_ON_COMMIT";

    let default_delay_ms = DEFAULT_ROUND_TRIP_DELAY.as_millis();
    let round_trip_delay = env_setting(
        DELAY_VAR_NAME,
        env::var(DELAY_VAR_NAME),
        default_delay_ms,
        |raw| raw.parse::<u64>().map(Duration::from_millis),
    )
    .unwrap_or(DEFAULT_ROUND_TRIP_DELAY);

    let recheck_on_commit = env_setting(
        RECHECK_VAR_NAME,
        env::var(RECHECK_VAR_NAME),
        false,
        str::parse::<bool>,
    )
    .unwrap_or(false);

    ServiceOptions {
        round_trip_delay,
        recheck_on_commit,
    }
}

/// Parses an environment lookup, logging and returning [`None`] when the
/// variable is unset or invalid so the caller can apply its default.
fn env_setting<T, E: Display>(
    name: &str,
    lookup: Result<String, VarError>,
    default: impl Display,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Option<T> {
    match lookup {
        Ok(raw) => match parse(raw.trim()) {
            Ok(value) => {
                info!(value = %raw, "{name} environment variable set");
                Some(value)
            }
            Err(err) => {
                warn!(value = %raw, %err, "{name} environment variable is invalid; defaulting to {default}");
                None
            }
        },
        Err(VarError::NotPresent) => {
            info!("{name} environment variable not set; defaulting to {default}");
            None
        }
        Err(VarError::NotUnicode(actual)) => {
            warn!(
                "{name} environment variable is invalid unicode ({}); defaulting to {default}",
                actual.display()
            );
            None
        }
    }
}

fn link_registry_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (
    Option<Arc<LinkRegistry>>,
    impl use<> + CData + Fn(Option<Arc<LinkRegistry>>),
) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn link_registry_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(Arc<LinkRegistry>) {
    let set_registry = get.as_ref(link_registry_manager).1.clone();
    move |registry| set_registry(Some(registry))
}

/// # Panics
/// Panics when the [`LinkRegistry`] was not set via [`link_registry_init_action`].
pub fn link_registry_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> Arc<LinkRegistry> {
    let registry = get.as_ref(link_registry_manager).0.clone();
    registry.expect("LinkRegistry should've been set via link_registry_init_action!")
}
