use anyhow::Result;
use k8s_fluent::{Client, Config, Lifecycle, WatchConfig, Watcher};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cluster_url = std::env::var("CLUSTER_URL").unwrap_or_else(|_| "http://127.0.0.1:8001".into());
    let namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".into());
    let client = Client::try_from(Config::new(cluster_url.parse()?))?;

    let pods = client.kind("Pod")?.in_namespace(&namespace)?;
    let mut watcher = Watcher::new(&pods, WatchConfig::default(), |obj, phase| async move {
        info!("{:?}: {:?}", phase, obj.name());
        Ok(())
    })?;
    info!("watch identity: {}", watcher.cache_id());

    let mut events = watcher.events();
    watcher.start()?;
    loop {
        match events.recv().await {
            Ok(Lifecycle::NetworkError { message }) => warn!("stream broke: {message}"),
            Ok(Lifecycle::GiveUp { message }) => {
                warn!("giving up: {message}");
                break;
            }
            Ok(Lifecycle::Abort) => break,
            Ok(event) => info!("{event:?}"),
            Err(async_broadcast::RecvError::Overflowed(missed)) => {
                warn!("missed {missed} lifecycle events");
            }
            Err(_) => break,
        }
    }
    Ok(())
}
