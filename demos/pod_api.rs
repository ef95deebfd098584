use anyhow::Result;
use k8s_fluent::{Client, Config, DynamicObject};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    // Point CLUSTER_URL at your apiserver; `kubectl proxy` works out of the box.
    let cluster_url = std::env::var("CLUSTER_URL").unwrap_or_else(|_| "http://127.0.0.1:8001".into());
    let namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".into());
    let client = Client::try_from(Config::new(cluster_url.parse()?))?;

    let pods = client.kind("Pod")?.in_namespace(&namespace)?;
    for p in pods.list().await? {
        info!("found pod {:?}", p.name());
    }

    info!("applying pod blog");
    let blog: DynamicObject = serde_json::from_value(serde_json::json!({
        "metadata": { "name": "blog" },
        "spec": {
            "containers": [{
                "name": "blog",
                "image": "clux/blog:0.1.0",
            }],
        },
    }))?;
    let applied = pods.apply(&blog, &Default::default()).await?;
    info!("applied {:?} at {:?}", applied.name(), applied.resource_version());

    match pods.get_opt("blog").await? {
        Some(p) => info!("fetched {:?} ({:?})", p.name(), p.uid()),
        None => info!("blog is already gone"),
    }

    pods.delete("blog").await?;
    info!("deleted blog");
    Ok(())
}
