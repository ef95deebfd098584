//! Watches a Kubernetes resource for changes, with error recovery.
//!
//! The engine runs as a single task per watcher: every suspension point
//! (list page, watch GET, stream read, handler invocation, backoff sleep)
//! lives on one cooperative loop, so cache mutation needs no locking and a
//! slow handler naturally backpressures event processing.

use std::{collections::HashMap, future::Future, time::Duration};

use futures::{FutureExt, StreamExt, TryStreamExt};
use k8s_fluent_client::{Client, K8s};
use k8s_fluent_core::{
    object::{DynamicObject, ObjectList},
    params::ListParams,
    request::Request,
    watch::WatchEvent,
};
use rand::Rng;
use sha2::{Digest, Sha224};
use tokio::{
    sync::watch as signal,
    time::{sleep_until, Instant},
};
use tokio_util::{
    codec::{FramedRead, LinesCodec},
    io::StreamReader,
};

use crate::{Error, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type Handler =
    Box<dyn FnMut(DynamicObject, WatchPhase) -> futures::future::BoxFuture<'static, std::result::Result<(), BoxError>> + Send>;

/// Fixed stand-in for the server URL when deriving [`Watcher::cache_id`],
/// so the value is location-independent
const CACHE_ID_SENTINEL: &str = "https://cluster.internal";

/// The change reported to the user handler
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchPhase {
    /// The object is new to the cache
    Added,
    /// The object changed
    Modified,
    /// The object is gone
    Deleted,
}

/// Tuning knobs for the engine
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Upper bound on consecutive relist/reconnect attempts; `None` retries forever
    pub resync_failure_max: Option<u32>,
    /// Period of the resync watchdog tick
    pub resync_delay_secs: u64,
    /// Period of the scheduled full relist
    pub relist_interval_secs: u64,
    /// Maximum stream silence before the watchdog forces a reconnect
    pub last_seen_limit_secs: u64,
    /// Page size for the (re)list; `None` lets the server decide
    pub page_limit: Option<u32>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            resync_failure_max: None,
            resync_delay_secs: 5,
            relist_interval_secs: 600,
            last_seen_limit_secs: 600,
            page_limit: None,
        }
    }
}

/// Lifecycle events surfaced on the watcher's event bus.
///
/// These mirror what the engine is doing and are safe to subscribe to from
/// anywhere; the user handler only ever sees [`Lifecycle::Data`]-shaped
/// deliveries (and never bookmarks).
#[derive(Clone, Debug)]
pub enum Lifecycle {
    /// A watch stream was opened at the given path
    Connect {
        /// path+query of the watch request
        path: String,
    },
    /// An object update was delivered
    Data {
        /// The delivered object
        object: DynamicObject,
        /// What happened to it
        phase: WatchPhase,
    },
    /// A full (re)list completed
    List {
        /// The list's resource version
        resource_version: String,
    },
    /// A (re)list failed; the relist timer will retry
    ListError {
        /// Failure description
        message: String,
    },
    /// A relist found a server object missing from the cache
    CacheMiss {
        /// uid of the missed object
        uid: String,
    },
    /// The initial list seeded an object into the empty cache
    InitCacheMiss {
        /// uid of the seeded object
        uid: String,
    },
    /// A reconnect is starting after backoff
    Reconnect {
        /// The current consecutive-failure count
        attempt: u32,
    },
    /// A reconnect has been scheduled
    ReconnectPending,
    /// The consecutive-failure count was incremented
    IncResyncFailureCount {
        /// The new count
        count: u32,
    },
    /// The failure budget is exhausted; the watcher is closing
    GiveUp {
        /// Failure description
        message: String,
    },
    /// The watcher has shut down
    Abort,
    /// A malformed event, a non-410 error event, or a handler failure
    DataError {
        /// Failure description
        message: String,
    },
    /// The stream broke at the transport level
    NetworkError {
        /// Failure description
        message: String,
    },
    /// The server purged the resource version window (410 Gone)
    OldResourceVersion {
        /// The purged resource version
        resource_version: String,
    },
    /// The server checkpointed the stream; cache untouched, handler not invoked
    Bookmark {
        /// The checkpointed resource version
        resource_version: String,
    },
}

/// A handle to a running (or startable) watch engine.
///
/// The watcher owns its cache, timers, and stream exclusively; callers
/// interact through [`Watcher::start`], [`Watcher::close`] and
/// [`Watcher::events`].
pub struct Watcher {
    client: Client,
    request: Request,
    list_params: ListParams,
    cfg: WatchConfig,
    handler: Option<Handler>,
    bus: async_broadcast::Sender<Lifecycle>,
    events: async_broadcast::InactiveReceiver<Lifecycle>,
    shutdown_tx: signal::Sender<bool>,
    shutdown_rx: signal::Receiver<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Watcher {
    /// Create a watcher over a fluent chain's kind and filters.
    ///
    /// A chain-level name is folded into a `metadata.name` field selector so
    /// single-object watches go through the collection endpoint.
    pub fn new<F, Fut>(k8s: &K8s, cfg: WatchConfig, handler: F) -> Result<Self>
    where
        F: FnMut(DynamicObject, WatchPhase) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        let mut filter = k8s.filter().clone();
        if let Some(name) = filter.name.take() {
            filter.fields.insert("metadata.name".to_string(), name);
        }
        let request = Request::for_kind(k8s.gvk(), filter.namespace.as_deref())?;
        let mut list_params = ListParams::default();
        if let Some(fields) = filter.field_selector() {
            list_params = list_params.fields(&fields);
        }
        if let Some(labels) = filter.label_selector() {
            list_params = list_params.labels(&labels);
        }

        let (mut bus, events) = async_broadcast::broadcast(128);
        bus.set_overflow(true);
        let (shutdown_tx, shutdown_rx) = signal::channel(false);
        let mut handler = handler;
        Ok(Self {
            client: k8s.client().clone(),
            request,
            list_params,
            cfg,
            handler: Some(Box::new(move |obj, phase| handler(obj, phase).boxed())),
            bus,
            events: events.deactivate(),
            shutdown_tx,
            shutdown_rx,
            task: None,
        })
    }

    /// Subscribe to the engine's lifecycle events
    pub fn events(&self) -> async_broadcast::Receiver<Lifecycle> {
        self.events.activate_cloned()
    }

    /// Identity of this watch, stable across restarts and servers.
    ///
    /// The first 10 hex characters of SHA-224 over the watch path+query,
    /// with the server URL replaced by a fixed sentinel. Useful as a key for
    /// persisting resume state.
    pub fn cache_id(&self) -> String {
        let pq = self
            .request
            .watch(&self.list_params, None)
            .ok()
            .and_then(|req| req.uri().path_and_query().map(|pq| pq.as_str().to_string()))
            .unwrap_or_else(|| self.request.url_path.clone());
        let digest = Sha224::digest(format!("{CACHE_ID_SENTINEL}{pq}").as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..10].to_string()
    }

    /// Spawn the engine task; fails if the watcher was already started
    pub fn start(&mut self) -> Result<()> {
        let handler = self.handler.take().ok_or(Error::AlreadyStarted)?;
        let engine = Engine {
            client: self.client.clone(),
            request: self.request.clone(),
            list_params: self.list_params.clone(),
            cfg: self.cfg.clone(),
            handler,
            bus: self.bus.clone(),
            shutdown: self.shutdown_rx.clone(),
            cache: HashMap::new(),
            resource_version: None,
            last_seen: LastSeen::Never,
            failure_count: 0,
            pending_reconnect: false,
            initial_list_done: false,
        };
        self.task = Some(tokio::spawn(engine.run()));
        Ok(())
    }

    /// Stop the engine: timers are cancelled, the in-flight request and
    /// stream are dropped, `ABORT` is emitted, and no further handler
    /// invocations happen.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum LastSeen {
    /// Nothing received yet; the watchdog stays quiet
    Never,
    /// A reconnect has been requested out-of-band; the watchdog fires next tick
    Override,
    /// Instant of the last successful reception
    At(Instant),
}

enum LineOutcome {
    Continue,
    TooOld,
}

struct Engine {
    client: Client,
    request: Request,
    list_params: ListParams,
    cfg: WatchConfig,
    handler: Handler,
    bus: async_broadcast::Sender<Lifecycle>,
    shutdown: signal::Receiver<bool>,
    cache: HashMap<String, DynamicObject>,
    resource_version: Option<String>,
    last_seen: LastSeen,
    failure_count: u32,
    pending_reconnect: bool,
    initial_list_done: bool,
}

/// Sleep until `deadline`; true means shutdown fired first
async fn interrupted(shutdown: &mut signal::Receiver<bool>, deadline: Instant) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = sleep_until(deadline) => false,
        _ = shutdown.changed() => true,
    }
}

fn parse_rv(obj: &DynamicObject) -> u64 {
    obj.resource_version()
        .and_then(|rv| rv.parse().ok())
        .unwrap_or(0)
}

impl Engine {
    fn emit(&self, event: Lifecycle) {
        // Overflow mode is on: a slow or absent subscriber never blocks the engine.
        let _ = self.bus.try_broadcast(event);
    }

    fn jittered(&self, secs: u64) -> Duration {
        Duration::from_secs(secs) + Duration::from_millis(rand::rng().random_range(0..1000u64))
    }

    fn backoff_delay(&self) -> Duration {
        let secs = (1u64 << self.failure_count.min(5)).min(30);
        Duration::from_secs(secs) + Duration::from_millis(rand::rng().random_range(0..1000u64))
    }

    fn watchdog_due(&self) -> bool {
        if self.pending_reconnect {
            return false;
        }
        match self.last_seen {
            LastSeen::Never => false,
            LastSeen::Override => true,
            LastSeen::At(at) => at.elapsed() > Duration::from_secs(self.cfg.last_seen_limit_secs),
        }
    }

    async fn run(mut self) {
        let mut shutdown = self.shutdown.clone();
        let mut relist_deadline = Instant::now() + self.jittered(self.cfg.relist_interval_secs);
        let mut resync_deadline = Instant::now() + self.jittered(self.cfg.resync_delay_secs);

        'reflector: loop {
            if *shutdown.borrow() {
                break 'reflector;
            }

            // list-then-watch: seed or repair the cache first
            let listed = tokio::select! {
                _ = shutdown.changed() => break 'reflector,
                res = self.list_and_diff() => res,
            };
            if let Err(err) = listed {
                tracing::debug!("list failed: {}", err);
                self.emit(Lifecycle::ListError {
                    message: err.to_string(),
                });
                if interrupted(&mut shutdown, relist_deadline).await {
                    break 'reflector;
                }
                relist_deadline = Instant::now() + self.jittered(self.cfg.relist_interval_secs);
                continue 'reflector;
            }
            self.pending_reconnect = false;

            // open the watch stream from the listed version
            let watch_req = match self
                .request
                .watch(&self.list_params, self.resource_version.as_deref())
            {
                Ok(req) => req,
                Err(err) => {
                    self.emit(Lifecycle::NetworkError {
                        message: err.to_string(),
                    });
                    if self.reconnect(&mut shutdown).await {
                        break 'reflector;
                    }
                    continue 'reflector;
                }
            };
            let path = watch_req.uri().to_string();
            let stream = tokio::select! {
                _ = shutdown.changed() => break 'reflector,
                res = self.client.request_text_stream(watch_req) => res,
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::debug!("watch connect failed: {}", err);
                    self.emit(Lifecycle::NetworkError {
                        message: err.to_string(),
                    });
                    self.last_seen = LastSeen::Override;
                    if self.reconnect(&mut shutdown).await {
                        break 'reflector;
                    }
                    continue 'reflector;
                }
            };
            self.emit(Lifecycle::Connect { path });

            let mut lines = FramedRead::new(
                StreamReader::new(stream.map_err(std::io::Error::other)),
                LinesCodec::new(),
            );

            // consume the stream until it breaks, goes stale, or is out of date
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break 'reflector,
                    _ = sleep_until(relist_deadline) => {
                        relist_deadline = Instant::now() + self.jittered(self.cfg.relist_interval_secs);
                        let relisted = tokio::select! {
                            _ = shutdown.changed() => break 'reflector,
                            res = self.list_and_diff() => res,
                        };
                        if let Err(err) = relisted {
                            self.emit(Lifecycle::ListError { message: err.to_string() });
                        }
                    }
                    _ = sleep_until(resync_deadline) => {
                        resync_deadline = Instant::now() + self.jittered(self.cfg.resync_delay_secs);
                        if self.watchdog_due() {
                            self.last_seen = LastSeen::At(Instant::now());
                            break;
                        }
                    }
                    line = lines.next() => match line {
                        Some(Ok(line)) => {
                            if matches!(self.process_line(&line).await, LineOutcome::TooOld) {
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            tracing::debug!("watch stream error: {}", err);
                            self.emit(Lifecycle::NetworkError { message: err.to_string() });
                            self.last_seen = LastSeen::Override;
                            break;
                        }
                        // server closed the stream; restart list-then-watch
                        None => break,
                    }
                }
            }

            if self.reconnect(&mut shutdown).await {
                break 'reflector;
            }
        }

        self.emit(Lifecycle::Abort);
    }

    /// One reconnect trigger: bump the failure count, give up past the
    /// budget, otherwise back off (interruptibly) before the next
    /// list-then-watch round. Returns true when the engine should stop.
    async fn reconnect(&mut self, shutdown: &mut signal::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return true;
        }
        self.failure_count += 1;
        self.emit(Lifecycle::IncResyncFailureCount {
            count: self.failure_count,
        });
        if let Some(max) = self.cfg.resync_failure_max {
            if self.failure_count > max {
                self.emit(Lifecycle::GiveUp {
                    message: format!("{} consecutive resync failures (max {})", self.failure_count, max),
                });
                return true;
            }
        }
        self.pending_reconnect = true;
        self.last_seen = LastSeen::At(Instant::now());
        self.emit(Lifecycle::ReconnectPending);
        if interrupted(shutdown, Instant::now() + self.backoff_delay()).await {
            return true;
        }
        self.emit(Lifecycle::Reconnect {
            attempt: self.failure_count,
        });
        false
    }

    /// Full paginated list, diffed against the cache.
    ///
    /// Missing objects fire `Added` (plus a cache-miss event), newer
    /// resource versions fire `Modified`, and anything cached but absent
    /// from the final listing fires `Deleted`.
    async fn list_and_diff(&mut self) -> std::result::Result<(), k8s_fluent_client::Error> {
        let first = !self.initial_list_done;
        let mut removed: std::collections::HashSet<String> = self.cache.keys().cloned().collect();
        let mut continue_token: Option<String> = None;

        loop {
            let mut lp = self.list_params.clone();
            if let Some(limit) = self.cfg.page_limit {
                lp = lp.limit(limit);
            }
            if let Some(token) = &continue_token {
                lp = lp.continue_token(token);
            }
            let req = self.request.list(&lp).map_err(k8s_fluent_client::Error::Core)?;
            let list: ObjectList<DynamicObject> = self.client.request(req).await?;
            if let Some(rv) = list.metadata.resource_version {
                self.resource_version = Some(rv);
            }

            for obj in list.items {
                let Some(uid) = obj.uid().map(String::from) else {
                    continue;
                };
                removed.remove(&uid);
                match self.cache.get(&uid) {
                    None => {
                        self.emit(if first {
                            Lifecycle::InitCacheMiss { uid }
                        } else {
                            Lifecycle::CacheMiss { uid }
                        });
                        self.deliver(obj, WatchPhase::Added).await;
                    }
                    Some(cached) => {
                        if parse_rv(&obj) > parse_rv(cached) {
                            self.deliver(obj, WatchPhase::Modified).await;
                        }
                    }
                }
            }

            match list.metadata.continue_token {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => break,
            }
        }

        for uid in removed {
            if let Some(obj) = self.cache.get(&uid).cloned() {
                self.deliver(obj, WatchPhase::Deleted).await;
            }
        }

        self.initial_list_done = true;
        self.emit(Lifecycle::List {
            resource_version: self.resource_version.clone().unwrap_or_default(),
        });
        Ok(())
    }

    /// Decode one NDJSON line and apply the reducer
    async fn process_line(&mut self, line: &str) -> LineOutcome {
        let event = match serde_json::from_str::<WatchEvent<DynamicObject>>(line) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!("undecodable watch line: {}", err);
                self.emit(Lifecycle::DataError {
                    message: err.to_string(),
                });
                return LineOutcome::Continue;
            }
        };

        self.last_seen = LastSeen::At(Instant::now());
        self.failure_count = 0;
        self.pending_reconnect = false;

        match event {
            WatchEvent::Added(obj) => self.deliver(obj, WatchPhase::Added).await,
            WatchEvent::Modified(obj) => self.deliver(obj, WatchPhase::Modified).await,
            WatchEvent::Deleted(obj) => self.deliver(obj, WatchPhase::Deleted).await,
            WatchEvent::Bookmark(bookmark) => {
                let resource_version = bookmark.metadata.resource_version;
                self.resource_version = Some(resource_version.clone());
                self.emit(Lifecycle::Bookmark { resource_version });
            }
            WatchEvent::Error(err) if err.code == 410 => {
                let purged = self.resource_version.take().unwrap_or_default();
                tracing::debug!("resource version {} purged, relisting", purged);
                self.emit(Lifecycle::OldResourceVersion {
                    resource_version: purged,
                });
                return LineOutcome::TooOld;
            }
            WatchEvent::Error(err) => {
                self.emit(Lifecycle::DataError {
                    message: err.to_string(),
                });
            }
        }
        LineOutcome::Continue
    }

    /// Apply one update to the cache, surface it on the bus, and await the
    /// user handler. Handler failures are reported but never evict.
    async fn deliver(&mut self, obj: DynamicObject, phase: WatchPhase) {
        let Some(uid) = obj.uid().map(String::from) else {
            return;
        };
        match phase {
            WatchPhase::Added | WatchPhase::Modified => {
                self.cache.insert(uid, obj.clone());
            }
            WatchPhase::Deleted => {
                self.cache.remove(&uid);
            }
        }
        self.emit(Lifecycle::Data {
            object: obj.clone(),
            phase,
        });
        if let Err(err) = (self.handler)(obj, phase).await {
            self.emit(Lifecycle::DataError {
                message: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::pin_mut;
    use http::{Request as HttpRequest, Response, StatusCode};
    use k8s_fluent_client::{client::Body, Config};
    use std::sync::{Arc, Mutex};
    use tower_test::mock::{self, Handle};

    type MockHandle = Handle<HttpRequest<Body>, Response<Body>>;
    type Seen = Arc<Mutex<Vec<(WatchPhase, String)>>>;

    fn mock_client() -> (Client, MockHandle) {
        let (mock_service, handle) = mock::pair::<HttpRequest<Body>, Response<Body>>();
        let config = Config::new("http://localhost".parse().unwrap())
            .auth_token_file("/nonexistent".into());
        (Client::new(mock_service, config), handle)
    }

    fn json_response(value: serde_json::Value) -> Response<Body> {
        Response::builder()
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap()))
            .unwrap()
    }

    fn ndjson_response(lines: &[serde_json::Value]) -> Response<Body> {
        let mut body = String::new();
        for line in lines {
            body.push_str(&line.to_string());
            body.push('\n');
        }
        Response::builder()
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.into_bytes()))
            .unwrap()
    }

    fn pod(uid: &str, name: &str, rv: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": "default", "uid": uid, "resourceVersion": rv},
        })
    }

    fn recording_handler(seen: Seen) -> impl FnMut(
        DynamicObject,
        WatchPhase,
    )
        -> futures::future::Ready<std::result::Result<(), BoxError>>
           + Send
           + 'static {
        move |obj, phase| {
            seen.lock()
                .unwrap()
                .push((phase, obj.uid().unwrap_or_default().to_string()));
            futures::future::ready(Ok(()))
        }
    }

    /// An engine wired to a collecting handler and a live bus receiver
    fn test_engine(
        client: Client,
        cfg: WatchConfig,
        seen: Seen,
    ) -> (Engine, async_broadcast::Receiver<Lifecycle>) {
        let (mut bus, events) = async_broadcast::broadcast(128);
        bus.set_overflow(true);
        let (_shutdown_tx, shutdown_rx) = signal::channel(false);
        let mut handler = recording_handler(seen);
        let engine = Engine {
            client,
            request: Request::new("/api/v1/namespaces/default/pods"),
            list_params: ListParams::default(),
            cfg,
            handler: Box::new(move |obj, phase| handler(obj, phase).boxed()),
            bus,
            shutdown: shutdown_rx,
            cache: HashMap::new(),
            resource_version: None,
            last_seen: LastSeen::Never,
            failure_count: 0,
            pending_reconnect: false,
            initial_list_done: false,
        };
        (engine, events)
    }

    fn drain(rx: &mut async_broadcast::Receiver<Lifecycle>) -> Vec<Lifecycle> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn relist_diff_emits_modified_and_added() {
        let (client, handle) = mock_client();
        let spawned = tokio::spawn(async move {
            pin_mut!(handle);
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(
                request.uri().to_string(),
                "http://localhost/api/v1/namespaces/default/pods"
            );
            send.send_response(json_response(serde_json::json!({
                "metadata": {"resourceVersion": "5"},
                "items": [pod("uid1", "a", "2"), pod("uid2", "b", "1")],
            })));
        });

        let seen: Seen = Default::default();
        let (mut engine, mut events) = test_engine(client, WatchConfig::default(), seen.clone());
        // pre-seed the cache as if uid1 had been observed at an older version
        let cached: DynamicObject = serde_json::from_value(pod("uid1", "a", "1")).unwrap();
        engine.cache.insert("uid1".into(), cached);
        engine.initial_list_done = true;

        engine.list_and_diff().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (WatchPhase::Modified, "uid1".to_string()),
                (WatchPhase::Added, "uid2".to_string()),
            ]
        );
        assert_eq!(engine.cache.len(), 2);
        assert_eq!(parse_rv(&engine.cache["uid1"]), 2);
        assert_eq!(engine.resource_version.as_deref(), Some("5"));
        let lifecycle = drain(&mut events);
        assert!(lifecycle
            .iter()
            .any(|ev| matches!(ev, Lifecycle::CacheMiss { uid } if uid == "uid2")));
        spawned.await.unwrap();
    }

    #[tokio::test]
    async fn relist_diff_is_convergent_and_fires_deletes() {
        let (client, handle) = mock_client();
        let spawned = tokio::spawn(async move {
            pin_mut!(handle);
            let (_request, send) = handle.next_request().await.expect("service not called");
            send.send_response(json_response(serde_json::json!({
                "metadata": {"resourceVersion": "6"},
                "items": [pod("uid1", "a", "2")],
            })));
        });

        let seen: Seen = Default::default();
        let (mut engine, _events) = test_engine(client, WatchConfig::default(), seen.clone());
        let a: DynamicObject = serde_json::from_value(pod("uid1", "a", "2")).unwrap();
        let b: DynamicObject = serde_json::from_value(pod("uid2", "b", "1")).unwrap();
        engine.cache.insert("uid1".into(), a);
        engine.cache.insert("uid2".into(), b);
        engine.initial_list_done = true;

        engine.list_and_diff().await.unwrap();

        // uid1 is unchanged (same rv, no spurious event); uid2 is gone
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(WatchPhase::Deleted, "uid2".to_string())]
        );
        assert!(!engine.cache.contains_key("uid2"));
        spawned.await.unwrap();
    }

    #[tokio::test]
    async fn initial_list_follows_continue_tokens() {
        let (client, handle) = mock_client();
        let spawned = tokio::spawn(async move {
            pin_mut!(handle);
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.uri().query(), None);
            send.send_response(json_response(serde_json::json!({
                "metadata": {"resourceVersion": "7", "continue": "page2"},
                "items": [pod("uid1", "a", "1")],
            })));
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.uri().query(), Some("continue=page2"));
            send.send_response(json_response(serde_json::json!({
                "metadata": {"resourceVersion": "7"},
                "items": [pod("uid2", "b", "1")],
            })));
        });

        let seen: Seen = Default::default();
        let (mut engine, mut events) = test_engine(client, WatchConfig::default(), seen.clone());
        engine.list_and_diff().await.unwrap();

        assert_eq!(engine.cache.len(), 2);
        let lifecycle = drain(&mut events);
        // both pages seeded the initial cache
        assert_eq!(
            lifecycle
                .iter()
                .filter(|ev| matches!(ev, Lifecycle::InitCacheMiss { .. }))
                .count(),
            2
        );
        assert!(lifecycle
            .iter()
            .any(|ev| matches!(ev, Lifecycle::List { resource_version } if resource_version == "7")));
        spawned.await.unwrap();
    }

    #[tokio::test]
    async fn gone_event_purges_the_resource_version() {
        let (client, _handle) = mock_client();
        let seen: Seen = Default::default();
        let (mut engine, mut events) = test_engine(client, WatchConfig::default(), seen.clone());
        engine.resource_version = Some("42".into());

        let line = serde_json::json!({
            "type": "ERROR",
            "object": {"kind": "Status", "status": "Failure", "reason": "Expired", "code": 410},
        })
        .to_string();
        assert!(matches!(
            engine.process_line(&line).await,
            LineOutcome::TooOld
        ));
        assert_eq!(engine.resource_version, None);
        let lifecycle = drain(&mut events);
        assert!(lifecycle.iter().any(
            |ev| matches!(ev, Lifecycle::OldResourceVersion { resource_version } if resource_version == "42")
        ));
        // no object delivery happened
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_lines_are_reported_and_skipped() {
        let (client, _handle) = mock_client();
        let seen: Seen = Default::default();
        let (mut engine, mut events) = test_engine(client, WatchConfig::default(), seen.clone());

        assert!(matches!(
            engine.process_line("{ not json").await,
            LineOutcome::Continue
        ));
        assert!(drain(&mut events)
            .iter()
            .any(|ev| matches!(ev, Lifecycle::DataError { .. })));
        assert!(engine.cache.is_empty());

        // a good line right after is processed normally
        let line = serde_json::json!({"type": "ADDED", "object": pod("uid1", "a", "1")}).to_string();
        engine.process_line(&line).await;
        assert_eq!(engine.cache.len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![(WatchPhase::Added, "uid1".to_string())]);
    }

    #[tokio::test]
    async fn bookmarks_advance_the_version_without_deliveries() {
        let (client, _handle) = mock_client();
        let seen: Seen = Default::default();
        let (mut engine, mut events) = test_engine(client, WatchConfig::default(), seen.clone());

        let line = serde_json::json!({
            "type": "BOOKMARK",
            "object": {"apiVersion": "v1", "kind": "Pod", "metadata": {"resourceVersion": "99"}},
        })
        .to_string();
        engine.process_line(&line).await;

        assert_eq!(engine.resource_version.as_deref(), Some("99"));
        assert!(engine.cache.is_empty());
        assert!(seen.lock().unwrap().is_empty());
        assert!(drain(&mut events)
            .iter()
            .any(|ev| matches!(ev, Lifecycle::Bookmark { resource_version } if resource_version == "99")));
    }

    #[tokio::test]
    async fn handler_failures_do_not_evict() {
        let (client, _handle) = mock_client();
        let (mut bus, events) = async_broadcast::broadcast(128);
        bus.set_overflow(true);
        let (_sd_tx, sd_rx) = signal::channel(false);
        let mut engine = Engine {
            client,
            request: Request::new("/api/v1/namespaces/default/pods"),
            list_params: ListParams::default(),
            cfg: WatchConfig::default(),
            handler: Box::new(|_obj, _phase| {
                futures::future::ready(Err::<(), BoxError>("handler exploded".into())).boxed()
            }),
            bus,
            shutdown: sd_rx,
            cache: HashMap::new(),
            resource_version: None,
            last_seen: LastSeen::Never,
            failure_count: 0,
            pending_reconnect: false,
            initial_list_done: false,
        };
        let mut events = events;

        let line = serde_json::json!({"type": "ADDED", "object": pod("uid1", "a", "1")}).to_string();
        engine.process_line(&line).await;

        assert!(engine.cache.contains_key("uid1"));
        assert!(drain(&mut events)
            .iter()
            .any(|ev| matches!(ev, Lifecycle::DataError { message } if message.contains("handler exploded"))));
    }

    #[tokio::test(start_paused = true)]
    async fn give_up_fires_once_past_the_failure_budget() {
        let (client, _handle) = mock_client();
        let seen: Seen = Default::default();
        let cfg = WatchConfig {
            resync_failure_max: Some(1),
            ..WatchConfig::default()
        };
        let (mut engine, mut events) = test_engine(client, cfg, seen.clone());
        let (_sd_tx, mut sd_rx) = signal::channel(false);

        assert!(!engine.reconnect(&mut sd_rx).await);
        assert!(engine.reconnect(&mut sd_rx).await);

        let lifecycle = drain(&mut events);
        assert_eq!(
            lifecycle
                .iter()
                .filter(|ev| matches!(ev, Lifecycle::GiveUp { .. }))
                .count(),
            1
        );
        let counts: Vec<u32> = lifecycle
            .iter()
            .filter_map(|ev| match ev {
                Lifecycle::IncResyncFailureCount { count } => Some(*count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2]);
    }

    #[tokio::test]
    async fn successful_reception_resets_the_failure_count() {
        let (client, _handle) = mock_client();
        let seen: Seen = Default::default();
        let (mut engine, _events) = test_engine(client, WatchConfig::default(), seen.clone());
        engine.failure_count = 3;
        engine.pending_reconnect = true;

        let line = serde_json::json!({"type": "ADDED", "object": pod("uid1", "a", "1")}).to_string();
        engine.process_line(&line).await;

        assert_eq!(engine.failure_count, 0);
        assert!(!engine.pending_reconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_delivers_then_aborts_on_close() {
        let (client, handle) = mock_client();
        let spawned = tokio::spawn(async move {
            pin_mut!(handle);
            // initial list
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(
                request.uri().to_string(),
                "http://localhost/api/v1/namespaces/default/pods?labelSelector=app%3Dweb"
            );
            send.send_response(json_response(serde_json::json!({
                "metadata": {"resourceVersion": "10"},
                "items": [],
            })));
            // first watch resumes from the listed version
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(
                request.uri().query().unwrap(),
                "watch=true&allowWatchBookmarks=true&labelSelector=app%3Dweb&resourceVersion=10"
            );
            send.send_response(ndjson_response(&[
                serde_json::json!({"type": "ADDED", "object": pod("uid1", "a", "11")}),
                serde_json::json!({"type": "MODIFIED", "object": pod("uid1", "a", "12")}),
            ]));
            // the short body above ends the stream; serve any relists and
            // re-watches generically until the watcher is closed
            while let Some((request, send)) = handle.next_request().await {
                if request.uri().query().unwrap_or_default().contains("watch=true") {
                    send.send_response(ndjson_response(&[]));
                } else {
                    send.send_response(json_response(serde_json::json!({
                        "metadata": {"resourceVersion": "12"},
                        "items": [pod("uid1", "a", "12")],
                    })));
                }
            }
        });

        let seen: Seen = Default::default();
        let k8s = client
            .kind("Pod")
            .unwrap()
            .in_namespace("default")
            .unwrap()
            .with_label("app", "web");
        let mut watcher = Watcher::new(&k8s, WatchConfig::default(), recording_handler(seen.clone())).unwrap();
        let mut events = watcher.events();
        watcher.start().unwrap();

        // wait until both deliveries arrived
        let mut phases = Vec::new();
        while phases.len() < 2 {
            match events.recv().await {
                Ok(Lifecycle::Data { phase, .. }) => phases.push(phase),
                Ok(_) => {}
                Err(async_broadcast::RecvError::Overflowed(_)) => {}
                Err(err) => panic!("bus closed early: {err}"),
            }
        }
        assert_eq!(phases, vec![WatchPhase::Added, WatchPhase::Modified]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (WatchPhase::Added, "uid1".to_string()),
                (WatchPhase::Modified, "uid1".to_string()),
            ]
        );

        watcher.close();
        loop {
            match events.recv().await {
                Ok(Lifecycle::Abort) => break,
                Ok(_) => {}
                Err(async_broadcast::RecvError::Overflowed(_)) => {}
                Err(err) => panic!("bus closed without abort: {err}"),
            }
        }

        drop(watcher);
        spawned.abort();
        let _ = spawned.await;
    }

    #[tokio::test]
    async fn cache_ids_are_stable_and_location_independent() {
        let (client, _handle) = mock_client();
        let pods = client
            .kind("Pod")
            .unwrap()
            .in_namespace("default")
            .unwrap()
            .with_label("app", "web");
        let noop = |_obj: DynamicObject, _phase: WatchPhase| futures::future::ready(Ok(()));

        let a = Watcher::new(&pods, WatchConfig::default(), noop).unwrap();
        let b = Watcher::new(&pods, WatchConfig::default(), noop).unwrap();
        assert_eq!(a.cache_id(), b.cache_id());
        assert_eq!(a.cache_id().len(), 10);
        assert!(a.cache_id().chars().all(|c| c.is_ascii_hexdigit()));

        let other = client.kind("Pod").unwrap().in_namespace("kube-system").unwrap();
        let c = Watcher::new(&other, WatchConfig::default(), noop).unwrap();
        assert_ne!(a.cache_id(), c.cache_id());
    }
}
