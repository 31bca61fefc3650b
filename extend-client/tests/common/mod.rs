//! Common test utilities for integration tests.
//!
//! [`LocalGrid`] is an in-process cache peer behind the `Transport` seam. It
//! decodes requests with the same type id table as a real proxy, keeps its
//! entries in a few partitions, and pushes events through one delivery task
//! so they reach the client in emission order.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use extend_client::core::protocol::{
    error_codes, CacheNotification, CacheNotificationKind, Event, MapEvent, MapEventKind, Message,
    RemoteError, Request, Response, ResponseBody,
};
use extend_client::core::serialization::Number;
use extend_client::core::{AggregationState, Data, ExtendError, Result};
use extend_client::{ClientConfig, ExtendClient, Transport, TransportHandler};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Number of partitions each grid cache is split into.
pub const PARTITIONS: usize = 4;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_name(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

pub fn default_config() -> ClientConfig {
    ClientConfig::builder()
        .request_timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build config")
}

pub async fn create_client(grid: &LocalGrid) -> ExtendClient {
    create_client_with_config(grid, default_config()).await
}

pub async fn create_client_with_config(grid: &LocalGrid, config: ClientConfig) -> ExtendClient {
    ExtendClient::with_transport(config, Arc::new(grid.clone()))
        .await
        .expect("failed to create client")
}

/// Polls `condition` until it holds or a second passes.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Lets in-flight events drain through the pipeline.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

enum Outbound {
    Message(Message),
    Close(ExtendError),
}

#[derive(Default)]
struct GridCache {
    partitions: Vec<HashMap<Data, Data>>,
}

impl GridCache {
    fn new() -> Self {
        Self {
            partitions: (0..PARTITIONS).map(|_| HashMap::new()).collect(),
        }
    }

    fn partition(&mut self, key: &Data) -> &mut HashMap<Data, Data> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % PARTITIONS as u64) as usize;
        &mut self.partitions[index]
    }

    fn len(&self) -> usize {
        self.partitions.iter().map(HashMap::len).sum()
    }
}

#[derive(Default)]
struct GridState {
    caches: HashMap<String, GridCache>,
    /// channel id -> cache name -> interests (`None` = every key)
    interest: HashMap<i32, HashMap<String, HashSet<Option<Data>>>>,
}

struct Inner {
    state: Mutex<GridState>,
    outbox: mpsc::UnboundedSender<Outbound>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    requests: Mutex<Vec<Request>>,
    hold_responses: AtomicBool,
    closed: AtomicBool,
}

/// An in-process cache peer.
#[derive(Clone)]
pub struct LocalGrid {
    inner: Arc<Inner>,
}

impl LocalGrid {
    pub fn new() -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(GridState::default()),
                outbox,
                inbox: Mutex::new(Some(inbox)),
                requests: Mutex::new(Vec::new()),
                hold_responses: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.inner.requests.lock().clone()
    }

    /// Counts received requests matching `predicate`.
    pub fn count_requests(&self, predicate: impl Fn(&Request) -> bool) -> usize {
        self.inner.requests.lock().iter().filter(|r| predicate(r)).count()
    }

    /// While set, requests are executed but never answered.
    pub fn hold_responses(&self, hold: bool) {
        self.inner.hold_responses.store(hold, Ordering::SeqCst);
    }

    /// Drops the connection as a failing transport would.
    pub fn disconnect(&self) {
        let _ = self.inner.outbox.send(Outbound::Close(ExtendError::ConnectionLost(
            "grid went away".to_string(),
        )));
    }

    /// Pushes a raw message to the client.
    pub fn push(&self, message: Message) {
        let _ = self.inner.outbox.send(Outbound::Message(message));
    }

    /// Mutates a cache as another client would.
    pub fn external_put(&self, cache: &str, key: Data, value: Data) {
        let mut state = self.inner.state.lock();
        let mut out = Vec::new();
        put(&mut state, &mut out, cache, key, value);
        self.flush(out);
    }

    /// Removes a key as another client would.
    pub fn external_remove(&self, cache: &str, key: Data) {
        let mut state = self.inner.state.lock();
        let mut out = Vec::new();
        remove(&mut state, &mut out, cache, key);
        self.flush(out);
    }

    /// Returns the number of event interests held for `cache` across channels.
    pub fn interest_count(&self, cache: &str) -> usize {
        self.inner
            .state
            .lock()
            .interest
            .values()
            .filter_map(|caches| caches.get(cache))
            .map(HashSet::len)
            .sum()
    }

    fn flush(&self, out: Vec<Message>) {
        for message in out {
            let _ = self.inner.outbox.send(Outbound::Message(message));
        }
    }

    /// Runs one request and queues its events and response in order.
    fn execute(&self, message: &Message) {
        let channel = message.channel_id();
        let correlation_id = message.correlation_id();
        let mut out = Vec::new();

        let mut state = self.inner.state.lock();
        let body = match Request::decode(message) {
            Ok(request) => {
                self.inner.requests.lock().push(request.clone());
                apply(&mut state, &mut out, channel, request)
            }
            Err(e) => ResponseBody::Error(RemoteError::new(
                error_codes::ILLEGAL_ARGUMENT,
                e.to_string(),
            )),
        };

        if !self.inner.hold_responses.load(Ordering::SeqCst) {
            out.push(Response::new(correlation_id, body).encode(channel));
        }
        self.flush(out);
    }
}

impl Default for LocalGrid {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalGrid {
    async fn start(&self, handler: Arc<dyn TransportHandler>) -> Result<()> {
        let mut inbox = self
            .inner
            .inbox
            .lock()
            .take()
            .ok_or_else(|| ExtendError::ConnectionLost("grid already started".to_string()))?;

        tokio::spawn(async move {
            while let Some(outbound) = inbox.recv().await {
                match outbound {
                    Outbound::Message(message) => handler.on_message(message),
                    Outbound::Close(error) => {
                        handler.on_closed(error);
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ExtendError::ConnectionLost("grid is closed".to_string()));
        }
        self.execute(&message);
        Ok(())
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

fn apply(
    state: &mut GridState,
    out: &mut Vec<Message>,
    channel: i32,
    request: Request,
) -> ResponseBody {
    if let Request::EnsureCache { cache } = &request {
        state
            .caches
            .entry(cache.clone())
            .or_insert_with(GridCache::new);
        return ResponseBody::Unit;
    }

    let name = request.cache_name().to_string();
    if !state.caches.contains_key(&name) {
        return ResponseBody::Error(RemoteError::new(
            error_codes::NO_SUCH_CACHE,
            format!("cache {} does not exist", name),
        ));
    }

    match request {
        Request::Size { cache } => ResponseBody::Int(state.caches[&cache].len() as i32),
        Request::ContainsKey { cache, key } => {
            ResponseBody::Bool(cache_mut(state, &cache).partition(&key).contains_key(&key))
        }
        Request::Get {
            cache,
            key,
            priming,
        } => {
            let value = cache_mut(state, &cache).partition(&key).get(&key).cloned();
            if let Some(marker) = priming {
                state
                    .interest
                    .entry(channel)
                    .or_default()
                    .entry(cache.clone())
                    .or_default()
                    .insert(Some(key.clone()));
                let event = Event::Map(MapEvent {
                    cache_name: cache,
                    kind: MapEventKind::Inserted,
                    key,
                    old_value: None,
                    new_value: value.clone(),
                    priming: Some(marker),
                });
                out.push(event.encode(channel));
            }
            ResponseBody::Value(value)
        }
        Request::Put { cache, key, value } => {
            ResponseBody::Value(put(state, out, &cache, key, value))
        }
        Request::Remove { cache, key } => ResponseBody::Value(remove(state, out, &cache, key)),
        Request::Clear { cache } => {
            let keys: Vec<Data> = state.caches[&cache]
                .partitions
                .iter()
                .flat_map(|p| p.keys().cloned())
                .collect();
            for key in keys {
                remove(state, out, &cache, key);
            }
            ResponseBody::Unit
        }
        Request::Truncate { cache } => {
            for partition in &mut cache_mut(state, &cache).partitions {
                partition.clear();
            }
            notify(state, out, &cache, CacheNotificationKind::Truncated);
            ResponseBody::Unit
        }
        Request::Invoke {
            cache,
            key,
            processor,
        } => invoke(state, out, &cache, key, &processor),
        Request::Aggregate { cache, aggregator } => {
            if aggregator.attribute.is_some() {
                return ResponseBody::Error(RemoteError::new(
                    error_codes::UNSUPPORTED_OPERATION,
                    "the local grid stores no attributes",
                ));
            }
            match aggregate(&state.caches[&cache], aggregator.kind) {
                Ok(result) => ResponseBody::Aggregate(result),
                Err(e) => ResponseBody::Error(RemoteError::new(
                    error_codes::AGGREGATION_TYPE_MISMATCH,
                    e.to_string(),
                )),
            }
        }
        Request::AddListener { cache, key } => {
            state
                .interest
                .entry(channel)
                .or_default()
                .entry(cache)
                .or_default()
                .insert(key);
            ResponseBody::Unit
        }
        Request::RemoveListener { cache, key } => {
            if let Some(interests) = state
                .interest
                .get_mut(&channel)
                .and_then(|caches| caches.get_mut(&cache))
            {
                interests.remove(&key);
            }
            ResponseBody::Unit
        }
        Request::DestroyCache { cache } => {
            notify(state, out, &cache, CacheNotificationKind::Destroyed);
            state.caches.remove(&cache);
            for caches in state.interest.values_mut() {
                caches.remove(&cache);
            }
            ResponseBody::Unit
        }
        Request::EnsureCache { .. } => ResponseBody::Unit,
    }
}

fn cache_mut<'a>(state: &'a mut GridState, cache: &str) -> &'a mut GridCache {
    state
        .caches
        .entry(cache.to_string())
        .or_insert_with(GridCache::new)
}

fn put(
    state: &mut GridState,
    out: &mut Vec<Message>,
    cache: &str,
    key: Data,
    value: Data,
) -> Option<Data> {
    let old = cache_mut(state, cache)
        .partition(&key)
        .insert(key.clone(), value.clone());
    let kind = if old.is_some() {
        MapEventKind::Updated
    } else {
        MapEventKind::Inserted
    };
    publish(state, out, cache, kind, key, old.clone(), Some(value));
    old
}

fn remove(state: &mut GridState, out: &mut Vec<Message>, cache: &str, key: Data) -> Option<Data> {
    let old = cache_mut(state, cache).partition(&key).remove(&key);
    if old.is_some() {
        publish(state, out, cache, MapEventKind::Deleted, key, old.clone(), None);
    }
    old
}

/// Adds the numeric processor payload to the entry, creating it at zero.
fn invoke(
    state: &mut GridState,
    out: &mut Vec<Message>,
    cache: &str,
    key: Data,
    processor: &Data,
) -> ResponseBody {
    let delta = match processor.as_number() {
        Ok(Some(Number::Long(delta))) => delta,
        _ => {
            return ResponseBody::Error(RemoteError::new(
                error_codes::ILLEGAL_ARGUMENT,
                "the local grid only runs integral delta processors",
            ))
        }
    };
    let current = cache_mut(state, cache).partition(&key).get(&key).cloned();
    let base = match current.as_ref().map(Data::as_number) {
        None => 0,
        Some(Ok(Some(Number::Long(v)))) => v,
        Some(_) => {
            return ResponseBody::Error(RemoteError::new(
                error_codes::ILLEGAL_ARGUMENT,
                "entry is not integral",
            ))
        }
    };
    let updated = match Data::of(&base.wrapping_add(delta)) {
        Ok(data) => data,
        Err(e) => {
            return ResponseBody::Error(RemoteError::new(error_codes::SERIALIZATION, e.to_string()))
        }
    };
    put(state, out, cache, key, updated.clone());
    ResponseBody::Value(Some(updated))
}

fn aggregate(
    cache: &GridCache,
    kind: extend_client::core::AggregatorKind,
) -> Result<Option<Data>> {
    let mut partials = Vec::new();
    for partition in &cache.partitions {
        let mut state = AggregationState::new(kind);
        state.init(false);
        for value in partition.values() {
            state.process(value, false)?;
        }
        partials.push(state.partial_result());
    }

    let mut state = AggregationState::new(kind);
    state.init(true);
    for partial in partials.iter().rev().flatten() {
        state.process(partial, true)?;
    }
    Ok(state.result())
}

fn publish(
    state: &GridState,
    out: &mut Vec<Message>,
    cache: &str,
    kind: MapEventKind,
    key: Data,
    old_value: Option<Data>,
    new_value: Option<Data>,
) {
    for (&channel, caches) in &state.interest {
        let Some(interests) = caches.get(cache) else {
            continue;
        };
        if interests.contains(&None) || interests.contains(&Some(key.clone())) {
            let event = Event::Map(MapEvent {
                cache_name: cache.to_string(),
                kind,
                key: key.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
                priming: None,
            });
            out.push(event.encode(channel));
        }
    }
}

fn notify(state: &GridState, out: &mut Vec<Message>, cache: &str, kind: CacheNotificationKind) {
    for (&channel, caches) in &state.interest {
        if caches.get(cache).map_or(false, |i| !i.is_empty()) {
            let event = Event::Notification(CacheNotification {
                cache_name: cache.to_string(),
                kind,
            });
            out.push(event.encode(channel));
        }
    }
}
