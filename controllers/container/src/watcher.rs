//! Kubernetes resource watchers.
//!
//! Streams Function events from the API server and turns them into executor
//! calls. The watcher keeps the last seen revision of every function so an
//! update can be compared against its predecessor, and so functions deleted
//! while the stream was down are noticed on the next re-list.
//!
//! Secrets and ConfigMaps are watched too: a change to one rolls the pods of
//! every container function mounting it.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::executor::{ContainerExecutor, ReferenceKind};
use crds::{ExecutorType, Function};
use futures::TryStreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::watcher;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Applies Function events to the container executor
pub struct FunctionEventHandler {
    executor: Arc<ContainerExecutor>,
    known: HashMap<String, Function>,
    relisted: Option<HashSet<String>>,
    synced: Option<oneshot::Sender<()>>,
    initial_sync_done: bool,
    /// Completion signal of the last task scheduled per function UID
    pending: HashMap<String, oneshot::Receiver<()>>,
}

impl FunctionEventHandler {
    /// `synced` fires once, when the first full list has been applied
    pub fn new(executor: Arc<ContainerExecutor>, synced: oneshot::Sender<()>) -> Self {
        Self {
            executor,
            known: HashMap::new(),
            relisted: None,
            synced: Some(synced),
            initial_sync_done: false,
            pending: HashMap::new(),
        }
    }

    /// Number of functions currently tracked
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Apply one event. Executor work runs in background tasks so a slow
    /// creation does not stall the stream; their handles are returned.
    pub fn handle(&mut self, event: watcher::Event<Function>) -> Vec<JoinHandle<()>> {
        match event {
            watcher::Event::Init => {
                debug!("Function watch (re)listing");
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(function) => {
                let Some(uid) = function.metadata.uid.clone() else {
                    warn!("Ignoring function {} without uid", function.display_name());
                    return Vec::new();
                };
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(uid.clone());
                }
                // The first list is covered by adoption at startup
                match self.known.insert(uid, function.clone()) {
                    Some(old) => self.spawn_update(old, function),
                    None if self.initial_sync_done => self.spawn_add(function),
                    None => Vec::new(),
                }
            }
            watcher::Event::InitDone => {
                let mut tasks = Vec::new();
                if let Some(relisted) = self.relisted.take() {
                    let gone: Vec<String> = self
                        .known
                        .keys()
                        .filter(|uid| !relisted.contains(*uid))
                        .cloned()
                        .collect();
                    for uid in gone {
                        if let Some(function) = self.known.remove(&uid) {
                            tasks.extend(self.spawn_delete(function));
                        }
                    }
                }
                self.initial_sync_done = true;
                if let Some(synced) = self.synced.take() {
                    info!("Function watch synced with {} functions", self.known.len());
                    // Startup may have given up waiting
                    let _ = synced.send(());
                }
                tasks
            }
            watcher::Event::Apply(function) => {
                let Some(uid) = function.metadata.uid.clone() else {
                    warn!("Ignoring function {} without uid", function.display_name());
                    return Vec::new();
                };
                match self.known.insert(uid, function.clone()) {
                    Some(old) => self.spawn_update(old, function),
                    None => self.spawn_add(function),
                }
            }
            watcher::Event::Delete(function) => {
                if let Some(uid) = function.metadata.uid.as_deref() {
                    self.known.remove(uid);
                }
                self.spawn_delete(function)
            }
        }
    }

    fn spawn_add(&mut self, function: Function) -> Vec<JoinHandle<()>> {
        if function.executor_type() != ExecutorType::Container {
            return Vec::new();
        }
        debug!("Function added: {}", function.display_name());
        let executor = Arc::clone(&self.executor);
        self.schedule(function.metadata.uid.clone(), async move {
            if let Err(e) = executor.create_function(&function).await {
                warn!("Error creating backend for {}: {}", function.display_name(), e);
            }
        })
    }

    fn spawn_update(&mut self, old: Function, new: Function) -> Vec<JoinHandle<()>> {
        if old.metadata.resource_version == new.metadata.resource_version {
            return Vec::new();
        }
        debug!("Function updated: {}", new.display_name());
        let executor = Arc::clone(&self.executor);
        self.schedule(new.metadata.uid.clone(), async move {
            if let Err(e) = executor.update_function(&old, &new).await {
                warn!("Error updating backend for {}: {}", new.display_name(), e);
            }
        })
    }

    fn spawn_delete(&mut self, function: Function) -> Vec<JoinHandle<()>> {
        if function.executor_type() != ExecutorType::Container {
            return Vec::new();
        }
        debug!("Function deleted: {}", function.display_name());
        let executor = Arc::clone(&self.executor);
        let uid = function.metadata.uid.clone();
        let tasks = self.schedule(uid.clone(), async move {
            if let Err(e) = executor.delete_function(&function).await {
                warn!("Error deleting backend for {}: {}", function.display_name(), e);
            }
        });
        // UIDs are never reused, so nothing can queue behind a delete
        if let Some(uid) = uid {
            self.pending.remove(&uid);
        }
        tasks
    }

    /// Spawn `work` once the previous task for the same function has
    /// finished, so events for one UID apply in arrival order
    fn schedule<F>(&mut self, uid: Option<String>, work: F) -> Vec<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(uid) = uid else {
            return vec![tokio::spawn(work)];
        };
        let (done, finished) = oneshot::channel();
        let previous = self.pending.insert(uid, finished);
        vec![tokio::spawn(async move {
            if let Some(previous) = previous {
                // A panicked predecessor drops its sender; carry on either way
                let _ = previous.await;
            }
            work.await;
            let _ = done.send(());
        })]
    }
}

/// Watches Function resources in one namespace (or all of them)
pub struct FunctionWatcher {
    api: Api<Function>,
    scope: String,
    handler: FunctionEventHandler,
}

impl FunctionWatcher {
    pub fn new(client: Client, namespace: Option<&str>, handler: FunctionEventHandler) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        Self {
            api,
            scope: namespace.unwrap_or("all namespaces").to_string(),
            handler,
        }
    }

    /// Watch until the task is aborted, restarting the stream with a
    /// Fibonacci backoff whenever it fails
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Starting Function watcher for {}", self.scope);
        let mut backoff = FibonacciBackoff::new(1, 30);

        loop {
            match self.watch(&mut backoff).await {
                Ok(()) => warn!("Function watch stream for {} ended", self.scope),
                Err(e) => error!("Function watch for {} failed: {}", self.scope, e),
            }
            let delay = backoff.next_backoff();
            info!("Restarting Function watcher for {} in {:?}", self.scope, delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn watch(&mut self, backoff: &mut FibonacciBackoff) -> Result<(), ControllerError> {
        let mut stream = Box::pin(watcher(self.api.clone(), watcher::Config::default()));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("Watcher stream error: {}", e)))?
        {
            if matches!(event, watcher::Event::InitDone) {
                backoff.reset();
            }
            // Tasks report their own failures
            drop(self.handler.handle(event));
        }

        Ok(())
    }
}

/// Watches Secrets or ConfigMaps and refreshes the pods of functions that
/// mount a changed object
pub struct ReferenceWatcher<K> {
    api: Api<K>,
    kind: ReferenceKind,
    executor: Arc<ContainerExecutor>,
}

impl<K> ReferenceWatcher<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    pub fn new(client: Client, namespace: Option<&str>, kind: ReferenceKind, executor: Arc<ContainerExecutor>) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        Self { api, kind, executor }
    }

    /// Watch until the task is aborted, restarting the stream with a
    /// Fibonacci backoff whenever it fails
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Starting {} watcher", self.kind);
        let mut backoff = FibonacciBackoff::new(1, 30);

        loop {
            if let Err(e) = self.watch(&mut backoff).await {
                error!("{} watch failed: {}", self.kind, e);
            }
            tokio::time::sleep(backoff.next_backoff()).await;
        }
    }

    async fn watch(&self, backoff: &mut FibonacciBackoff) -> Result<(), ControllerError> {
        let mut stream = Box::pin(watcher(self.api.clone(), watcher::Config::default()));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("Watcher stream error: {}", e)))?
        {
            match event {
                // Only changes after the initial list roll pods
                watcher::Event::Apply(object) => {
                    let namespace = object.namespace().unwrap_or_default();
                    let name = object.name_any();
                    debug!("{} {}/{} changed", self.kind, namespace, name);
                    let executor = Arc::clone(&self.executor);
                    let kind = self.kind;
                    tokio::spawn(async move {
                        if let Err(e) = executor.refresh_functions_referencing(kind, &namespace, &name).await {
                            warn!("Error refreshing functions mounting {} {}/{}: {}", kind, namespace, name, e);
                        }
                    });
                }
                watcher::Event::InitDone => backoff.reset(),
                _ => {}
            }
        }

        Ok(())
    }
}
