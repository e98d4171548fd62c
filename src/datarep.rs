//! Data representations: lazy, cached handles on server resources.
//!
//! A [`DataRep`] is bound to one URI. Its data is fetched on first use and
//! cached until refreshed or replaced by a mutating call. Fragments made by
//! [`DataRep::at`] and [`DataRep::index`] address a piece of the same data
//! and share the cache of the representation they came from.
//!
//! At most one fetch is in flight per URI: concurrent readers wait on the
//! leader's outcome through a `watch` channel. A leader whose future is
//! dropped publishes `CallError::Cancelled` to its waiters and leaves the
//! representation retryable.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::catalog::ResourceDef;
use crate::connection::{Call, Connection, Target};
use crate::error::{CallError, Error, ResolutionError, SchemaError};
use crate::link::CompiledLink;
use crate::pointer::Pointer;
use crate::relation::CompiledRelation;
use crate::schema::{SchemaRef, TypeDef, TypeSlot};
use crate::service::Runtime;
use crate::types::{json_type_name, scalar_text, Kind, Vars, FULL_RELATION};

/// Observable fetch state of a representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Unfetched,
    Fetching,
    Fresh,
    Error,
    Deleted,
}

type Outcome = Option<Result<Arc<Value>, CallError>>;

#[derive(Clone)]
enum Slot {
    Unfetched,
    Fetching(watch::Receiver<Outcome>),
    Fresh(Arc<Value>),
    Failed(CallError),
    Deleted,
}

struct Cache {
    slot: Slot,
    /// Bumped on every cache replacement.
    generation: u64,
    relations: HashMap<String, DataRep>,
}

struct Root {
    runtime: Runtime,
    resource: Option<Arc<ResourceDef>>,
    connection: Arc<Connection>,
    vars: Vars,
    params: Vars,
    url: String,
    cache: Mutex<Cache>,
}

enum Begin {
    Ready(Arc<Value>),
    Wait(watch::Receiver<Outcome>),
    Lead(FetchTicket),
}

/// Leadership of one `Fetching` period.
///
/// Dropping the ticket without finishing it cancels the period.
struct FetchTicket {
    root: Arc<Root>,
    tx: Option<watch::Sender<Outcome>>,
}

impl FetchTicket {
    fn finish(mut self, result: Result<Value, CallError>) -> Result<Arc<Value>, CallError> {
        let result = result.map(Arc::new);
        {
            let mut cache = self.root.cache.lock();
            match &result {
                Ok(data) => {
                    cache.slot = Slot::Fresh(data.clone());
                    cache.generation += 1;
                    cache.relations.clear();
                    debug!(uri = %self.root.url, generation = cache.generation, "cache replaced");
                }
                Err(error) => {
                    cache.slot = Slot::Failed(error.clone());
                    debug!(uri = %self.root.url, %error, "fetch failed");
                }
            }
        }
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(result.clone()));
        }
        result
    }

    fn finish_deleted(mut self) {
        {
            let mut cache = self.root.cache.lock();
            cache.slot = Slot::Deleted;
            cache.generation += 1;
            cache.relations.clear();
        }
        debug!(uri = %self.root.url, "deleted");
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(Ok(Arc::new(Value::Null))));
        }
    }

    /// Put back the state from before the period, for a call that failed
    /// without affecting the cache.
    fn restore(mut self, previous: Slot, error: CallError) {
        let outcome = match &previous {
            Slot::Fresh(data) => Ok(data.clone()),
            _ => Err(error),
        };
        self.root.cache.lock().slot = previous;
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome));
        }
    }
}

impl Drop for FetchTicket {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let error = CallError::Cancelled {
                uri: self.root.url.clone(),
            };
            self.root.cache.lock().slot = Slot::Failed(error.clone());
            warn!(uri = %self.root.url, "in-flight fetch cancelled");
            tx.send_replace(Some(Err(error)));
        }
    }
}

async fn wait(mut rx: watch::Receiver<Outcome>, uri: &str) -> Result<Arc<Value>, CallError> {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if rx.changed().await.is_err() {
            let last = rx.borrow().clone();
            return last.unwrap_or_else(|| {
                Err(CallError::Cancelled {
                    uri: uri.to_string(),
                })
            });
        }
    }
}

impl Root {
    fn resource(&self) -> Result<&Arc<ResourceDef>, ResolutionError> {
        self.resource
            .as_ref()
            .ok_or_else(|| ResolutionError::NotBindable {
                resource: self.url.clone(),
            })
    }

    fn fresh(&self) -> Option<Arc<Value>> {
        match &self.cache.lock().slot {
            Slot::Fresh(data) => Some(data.clone()),
            _ => None,
        }
    }

    fn begin(self: &Arc<Self>, force: bool) -> Begin {
        let mut cache = self.cache.lock();
        match &cache.slot {
            Slot::Fresh(data) if !force => return Begin::Ready(data.clone()),
            Slot::Fetching(rx) => return Begin::Wait(rx.clone()),
            _ => {}
        }
        let (tx, rx) = watch::channel(None);
        cache.slot = Slot::Fetching(rx);
        debug!(uri = %self.url, "fetching");
        Begin::Lead(FetchTicket {
            root: self.clone(),
            tx: Some(tx),
        })
    }

    /// Lead a new period once any in-flight fetch has settled.
    async fn exclusive(self: &Arc<Self>) -> (FetchTicket, Slot) {
        loop {
            let pending = {
                let mut cache = self.cache.lock();
                match &cache.slot {
                    Slot::Fetching(rx) => rx.clone(),
                    _ => {
                        let (tx, rx) = watch::channel(None);
                        let previous = std::mem::replace(&mut cache.slot, Slot::Fetching(rx));
                        let ticket = FetchTicket {
                            root: self.clone(),
                            tx: Some(tx),
                        };
                        return (ticket, previous);
                    }
                }
            };
            let _ = wait(pending, &self.url).await;
        }
    }

    fn store_fresh(&self, data: Value) {
        let mut cache = self.cache.lock();
        cache.slot = Slot::Fresh(Arc::new(data));
        cache.generation += 1;
        cache.relations.clear();
    }

    /// Generation the given data belongs to, if it is still the cached one.
    fn generation_of(&self, data: Option<&Arc<Value>>) -> Option<u64> {
        let cache = self.cache.lock();
        match (data, &cache.slot) {
            (None, _) => Some(cache.generation),
            (Some(data), Slot::Fresh(current)) if Arc::ptr_eq(data, current) => Some(cache.generation),
            _ => None,
        }
    }

    fn remembered(&self, key: &str, generation: Option<u64>) -> Option<DataRep> {
        let cache = self.cache.lock();
        if generation != Some(cache.generation) {
            return None;
        }
        cache.relations.get(key).cloned()
    }

    fn remember(&self, key: String, generation: Option<u64>, rep: DataRep) {
        let mut cache = self.cache.lock();
        if generation == Some(cache.generation) {
            cache.relations.insert(key, rep);
        }
    }

    /// Resolve `link` into a call against this root's URI variables.
    fn prepare(
        &self,
        resource: &ResourceDef,
        link: &CompiledLink,
        payload: Option<&Value>,
        with_params: bool,
    ) -> Result<Call, ResolutionError> {
        let config = self.runtime.config();
        let method = link.method(resource.id())?;
        let document = resource.document();
        let root = config
            .path_root
            .expand(document.name(), document.version(), self.connection.instance());
        let path = link.path().expand(&root, &self.vars)?;

        let mut query: Vec<(String, String)> = Vec::new();
        if with_params {
            query.extend(self.params.iter().map(|(k, v)| (k.clone(), query_text(v))));
        }

        let mut body = None;
        if let Some(payload) = payload {
            if config.validate_requests {
                link.request_shape()
                    .check(payload)
                    .map_err(|errors| ResolutionError::InvalidPayload {
                        link: link.name().to_string(),
                        errors,
                    })?;
            }
            if method.carries_body() {
                body = Some(payload.clone());
            } else {
                match payload {
                    Value::Object(map) => {
                        query.extend(map.iter().map(|(k, v)| (k.clone(), query_text(v))));
                    }
                    Value::Null => {}
                    other => {
                        return Err(ResolutionError::InvalidPayload {
                            link: link.name().to_string(),
                            errors: vec![SchemaError {
                                path: String::new(),
                                message: format!(
                                    "{} payload cannot travel as query parameters",
                                    json_type_name(other)
                                ),
                            }],
                        })
                    }
                }
            }
        }

        let response_shape = config.validate_responses.then(|| {
            if link.response().is_none() && link.name() == "get" {
                resource.shape().clone()
            } else {
                link.response_shape().clone()
            }
        });

        Ok(Call {
            method,
            url: format!("{}{}", self.connection.host(), path),
            query,
            body,
            response_shape,
        })
    }
}

fn query_text(value: &Value) -> String {
    scalar_text(value).unwrap_or_else(|| value.to_string())
}

/// A handle on the data at one URI, or on a fragment of it.
#[derive(Clone)]
pub struct DataRep {
    root: Arc<Root>,
    pointer: Pointer,
    def: Arc<TypeDef>,
    /// Set when this fragment's schema is a reference.
    reference: Option<SchemaRef>,
}

impl DataRep {
    /// Representation of `resource` at the URI its `self` path gives `vars`.
    pub(crate) fn bound(
        runtime: Runtime,
        resource: Arc<ResourceDef>,
        vars: Vars,
        params: Vars,
        connection: Arc<Connection>,
    ) -> Result<Self, ResolutionError> {
        let template = resource
            .self_path()
            .ok_or_else(|| ResolutionError::NotBindable {
                resource: resource.id().to_string(),
            })?;
        let document = resource.document();
        let root = runtime.config().path_root.expand(
            document.name(),
            document.version(),
            connection.instance(),
        );
        let url = format!("{}{}", connection.host(), template.expand(&root, &vars)?);
        let def = resource.def().clone();

        Ok(Self::with_root(
            Root {
                runtime,
                resource: Some(resource),
                connection,
                vars,
                params,
                url,
                cache: Mutex::new(Cache {
                    slot: Slot::Unfetched,
                    generation: 0,
                    relations: HashMap::new(),
                }),
            },
            def,
        ))
    }

    fn with_root(root: Root, def: Arc<TypeDef>) -> Self {
        Self {
            root: Arc::new(root),
            pointer: Pointer::root(),
            def,
            reference: None,
        }
    }

    fn fragment(&self, pointer: Pointer, def: Arc<TypeDef>, reference: Option<SchemaRef>) -> Self {
        Self {
            root: self.root.clone(),
            pointer,
            def,
            reference,
        }
    }

    /// Absolute URI of the underlying resource.
    pub fn uri(&self) -> &str {
        &self.root.url
    }

    /// Pointer of this fragment inside the resource's data.
    pub fn fragment_pointer(&self) -> &Pointer {
        &self.pointer
    }

    pub fn is_fragment(&self) -> bool {
        !self.pointer.is_root()
    }

    /// Resource this representation was bound to; detached results have none.
    pub fn resource(&self) -> Option<&Arc<ResourceDef>> {
        self.root.resource.as_ref()
    }

    /// Definition of the data this handle addresses.
    pub fn def(&self) -> &Arc<TypeDef> {
        &self.def
    }

    /// Path variables the URI was built from.
    pub fn vars(&self) -> &Vars {
        &self.root.vars
    }

    /// Query parameters sent with every fetch.
    pub fn params(&self) -> &Vars {
        &self.root.params
    }

    pub fn target(&self) -> &Target {
        self.root.connection.target()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.root.connection
    }

    pub fn state(&self) -> FetchState {
        match &self.root.cache.lock().slot {
            Slot::Unfetched => FetchState::Unfetched,
            Slot::Fetching(_) => FetchState::Fetching,
            Slot::Fresh(_) => FetchState::Fresh,
            Slot::Failed(_) => FetchState::Error,
            Slot::Deleted => FetchState::Deleted,
        }
    }

    /// Cached data at this fragment, without any network access.
    pub fn cached(&self) -> Option<Value> {
        let data = self.root.fresh()?;
        self.pointer.get(&data).cloned()
    }

    /// The data, fetched if it is not cached.
    ///
    /// # Errors
    ///
    /// Returns `CallError`s from the fetch (shared with every coalesced
    /// caller), and `FragmentNotFound` when the fetched data has nothing at
    /// this fragment.
    pub async fn get(&self) -> Result<Value, Error> {
        let data = self.load(false).await?;
        Ok(self.extract(&data)?)
    }

    /// Fetch again, even if cached.
    pub async fn refresh(&self) -> Result<Value, Error> {
        let data = self.load(true).await?;
        Ok(self.extract(&data)?)
    }

    async fn load(&self, force: bool) -> Result<Arc<Value>, Error> {
        if !force {
            if let Some(data) = self.root.fresh() {
                return Ok(data);
            }
        }
        let resource = self.root.resource()?;
        let call = self.root.prepare(resource, resource.link("get")?, None, true)?;

        match self.root.begin(force) {
            Begin::Ready(data) => Ok(data),
            Begin::Wait(rx) => Ok(wait(rx, &self.root.url).await?),
            Begin::Lead(ticket) => {
                let result = self.root.connection.call(&call).await;
                Ok(ticket.finish(result)?)
            }
        }
    }

    fn extract(&self, data: &Value) -> Result<Value, ResolutionError> {
        self.pointer
            .get(data)
            .cloned()
            .ok_or_else(|| ResolutionError::FragmentNotFound {
                uri: self.root.url.clone(),
                pointer: self.pointer.to_string(),
            })
    }

    /// Call link `name` of the resource with an optional payload.
    ///
    /// When the link answers with the resource itself the cache is replaced
    /// and this representation is returned; otherwise the answer comes back
    /// as a detached representation and the cache is left alone. An answer
    /// naming another identity of the same resource is returned bound at
    /// that identity, leaving this representation as it was.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchLink`/`NoMethod` for links that cannot be called,
    /// `InvalidPayload` for a payload of the wrong shape, or the call's
    /// failure.
    pub async fn invoke(&self, name: &str, payload: Option<Value>) -> Result<DataRep, Error> {
        let resource = self.root.resource()?.clone();
        let link = resource.link(name)?.clone();
        let call = self.root.prepare(&resource, &link, payload.as_ref(), false)?;

        if !link.updates(resource.id()) {
            let value = self.root.connection.call(&call).await?;
            return self.detached(&resource, &link, &call, value);
        }

        // An empty answer is followed by a fetch so the cache stays current.
        let refetch = match resource.link("get") {
            Ok(get) => Some(self.root.prepare(&resource, get, None, true)?),
            Err(_) => None,
        };

        let (ticket, previous) = self.root.exclusive().await;
        let mut result = self.root.connection.call(&call).await;
        let empty = matches!(result, Ok(Value::Null));
        if let (true, Some(refetch)) = (empty, &refetch) {
            result = self.root.connection.call(refetch).await;
        }

        let moved = match &result {
            Ok(value) => identity_from(&resource, value).filter(|vars| !same_identity(vars, &self.root.vars)),
            Err(_) => None,
        };
        match (moved, result) {
            (Some(vars), Ok(value)) => {
                debug!(uri = %self.root.url, link = name, "update answered for another identity");
                ticket.restore(
                    previous,
                    CallError::Cancelled {
                        uri: self.root.url.clone(),
                    },
                );
                self.rebound(resource, vars, value)
            }
            (_, result) => {
                ticket.finish(result)?;
                Ok(self.clone())
            }
        }
    }

    /// A new representation of `target` at `vars`, preloaded with `value`.
    fn rebound(&self, target: Arc<ResourceDef>, vars: Vars, value: Value) -> Result<DataRep, Error> {
        let rep = DataRep::bound(
            self.root.runtime.clone(),
            target,
            vars,
            Vars::new(),
            self.root.connection.clone(),
        )?;
        rep.root.store_fresh(value);
        Ok(rep)
    }

    fn detached(
        &self,
        resource: &ResourceDef,
        link: &CompiledLink,
        call: &Call,
        value: Value,
    ) -> Result<DataRep, Error> {
        let runtime = &self.root.runtime;
        let store = runtime.store();

        let (def, reference) = match link.response() {
            Some(TypeSlot::Ref { reference }) => {
                if let Some(target) = store.resource_at(reference) {
                    if let Some(vars) = identity_from(&target, &value) {
                        return self.rebound(target, vars, value);
                    }
                }
                (store.resolve(reference)?, Some(reference.clone()))
            }
            Some(TypeSlot::Inline(def)) => (Arc::new((**def).clone()), None),
            None => {
                let id = resource.id().nested(&format!("/links/{}/response", link.name()));
                (Arc::new(TypeDef::any(id)), None)
            }
        };

        let root = Root {
            runtime: runtime.clone(),
            resource: None,
            connection: self.root.connection.clone(),
            vars: Vars::new(),
            params: Vars::new(),
            url: call.url.clone(),
            cache: Mutex::new(Cache {
                slot: Slot::Fresh(Arc::new(value)),
                generation: 1,
                relations: HashMap::new(),
            }),
        };
        let mut rep = DataRep::with_root(root, def);
        rep.reference = reference;
        Ok(rep)
    }

    /// Replace the data with `payload` through the `set` link.
    ///
    /// On a fragment the payload replaces that piece of the resource's data
    /// and the whole resource is sent.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` for a representation bound with query parameters,
    /// or any error from [`DataRep::invoke`].
    pub async fn set(&self, payload: Value) -> Result<DataRep, Error> {
        if !self.root.params.is_empty() {
            return Err(ResolutionError::ReadOnly {
                uri: self.root.url.clone(),
            }
            .into());
        }
        if self.pointer.is_root() {
            return self.invoke("set", Some(payload)).await;
        }

        let data = self.load(false).await?;
        let mut whole = (*data).clone();
        self.pointer
            .set(&mut whole, payload)
            .map_err(|_| ResolutionError::FragmentNotFound {
                uri: self.root.url.clone(),
                pointer: self.pointer.to_string(),
            })?;
        self.invoke("set", Some(whole)).await?;
        Ok(self.clone())
    }

    /// Call the `create` link; the answer is usually the new resource.
    pub async fn create(&self, payload: Value) -> Result<DataRep, Error> {
        self.invoke("create", Some(payload)).await
    }

    /// Call the `delete` link. On success the representation is `Deleted`
    /// until fetched again.
    pub async fn delete(&self) -> Result<Value, Error> {
        let resource = self.root.resource()?.clone();
        let call = self.root.prepare(&resource, resource.link("delete")?, None, false)?;

        let (ticket, previous) = self.root.exclusive().await;
        match self.root.connection.call(&call).await {
            Ok(body) => {
                ticket.finish_deleted();
                Ok(body)
            }
            Err(error) => {
                ticket.restore(previous, error.clone());
                Err(error.into())
            }
        }
    }

    /// Follow relation `name` to the representation it targets.
    ///
    /// The target is built without any request of its own. Results are
    /// remembered until the cache is next replaced.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchRelation`, the fetch failure when the source data is
    /// needed, or the extraction failure from the relation.
    pub async fn relation(&self, name: &str) -> Result<DataRep, Error> {
        let runtime = &self.root.runtime;
        let relation = self.compiled_relation(name)?;
        let target = runtime.store().resource_at(relation.resource()).ok_or_else(|| {
            ResolutionError::NoSuchResource {
                document: relation.resource().document().to_string(),
                name: relation.resource().pointer().to_string(),
            }
        })?;

        let data = if relation.needs_data() {
            Some(self.load(false).await?)
        } else {
            None
        };
        let generation = self.root.generation_of(data.as_ref());
        let null = Value::Null;
        let identity = relation.evaluate(data.as_deref().unwrap_or(&null), &self.pointer, &target)?;

        let key = format!(
            "{}@{}|{}|{:?}|{:?}",
            name, self.pointer, identity, identity.host, identity.instance
        );
        if let Some(rep) = self.root.remembered(&key, generation) {
            return Ok(rep);
        }

        let connection = if identity.host.is_none() && identity.instance.is_none() {
            self.root.connection.clone()
        } else {
            let source = self.root.connection.target();
            runtime.manager().connection_for(
                identity.host.as_deref().unwrap_or(&source.host),
                identity.instance.as_deref().or(source.instance.as_deref()),
            )?
        };
        debug!(relation = name, target = %identity, host = %connection.target(), "relation resolved");

        let rep = DataRep::bound(runtime.clone(), target, identity.vars, identity.params, connection)?;
        self.root.remember(key, generation, rep.clone());
        Ok(rep)
    }

    fn compiled_relation(&self, name: &str) -> Result<Arc<CompiledRelation>, ResolutionError> {
        if self.pointer.is_root() {
            if let Some(relation) = self.resource().and_then(|r| r.relation(name)) {
                return Ok(relation.clone());
            }
        }
        if let Some(def) = self.def.relation(name) {
            return Ok(Arc::new(CompiledRelation::compile(def)));
        }
        if name == FULL_RELATION {
            if let Some(target) = self.full_target() {
                return Ok(Arc::new(CompiledRelation::implicit(name, &target)));
            }
        }
        Err(ResolutionError::NoSuchRelation {
            resource: self.def.id.to_string(),
            relation: name.to_string(),
        })
    }

    /// Resource an element refers to, when it has a canonical path.
    fn full_target(&self) -> Option<Arc<ResourceDef>> {
        let reference = self.reference.as_ref()?;
        let target = self.root.runtime.store().resource_at(reference)?;
        target.self_path()?;
        Some(target)
    }

    /// Fragment for member `property`.
    pub fn at(&self, property: &str) -> Result<DataRep, Error> {
        let (def, reference) = match self.def.property(property) {
            Some(p) => self.child_def(&p.schema)?,
            None if self.def.kind == Kind::Any => (self.any_child(property), None),
            None => {
                return Err(ResolutionError::NoSuchProperty {
                    resource: self.def.id.to_string(),
                    property: property.to_string(),
                }
                .into())
            }
        };
        Ok(self.fragment(self.pointer.child(property), def, reference))
    }

    /// Fragment for array element `index`.
    pub fn index(&self, index: usize) -> Result<DataRep, Error> {
        let (def, reference) = match &self.def.items {
            Some(slot) => self.child_def(slot)?,
            None if self.def.kind == Kind::Any => (self.any_child("items"), None),
            None => {
                return Err(ResolutionError::NoSuchProperty {
                    resource: self.def.id.to_string(),
                    property: index.to_string(),
                }
                .into())
            }
        };
        Ok(self.fragment(self.pointer.child(index.to_string()), def, reference))
    }

    /// One fragment per element of the (fetched) array.
    pub async fn elements(&self) -> Result<Vec<DataRep>, Error> {
        let data = self.get().await?;
        let Value::Array(items) = data else {
            return Err(ResolutionError::FragmentNotFound {
                uri: self.root.url.clone(),
                pointer: format!("{}/0", self.pointer),
            }
            .into());
        };
        (0..items.len()).map(|i| self.index(i)).collect()
    }

    fn child_def(&self, slot: &TypeSlot) -> Result<(Arc<TypeDef>, Option<SchemaRef>), Error> {
        match slot {
            TypeSlot::Inline(def) => Ok((Arc::new((**def).clone()), None)),
            TypeSlot::Ref { reference } => Ok((
                self.root.runtime.store().resolve(reference)?,
                Some(reference.clone()),
            )),
        }
    }

    fn any_child(&self, segment: &str) -> Arc<TypeDef> {
        Arc::new(TypeDef::any(self.def.id.nested(&format!("/{}", segment))))
    }

    /// Names of the resource's links.
    pub fn links(&self) -> Vec<String> {
        self.resource()
            .map(|r| r.links().map(|l| l.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Names of the relations that can be followed from here.
    pub fn relations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.def.relations.keys().cloned().collect();
        if !names.iter().any(|n| n == FULL_RELATION) && self.full_target().is_some() {
            names.push(FULL_RELATION.to_string());
        }
        names
    }
}

/// Path variables of `target`'s `self` template, all read from `value`.
fn identity_from(target: &ResourceDef, value: &Value) -> Option<Vars> {
    target
        .self_path()?
        .variables()
        .into_iter()
        .map(|v| {
            let member = value.get(v).filter(|m| scalar_text(m).is_some())?;
            Some((v.to_string(), member.clone()))
        })
        .collect()
}

/// Whether two identities name the same URI.
fn same_identity(a: &Vars, b: &Vars) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(k, v)| b.get(k).is_some_and(|w| scalar_text(v) == scalar_text(w)))
}

impl fmt::Display for DataRep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pointer.is_root() {
            f.write_str(&self.root.url)
        } else {
            write!(f, "{}#{}", self.root.url, self.pointer)
        }
    }
}

impl fmt::Debug for DataRep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRep")
            .field("uri", &self.root.url)
            .field("fragment", &self.pointer.to_string())
            .field("def", &self.def.id.to_string())
            .field("state", &self.state())
            .finish()
    }
}
