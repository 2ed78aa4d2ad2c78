//! In-memory [`ObjectStore`] for tests
//!
//! Behaves like the API server for the operations the applier uses, and adds
//! knobs for the failure modes reconcilers must survive: frozen (stale) list
//! results, injected one-shot errors, and server-side rewriting of what was
//! written.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::store::{ObjectStore, OwnedObject};
use crate::Error;

/// Store operation kinds, for counting and failure injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `list`
    List,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
}

struct State<T> {
    objects: BTreeMap<(String, String), T>,
    frozen: Option<Vec<T>>,
    counts: HashMap<StoreOp, usize>,
    fail_next: Vec<StoreOp>,
    next_version: u64,
}

/// Rewrites an object on its way into the store
pub type Admission<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Thread-safe in-memory object store
pub struct InMemoryStore<T> {
    state: Mutex<State<T>>,
    admission: Option<Admission<T>>,
}

impl<T: OwnedObject> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: OwnedObject> InMemoryStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                frozen: None,
                counts: HashMap::new(),
                fail_next: Vec::new(),
                next_version: 1,
            }),
            admission: None,
        }
    }

    /// Pass every created or updated object through `admit` before storing
    /// it, the way the API server prunes unknown fields and fills defaults.
    pub fn with_admission(mut self, admit: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.admission = Some(Box::new(admit));
        self
    }

    fn admit(&self, mut object: T) -> T {
        if let Some(admit) = &self.admission {
            admit(&mut object);
        }
        object
    }

    /// Seed an object without counting it as a write
    pub fn insert(&self, object: T) {
        let mut state = self.state.lock();
        let key = (object.namespace().to_string(), object.name().to_string());
        state.objects.insert(key, object);
    }

    /// Fetch an object by namespace and name
    pub fn get(&self, namespace: &str, name: &str) -> Option<T> {
        self.state
            .lock()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// All stored objects in key order
    pub fn objects(&self) -> Vec<T> {
        self.state.lock().objects.values().cloned().collect()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times `op` has succeeded
    pub fn count(&self, op: StoreOp) -> usize {
        self.state.lock().counts.get(&op).copied().unwrap_or(0)
    }

    /// Total successful create/update/delete calls
    pub fn write_count(&self) -> usize {
        self.count(StoreOp::Create) + self.count(StoreOp::Update) + self.count(StoreOp::Delete)
    }

    /// Serve the current contents to every `list` until [`thaw_lists`](Self::thaw_lists)
    pub fn freeze_lists(&self) {
        let mut state = self.state.lock();
        state.frozen = Some(state.objects.values().cloned().collect());
    }

    /// Resume serving live contents from `list`
    pub fn thaw_lists(&self) {
        self.state.lock().frozen = None;
    }

    /// Make the next call of `op` fail with a transient store error
    pub fn fail_next(&self, op: StoreOp) {
        self.state.lock().fail_next.push(op);
    }

    fn begin(state: &mut State<T>, op: StoreOp) -> Result<(), Error> {
        if let Some(pos) = state.fail_next.iter().position(|o| *o == op) {
            state.fail_next.remove(pos);
            return Err(Error::store(
                format!("{op:?}").to_lowercase(),
                "injected failure",
            ));
        }
        Ok(())
    }

    fn finish(state: &mut State<T>, op: StoreOp) {
        *state.counts.entry(op).or_insert(0) += 1;
    }

    fn stamp_version(state: &mut State<T>, object: &mut T) {
        object.metadata_mut().resource_version = Some(state.next_version.to_string());
        state.next_version += 1;
    }
}

fn matches_selector<T: OwnedObject>(object: &T, selector: &str) -> bool {
    let labels = object.metadata().labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl<T: OwnedObject> ObjectStore<T> for InMemoryStore<T> {
    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<T>, Error> {
        let mut state = self.state.lock();
        Self::begin(&mut state, StoreOp::List)?;
        let source: Vec<T> = match &state.frozen {
            Some(snapshot) => snapshot.clone(),
            None => state.objects.values().cloned().collect(),
        };
        Self::finish(&mut state, StoreOp::List);
        Ok(source
            .into_iter()
            .filter(|o| o.namespace() == namespace && matches_selector(o, selector))
            .collect())
    }

    async fn create(&self, object: &T) -> Result<(), Error> {
        let mut state = self.state.lock();
        Self::begin(&mut state, StoreOp::Create)?;
        let key = (object.namespace().to_string(), object.name().to_string());
        if state.objects.contains_key(&key) {
            return Err(Error::conflict(
                T::KIND,
                &key.0,
                &key.1,
                "already exists",
            ));
        }
        let mut stored = self.admit(object.clone());
        Self::stamp_version(&mut state, &mut stored);
        state.objects.insert(key, stored);
        Self::finish(&mut state, StoreOp::Create);
        Ok(())
    }

    async fn update(&self, object: &T) -> Result<(), Error> {
        let mut state = self.state.lock();
        Self::begin(&mut state, StoreOp::Update)?;
        let key = (object.namespace().to_string(), object.name().to_string());
        let mut stored = self.admit(object.clone());
        Self::stamp_version(&mut state, &mut stored);
        // Server-side apply creates the object when missing
        state.objects.insert(key, stored);
        Self::finish(&mut state, StoreOp::Update);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock();
        Self::begin(&mut state, StoreOp::Delete)?;
        state
            .objects
            .remove(&(namespace.to_string(), name.to_string()));
        Self::finish(&mut state, StoreOp::Delete);
        Ok(())
    }
}
