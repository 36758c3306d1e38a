//! Common test utilities
//!
//! An in-memory [`ObjectStore`] that behaves like the API server where the
//! reconciler cares: resource versions, optimistic concurrency, not-found and
//! already-exists. Every call is recorded.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use vals_operator_provider::codec::{ManagedObject, ObjectKey, ResourceDescriptor};
use vals_operator_provider::store::{ObjectStore, Operation, StoreError};

/// One recorded store call; writes carry the version token they were sent with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(ObjectKey),
    Create(ObjectKey, Option<String>),
    Update(ObjectKey, Option<String>),
    Delete(ObjectKey),
}

type Slot = (&'static str, ObjectKey);

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<Slot, ManagedObject>>,
    calls: Mutex<Vec<Call>>,
    version: AtomicU64,
    fail_on: Mutex<Option<Operation>>,
    after_get: Mutex<Option<Arc<Barrier>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Put an object in place without recording a call.
    /// Its resource version is kept as given.
    pub fn seed(&self, descriptor: &ResourceDescriptor, object: ManagedObject) {
        self.objects
            .lock()
            .unwrap()
            .insert((descriptor.plural, object.key()), object);
    }

    /// Bump the version of a stored object, as a concurrent writer would
    pub fn touch(&self, descriptor: &ResourceDescriptor, key: &ObjectKey) -> String {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(descriptor.plural, key.clone()))
            .expect("object to touch");
        object.metadata.resource_version = Some(version.clone());
        version
    }

    pub fn stored(&self, descriptor: &ResourceDescriptor, key: &ObjectKey) -> Option<ManagedObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(descriptor.plural, key.clone()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Fail every call of `operation` with a transport error
    pub fn fail_on(&self, operation: Operation) {
        *self.fail_on.lock().unwrap() = Some(operation);
    }

    /// Hold every `get` at `barrier` after it has read the object
    pub fn pause_after_get(&self, barrier: Arc<Barrier>) {
        *self.after_get.lock().unwrap() = Some(barrier);
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn injected(
        &self,
        operation: Operation,
        descriptor: &ResourceDescriptor,
        key: &ObjectKey,
    ) -> Result<(), StoreError> {
        if *self.fail_on.lock().unwrap() == Some(operation) {
            return Err(StoreError::Transport {
                operation,
                kind: descriptor.kind,
                key: key.clone(),
                source: anyhow::anyhow!("connection reset by peer"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(
        &self,
        descriptor: &ResourceDescriptor,
        key: &ObjectKey,
    ) -> Result<ManagedObject, StoreError> {
        self.record(Call::Get(key.clone()));
        self.injected(Operation::Get, descriptor, key)?;

        let found = self.stored(descriptor, key);
        let barrier = self.after_get.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        found.ok_or_else(|| StoreError::NotFound {
            kind: descriptor.kind,
            key: key.clone(),
        })
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        object: &ManagedObject,
    ) -> Result<ManagedObject, StoreError> {
        let key = object.key();
        self.record(Call::Create(key.clone(), object.metadata.resource_version.clone()));
        self.injected(Operation::Create, descriptor, &key)?;

        let mut objects = self.objects.lock().unwrap();
        let slot = (descriptor.plural, key.clone());
        if objects.contains_key(&slot) {
            return Err(StoreError::AlreadyExists {
                kind: descriptor.kind,
                key,
            });
        }
        let mut stored = object.clone();
        stored.metadata.resource_version = Some(self.next_version());
        objects.insert(slot, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        object: &ManagedObject,
    ) -> Result<ManagedObject, StoreError> {
        let key = object.key();
        self.record(Call::Update(key.clone(), object.metadata.resource_version.clone()));
        self.injected(Operation::Update, descriptor, &key)?;

        let mut objects = self.objects.lock().unwrap();
        let slot = (descriptor.plural, key.clone());
        let Some(current) = objects.get(&slot) else {
            return Err(StoreError::NotFound {
                kind: descriptor.kind,
                key,
            });
        };
        if current.metadata.resource_version != object.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: descriptor.kind,
                key,
            });
        }
        let mut stored = object.clone();
        stored.metadata.resource_version = Some(self.next_version());
        objects.insert(slot, stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        key: &ObjectKey,
    ) -> Result<(), StoreError> {
        self.record(Call::Delete(key.clone()));
        self.injected(Operation::Delete, descriptor, key)?;

        self.objects
            .lock()
            .unwrap()
            .remove(&(descriptor.plural, key.clone()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: descriptor.kind,
                key: key.clone(),
            })
    }
}
