//! Scripted in-memory adapter shared by the integration tests

#![allow(dead_code)]

use reconciler::{
    AdapterError, AdapterRegistry, ObservedState, ProviderAdapter, ResourceDecl, ResourceId,
    ResourceKind, RetryPolicy, RunOptions, Spec,
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Read,
    Create,
    Update,
    Delete,
}

/// One scripted behaviour, consumed by the next matching call
#[derive(Debug, Clone)]
pub enum Fault {
    Fail(AdapterError),
    Sleep(Duration),
}

/// Adapter backed by a map, with a call log and per-call fault scripts
#[derive(Default)]
pub struct Scripted {
    objects: Mutex<HashMap<ResourceId, Spec>>,
    faults: Mutex<HashMap<(Op, ResourceId), VecDeque<Fault>>>,
    calls: Mutex<Vec<(Op, ResourceId)>>,
    /// "start <id>" / "end <id>" markers for mutating calls
    events: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Scripted {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, id: &ResourceId, spec: Spec) {
        self.objects.lock().unwrap().insert(id.clone(), spec);
    }

    pub fn object(&self, id: &ResourceId) -> Option<Spec> {
        self.objects.lock().unwrap().get(id).cloned()
    }

    pub fn script(&self, op: Op, id: &ResourceId, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .entry((op, id.clone()))
            .or_default()
            .push_back(fault);
    }

    pub fn fail(&self, op: Op, id: &ResourceId, err: AdapterError) {
        self.script(op, id, Fault::Fail(err));
    }

    pub fn fail_times(&self, op: Op, id: &ResourceId, err: &AdapterError, times: usize) {
        for _ in 0..times {
            self.fail(op, id, err.clone());
        }
    }

    pub fn calls(&self) -> Vec<(Op, ResourceId)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: Op, id: &ResourceId) -> usize {
        self.calls()
            .iter()
            .filter(|(o, i)| *o == op && i == id)
            .count()
    }

    /// Ids of every call of `op`, in call order
    pub fn order_of(&self, op: Op) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, id)| id.name)
            .collect()
    }

    pub fn mutations(&self) -> usize {
        self.calls().iter().filter(|(op, _)| *op != Op::Read).count()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
    }

    fn enter(&self, op: Op, id: &ResourceId) -> Result<(), AdapterError> {
        self.calls.lock().unwrap().push((op, id.clone()));
        let fault = self
            .faults
            .lock()
            .unwrap()
            .get_mut(&(op, id.clone()))
            .and_then(VecDeque::pop_front);
        match fault {
            Some(Fault::Fail(err)) => Err(err),
            Some(Fault::Sleep(d)) => {
                thread::sleep(d);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn mutate<T>(&self, op: Op, id: &ResourceId, apply: impl FnOnce(&Self) -> T) -> Result<T, AdapterError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("start {}", id.name));

        let result = self.enter(op, id).map(|()| apply(self));

        self.events.lock().unwrap().push(format!("end {}", id.name));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ProviderAdapter for Scripted {
    fn read(&self, id: &ResourceId) -> Result<Option<ObservedState>, AdapterError> {
        self.enter(Op::Read, id)?;
        Ok(self.object(id).map(|spec| {
            ObservedState::new(spec).with_provider_id(format!("p-{}", id.name))
        }))
    }

    fn create(&self, id: &ResourceId, spec: &Spec) -> Result<String, AdapterError> {
        self.mutate(Op::Create, id, |s| {
            s.insert(id, spec.clone());
            format!("p-{}", id.name)
        })
    }

    fn update(&self, id: &ResourceId, spec: &Spec) -> Result<(), AdapterError> {
        self.mutate(Op::Update, id, |s| s.insert(id, spec.clone()))
    }

    fn delete(&self, id: &ResourceId) -> Result<(), AdapterError> {
        self.mutate(Op::Delete, id, |s| {
            s.objects.lock().unwrap().remove(id);
        })
    }
}

/// Registry serving every resource family from one scripted adapter
pub fn registry(adapter: &Arc<Scripted>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for kind in ResourceKind::ALL {
        registry.register(kind, adapter.clone());
    }
    registry
}

/// Fast retries, no timeout
pub fn options() -> RunOptions {
    RunOptions {
        jobs: 4,
        retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        action_timeout: None,
        ..Default::default()
    }
}

pub fn cloud(name: &str) -> ResourceId {
    ResourceId::new(ResourceKind::CloudObject, name)
}

/// `net` <- `db` <- `app`
pub fn chain() -> Vec<ResourceDecl> {
    vec![
        ResourceDecl::new(ResourceKind::CloudObject, "net", json!({"cidr": "10.0.0.0/16"})),
        ResourceDecl::new(ResourceKind::CloudObject, "db", json!({"engine": "postgres"}))
            .depends_on(cloud("net")),
        ResourceDecl::new(ResourceKind::CloudObject, "app", json!({"replicas": 2}))
            .depends_on(cloud("db")),
    ]
}
