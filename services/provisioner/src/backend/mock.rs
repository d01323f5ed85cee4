//! In-memory compute backend for tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{BackendError, ComputeBackend, CreateInstanceRequest};
use crate::model::{Instance, InstanceStatus};

/// Mock backend with scriptable behavior and call recording.
///
/// Status sequences are scripted per flavor: every instance created with that
/// flavor walks the sequence one poll at a time and then stays on the last
/// entry. Instances without a script are `ACTIVE` on the first poll.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    instances: HashMap<String, MockInstance>,
    create_failures: HashMap<String, String>,
    status_scripts: HashMap<String, Vec<InstanceStatus>>,
    transient_lookup_errors: u32,
    next_ids: VecDeque<String>,
    fail_deletes: bool,
    create_calls: Vec<CreateInstanceRequest>,
    get_calls: Vec<String>,
    delete_calls: Vec<String>,
}

#[derive(Debug)]
struct MockInstance {
    instance: Instance,
    pending: VecDeque<InstanceStatus>,
}

impl MockBackend {
    /// Create a mock backend where every create succeeds and goes `ACTIVE`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every create for `flavor` with a backend rejection.
    pub fn fail_create(self, flavor: impl Into<String>, message: impl Into<String>) -> Self {
        self.state()
            .create_failures
            .insert(flavor.into(), message.into());
        self
    }

    /// Script the status sequence reported for instances of `flavor`.
    pub fn with_statuses(self, flavor: impl Into<String>, statuses: Vec<InstanceStatus>) -> Self {
        self.state().status_scripts.insert(flavor.into(), statuses);
        self
    }

    /// Issue these ids to the next creates, in order, before falling back to UUIDs.
    pub fn with_instance_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().next_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Fail the next `count` status lookups with a transport error.
    pub fn with_transient_lookup_errors(self, count: u32) -> Self {
        self.state().transient_lookup_errors = count;
        self
    }

    /// Fail every delete of an existing instance.
    pub fn fail_deletes(self) -> Self {
        self.state().fail_deletes = true;
        self
    }

    /// Seed an existing instance.
    pub fn with_instance(self, instance_id: impl Into<String>, status: InstanceStatus) -> Self {
        let instance_id = instance_id.into();
        let instance = Instance {
            instance_id: instance_id.clone(),
            name: instance_id.clone(),
            offering: String::new(),
            image_id: String::new(),
            metadata: Default::default(),
            user_data: None,
            status: status.clone(),
            created_at: Utc::now(),
        };
        self.state().instances.insert(
            instance_id,
            MockInstance {
                instance,
                pending: VecDeque::from([status]),
            },
        );
        self
    }

    /// Create requests received so far, oldest first.
    pub fn create_calls(&self) -> Vec<CreateInstanceRequest> {
        self.state().create_calls.clone()
    }

    /// Instance ids passed to status lookups so far.
    pub fn get_calls(&self) -> Vec<String> {
        self.state().get_calls.clone()
    }

    /// Instance ids passed to delete so far.
    pub fn delete_calls(&self) -> Vec<String> {
        self.state().delete_calls.clone()
    }

    /// Ids of instances that currently exist.
    pub fn instance_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().instances.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns a stored instance.
    pub fn instance(&self, instance_id: &str) -> Option<Instance> {
        self.state()
            .instances
            .get(instance_id)
            .map(|m| m.instance.clone())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ComputeBackend for MockBackend {
    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<Instance, BackendError> {
        let mut state = self.state();
        state.create_calls.push(request.clone());

        if let Some(message) = state.create_failures.get(&request.flavor) {
            return Err(BackendError::Rejected {
                status: 403,
                message: message.clone(),
            });
        }

        let instance_id = state
            .next_ids
            .pop_front()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            instance_id = %instance_id,
            flavor = %request.flavor,
            image_id = %request.image_id,
            "[MOCK] Creating instance"
        );

        let pending: VecDeque<InstanceStatus> = state
            .status_scripts
            .get(&request.flavor)
            .cloned()
            .unwrap_or_else(|| vec![InstanceStatus::Active])
            .into();

        let instance = Instance {
            instance_id: instance_id.clone(),
            name: request.name.clone(),
            offering: request.flavor.clone(),
            image_id: request.image_id.clone(),
            metadata: request.metadata.clone(),
            user_data: request.user_data.clone(),
            status: InstanceStatus::Build,
            created_at: Utc::now(),
        };
        state.instances.insert(
            instance_id,
            MockInstance {
                instance: instance.clone(),
                pending,
            },
        );

        Ok(instance)
    }

    async fn get_instance_status(&self, instance_id: &str) -> Result<InstanceStatus, BackendError> {
        let mut state = self.state();
        state.get_calls.push(instance_id.to_string());

        if state.transient_lookup_errors > 0 {
            state.transient_lookup_errors -= 1;
            return Err(BackendError::Transport("[MOCK] connection reset".to_string()));
        }

        let Some(entry) = state.instances.get_mut(instance_id) else {
            return Err(BackendError::NotFound(instance_id.to_string()));
        };

        let status = if entry.pending.len() > 1 {
            entry.pending.pop_front()
        } else {
            entry.pending.front().cloned()
        }
        .unwrap_or(InstanceStatus::Active);

        entry.instance.status = status.clone();
        debug!(instance_id, status = %status, "[MOCK] Reporting status");
        Ok(status)
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), BackendError> {
        let mut state = self.state();
        state.delete_calls.push(instance_id.to_string());

        if !state.instances.contains_key(instance_id) {
            return Err(BackendError::NotFound(instance_id.to_string()));
        }
        if state.fail_deletes {
            return Err(BackendError::Rejected {
                status: 500,
                message: "[MOCK] delete failed".to_string(),
            });
        }

        state.instances.remove(instance_id);
        info!(instance_id, "[MOCK] Deleted instance");
        Ok(())
    }
}
