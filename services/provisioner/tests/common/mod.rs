//! Shared fixtures for provisioner integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use stratus_events::RecordingSink;
use stratus_provisioner::{
    CloudProvider, InMemoryNodeClassStore, InstanceProvider, InstanceSettings, MockBackend,
    NodeClass, StaticCatalog,
};
use stratus_reconcile::PollSpec;
use stratus_scheduling::labels::LABEL_INSTANCE_TYPE;
use stratus_scheduling::resources::{CPU, MEMORY};
use stratus_scheduling::{
    LabelConfig, Offering, Quantity, Requirement, RequirementMatcher, ResourceList,
    UndefinedLabelPolicy,
};

pub const NODE_CLASS: &str = "default";

/// A reconciler wired to in-memory collaborators.
pub struct Harness {
    pub provider: CloudProvider,
    pub backend: Arc<MockBackend>,
    pub events: Arc<RecordingSink>,
}

pub struct HarnessBuilder {
    backend: MockBackend,
    offerings: Vec<Offering>,
    classes: Vec<NodeClass>,
    settings: InstanceSettings,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            backend: MockBackend::new(),
            offerings: vec![offering("tiny", 1, 2), offering("small", 2, 4)],
            classes: vec![NodeClass::new(NODE_CLASS).with_image("img-1")],
            settings: InstanceSettings {
                cluster_name: "test".to_string(),
                poll: PollSpec::new(Duration::from_millis(5), Duration::from_millis(100)),
                ..InstanceSettings::default()
            },
        }
    }

    pub fn backend(mut self, backend: MockBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn offerings(mut self, offerings: Vec<Offering>) -> Self {
        self.offerings = offerings;
        self
    }

    pub fn no_classes(mut self) -> Self {
        self.classes.clear();
        self
    }

    pub fn poll(mut self, poll: PollSpec) -> Self {
        self.settings.poll = poll;
        self
    }

    pub fn cleanup_on_failure(mut self, enabled: bool) -> Self {
        self.settings.cleanup_on_failure = enabled;
        self
    }

    pub fn build(self) -> Harness {
        let backend = Arc::new(self.backend);
        let events = Arc::new(RecordingSink::new());
        let provider = CloudProvider::new(
            Arc::new(self.classes.into_iter().collect::<InMemoryNodeClassStore>()),
            Arc::new(StaticCatalog::new(self.offerings)),
            InstanceProvider::new(backend.clone(), self.settings),
            RequirementMatcher::new(LabelConfig::default(), UndefinedLabelPolicy::Allow),
            events.clone(),
        );
        Harness {
            provider,
            backend,
            events,
        }
    }
}

/// An offering named `name` with `cpu` cores and `mem_gib` GiB of memory.
pub fn offering(name: &str, cpu: i64, mem_gib: i64) -> Offering {
    Offering::new(
        name,
        ResourceList::new()
            .with(CPU, Quantity::from_units(cpu))
            .with(MEMORY, Quantity::from_gibibytes(mem_gib)),
    )
    .with_requirement(Requirement::in_values(LABEL_INSTANCE_TYPE, [name]))
}
