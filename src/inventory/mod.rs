//! Resource lookup used by the engine, and an in-memory inventory.

use crate::invoke::{FacetLock, Target};
use crate::measurement::{MeasurementScheduleRequest, ResourceId, ScheduleId};
use crate::plugin::{Availability, Component};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Lifecycle state of a resource's component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    #[default]
    NotStarted,
    Started,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Platform,
    Server,
    #[default]
    Service,
}

/// A resource as seen by the engine at one point in time.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    pub id: ResourceId,
    pub resource_type: String,
    pub category: ResourceCategory,
    pub state: ComponentState,
    pub availability: Availability,
    pub component: Component,
    pub lock: Arc<FacetLock>,
}

impl ResourceHandle {
    /// Whether collecting from this resource can succeed.
    pub fn is_collectable(&self) -> bool {
        self.state == ComponentState::Started && self.availability != Availability::Down
    }

    pub fn target(&self) -> Target {
        Target::new(self.id, self.resource_type.clone(), self.lock.clone())
    }
}

/// Read access to resources, plus storage of their measurement schedules.
pub trait ResourceLookup: Send + Sync {
    fn resource(&self, id: ResourceId) -> Option<ResourceHandle>;

    /// Replace (`merge == false`) or merge the stored schedules of a
    /// resource. Returns false if the resource is unknown.
    fn store_schedules(
        &self,
        _id: ResourceId,
        _requests: &[MeasurementScheduleRequest],
        _merge: bool,
    ) -> bool {
        true
    }

    /// Every resource's stored schedules.
    fn stored_schedules(&self) -> Vec<(ResourceId, Vec<MeasurementScheduleRequest>)> {
        Vec::new()
    }

    /// Record the result of an availability check.
    fn set_availability(&self, _id: ResourceId, _availability: Availability) {}
}

/// A resource to register with an [`Inventory`].
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub resource_type: String,
    pub name: String,
    pub category: ResourceCategory,
    pub state: ComponentState,
    pub availability: Availability,
    pub component: Component,
}

impl Resource {
    pub fn new(id: ResourceId, resource_type: impl Into<String>, component: Component) -> Self {
        let resource_type = resource_type.into();
        Self {
            id,
            name: format!("{resource_type} {id}"),
            resource_type,
            category: ResourceCategory::default(),
            state: ComponentState::Started,
            availability: Availability::Up,
            component,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_category(mut self, category: ResourceCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_state(mut self, state: ComponentState) -> Self {
        self.state = state;
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }
}

struct Entry {
    resource: Resource,
    lock: Arc<FacetLock>,
    schedules: BTreeMap<ScheduleId, MeasurementScheduleRequest>,
}

/// Thread-safe in-memory inventory.
#[derive(Default)]
pub struct Inventory {
    resources: RwLock<HashMap<ResourceId, Entry>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a resource. Stored schedules and the facet lock of an
    /// existing resource are kept.
    pub fn register(&self, resource: Resource) {
        let mut resources = self.resources.write();
        match resources.get_mut(&resource.id) {
            Some(entry) => entry.resource = resource,
            None => {
                resources.insert(
                    resource.id,
                    Entry {
                        resource,
                        lock: Arc::new(FacetLock::new()),
                        schedules: BTreeMap::new(),
                    },
                );
            }
        }
    }

    pub fn remove(&self, id: ResourceId) -> bool {
        self.resources.write().remove(&id).is_some()
    }

    pub fn set_state(&self, id: ResourceId, state: ComponentState) {
        if let Some(entry) = self.resources.write().get_mut(&id) {
            entry.resource.state = state;
        }
    }

    pub fn ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.resources.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn schedules(&self, id: ResourceId) -> Option<Vec<MeasurementScheduleRequest>> {
        self.resources
            .read()
            .get(&id)
            .map(|entry| entry.schedules.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }
}

impl ResourceLookup for Inventory {
    fn resource(&self, id: ResourceId) -> Option<ResourceHandle> {
        self.resources.read().get(&id).map(|entry| ResourceHandle {
            id,
            resource_type: entry.resource.resource_type.clone(),
            category: entry.resource.category,
            state: entry.resource.state,
            availability: entry.resource.availability,
            component: entry.resource.component.clone(),
            lock: entry.lock.clone(),
        })
    }

    fn store_schedules(
        &self,
        id: ResourceId,
        requests: &[MeasurementScheduleRequest],
        merge: bool,
    ) -> bool {
        let mut resources = self.resources.write();
        let Some(entry) = resources.get_mut(&id) else {
            return false;
        };

        if !merge {
            entry.schedules.clear();
        }

        for request in requests {
            entry
                .schedules
                .insert(request.schedule_id(), request.clone());
        }

        true
    }

    fn stored_schedules(&self) -> Vec<(ResourceId, Vec<MeasurementScheduleRequest>)> {
        let resources = self.resources.read();
        let mut stored: Vec<_> = resources
            .iter()
            .filter(|(_, entry)| !entry.schedules.is_empty())
            .map(|(id, entry)| (*id, entry.schedules.values().cloned().collect()))
            .collect();
        stored.sort_by_key(|(id, _)| *id);
        stored
    }

    fn set_availability(&self, id: ResourceId, availability: Availability) {
        if let Some(entry) = self.resources.write().get_mut(&id) {
            entry.resource.availability = availability;
        }
    }
}
