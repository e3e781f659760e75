//! Tracking registry
//!
//! Records which targets are tracked under which display name, which methods
//! are frame boundaries, and how many instances of each tracked type are
//! alive. Type-level registrations act as a shared template for every
//! instance; instance-level registrations override them for one instance.

use crate::frames::REMAINING_CLASS;
use std::any::TypeId;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Identity of one `Tracked<T>` instance within a profiler
pub type InstanceId = u64;

/// Which methods of a target are tracked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    All,
    Only(BTreeSet<&'static str>),
}

impl MethodFilter {
    pub fn includes(&self, method: &str) -> bool {
        match self {
            MethodFilter::All => true,
            MethodFilter::Only(methods) => methods.contains(method),
        }
    }

    /// Widen this filter so it also covers `other`
    fn merge(&mut self, other: MethodFilter) {
        match (&mut *self, other) {
            (MethodFilter::All, _) => {}
            (_, MethodFilter::All) => *self = MethodFilter::All,
            (MethodFilter::Only(mine), MethodFilter::Only(theirs)) => mine.extend(theirs),
        }
    }
}

#[derive(Debug, Clone)]
struct Registration {
    display: String,
    methods: MethodFilter,
}

#[derive(Debug, Clone)]
struct InstanceRegistration {
    type_id: TypeId,
    registration: Registration,
}

/// What the registry knows about one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Display name when the method is tracked for stats
    pub tracked_as: Option<String>,
    pub boundary: bool,
}

#[derive(Debug)]
pub struct TrackingRegistry {
    names: Vec<String>,
    by_type: HashMap<TypeId, Registration>,
    by_instance: HashMap<InstanceId, InstanceRegistration>,
    boundaries: HashSet<(TypeId, &'static str)>,
    live: HashMap<TypeId, HashSet<InstanceId>>,
}

impl Default for TrackingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self {
            names: vec![REMAINING_CLASS.to_string()],
            by_type: HashMap::new(),
            by_instance: HashMap::new(),
            boundaries: HashSet::new(),
            live: HashMap::new(),
        }
    }

    /// Register a type as a template
    ///
    /// Re-registering is idempotent: the first display name is kept and the
    /// method filters are merged.
    pub fn track_type(&mut self, type_id: TypeId, name: &str, methods: MethodFilter) {
        match self.by_type.get_mut(&type_id) {
            Some(existing) => {
                if existing.display != name {
                    debug!(
                        kept = %existing.display,
                        ignored = %name,
                        "type already tracked under another name"
                    );
                }
                existing.methods.merge(methods);
            }
            None => {
                debug!(class = %name, "tracking type");
                self.by_type.insert(
                    type_id,
                    Registration {
                        display: name.to_string(),
                        methods,
                    },
                );
                self.push_name(name);
            }
        }
    }

    /// Register a single instance, overriding its type's registration
    pub fn track_instance(
        &mut self,
        type_id: TypeId,
        instance: InstanceId,
        name: &str,
        methods: MethodFilter,
    ) {
        match self.by_instance.get_mut(&instance) {
            Some(existing) => existing.registration.methods.merge(methods),
            None => {
                debug!(class = %name, instance, "tracking instance");
                self.by_instance.insert(
                    instance,
                    InstanceRegistration {
                        type_id,
                        registration: Registration {
                            display: name.to_string(),
                            methods,
                        },
                    },
                );
                self.push_name(name);
            }
        }
    }

    pub fn define_boundary(&mut self, type_id: TypeId, method: &'static str) {
        self.boundaries.insert((type_id, method));
    }

    /// Remove every registration made for a type, instance overrides included
    pub fn clear_type(&mut self, type_id: TypeId) {
        self.by_type.remove(&type_id);
        self.by_instance.retain(|_, r| r.type_id != type_id);
        self.boundaries.retain(|(t, _)| *t != type_id);
    }

    pub fn clear_instance(&mut self, instance: InstanceId) {
        self.by_instance.remove(&instance);
    }

    pub fn is_type_tracked(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    pub fn resolve(&self, type_id: TypeId, instance: InstanceId, method: &str) -> Resolution {
        let registration = self
            .by_instance
            .get(&instance)
            .map(|r| &r.registration)
            .or_else(|| self.by_type.get(&type_id));
        let tracked_as = registration
            .filter(|r| r.methods.includes(method))
            .map(|r| r.display.clone());
        let boundary = self
            .boundaries
            .iter()
            .any(|(t, m)| *t == type_id && *m == method);
        Resolution {
            tracked_as,
            boundary,
        }
    }

    pub fn register_instance(&mut self, type_id: TypeId, instance: InstanceId) {
        self.live.entry(type_id).or_default().insert(instance);
    }

    pub fn unregister_instance(&mut self, type_id: TypeId, instance: InstanceId) {
        if let Some(set) = self.live.get_mut(&type_id) {
            set.remove(&instance);
            if set.is_empty() {
                self.live.remove(&type_id);
            }
        }
        self.by_instance.remove(&instance);
    }

    /// Live instance count per display name
    ///
    /// An instance tracked under its own name counts there instead of under
    /// its type's name.
    pub fn instance_counts(&self) -> HashMap<String, u64> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for (type_id, instances) in &self.live {
            for instance in instances {
                let display = self
                    .by_instance
                    .get(instance)
                    .map(|r| &r.registration.display)
                    .or_else(|| self.by_type.get(type_id).map(|r| &r.display));
                if let Some(display) = display {
                    *counts.entry(display.clone()).or_default() += 1;
                }
            }
        }
        counts
    }

    /// Registered display names in registration order, `_remaining` first
    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn push_name(&mut self, display: &str) {
        if !self.names.iter().any(|n| n == display) {
            self.names.push(display.to_string());
        }
    }
}
