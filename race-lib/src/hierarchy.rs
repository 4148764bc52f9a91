use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::ir::{ClassAnnotations, ClassRecord, MethodRecord};

/// Thread-safety markers of a class after taking its ancestors into account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ClassCapabilities {
    pub thread_shared: bool,
    pub thread_confined: bool,
}

impl ClassCapabilities {
    fn from_annotations(annotations: &ClassAnnotations) -> Self {
        Self {
            thread_shared: annotations.thread_safe,
            thread_confined: annotations.thread_confined,
        }
    }

    fn merge(&mut self, other: Self) {
        self.thread_shared |= other.thread_shared;
        self.thread_confined |= other.thread_confined;
    }
}

#[derive(Debug, Default)]
struct ClassInfo<'p> {
    superclasses: &'p [String],
    own: ClassCapabilities,
    capabilities: ClassCapabilities,
    /// Known ancestors, nearest first.
    ancestors: Vec<&'p str>,
    methods: Vec<&'p MethodRecord>,
}

/// Classes of a program, their ancestors and their methods. Everything is
/// resolved once on construction.
#[derive(Debug, Default)]
pub struct ClassHierarchy<'p> {
    classes: BTreeMap<&'p str, ClassInfo<'p>>,
}

impl<'p> ClassHierarchy<'p> {
    /// The first record of a class wins. Classes only named as the declaring
    /// class of a method get default annotations and no superclasses.
    pub fn new(
        records: &'p [ClassRecord],
        methods: impl IntoIterator<Item = &'p MethodRecord>,
    ) -> Self {
        let mut classes: BTreeMap<&'p str, ClassInfo<'p>> = BTreeMap::new();
        for record in records {
            classes
                .entry(record.name.as_str())
                .or_insert_with(|| ClassInfo {
                    superclasses: &record.superclasses,
                    own: ClassCapabilities::from_annotations(&record.annotations),
                    ..ClassInfo::default()
                });
        }
        for method in methods {
            classes
                .entry(method.declaring_class.as_str())
                .or_default()
                .methods
                .push(method);
        }

        let names: Vec<&'p str> = classes.keys().copied().collect();
        for name in names {
            let ancestors = Self::collect_ancestors(&classes, name);
            let mut capabilities = classes[name].own;
            for ancestor in &ancestors {
                capabilities.merge(classes[ancestor].own);
            }
            if let Some(info) = classes.get_mut(name) {
                info.ancestors = ancestors;
                info.capabilities = capabilities;
            }
        }
        Self { classes }
    }

    /// Breadth-first walk over the superclass edges. Unknown names and
    /// cycles back to visited classes are skipped.
    fn collect_ancestors(
        classes: &BTreeMap<&'p str, ClassInfo<'p>>,
        start: &'p str,
    ) -> Vec<&'p str> {
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut ancestors = Vec::new();
        while let Some(current) = queue.pop_front() {
            let Some(info) = classes.get(current) else {
                continue;
            };
            for parent in info.superclasses {
                let Some((&parent, _)) = classes.get_key_value(parent.as_str()) else {
                    continue;
                };
                if visited.insert(parent) {
                    ancestors.push(parent);
                    queue.push_back(parent);
                }
            }
        }
        ancestors
    }

    /// Class names in lexicographic order.
    pub fn class_names(&self) -> impl Iterator<Item = &'p str> + '_ {
        self.classes.keys().copied()
    }

    pub fn capabilities(&self, class: &str) -> ClassCapabilities {
        self.classes
            .get(class)
            .map(|info| info.capabilities)
            .unwrap_or_default()
    }

    pub fn ancestors(&self, class: &str) -> &[&'p str] {
        self.classes
            .get(class)
            .map(|info| info.ancestors.as_slice())
            .unwrap_or_default()
    }

    pub fn declared_methods(&self, class: &str) -> &[&'p MethodRecord] {
        self.classes
            .get(class)
            .map(|info| info.methods.as_slice())
            .unwrap_or_default()
    }

    /// Methods callable on an instance of the class: its own ones and the
    /// inherited ones it does not override by name.
    pub fn visible_methods(&self, class: &str) -> Vec<&'p MethodRecord> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut visible = Vec::new();
        let owners = std::iter::once(class).chain(self.ancestors(class).iter().copied());
        for owner in owners {
            let declared = self.declared_methods(owner);
            let names: Vec<&str> = declared.iter().map(|m| m.name.as_str()).collect();
            for method in declared {
                if !seen.contains(method.name.as_str()) {
                    visible.push(*method);
                }
            }
            seen.extend(names);
        }
        visible
    }

    /// Whether a thread-shared ancestor of the declaring class has a method
    /// with the same name.
    pub fn overrides_shared_method(&self, method: &MethodRecord) -> bool {
        self.ancestors(&method.declaring_class)
            .iter()
            .filter(|ancestor| self.capabilities(ancestor).thread_shared)
            .any(|ancestor| {
                self.declared_methods(ancestor)
                    .iter()
                    .any(|m| m.name == method.name)
            })
    }
}
