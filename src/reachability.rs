//! Whole-program reachability queries used to resolve virtual calls

use crate::graph::MethodRef;
use rustc_hash::{FxHashMap, FxHashSet};

/// Source of virtual dispatch targets
pub trait Reachability {
    /// Exact function names a call to `method` can dispatch to, in
    /// hierarchy pre-order.
    ///
    /// `None` means there is no reachability data for the method or one of
    /// its candidate receivers, and the caller must not assume anything.
    fn reachable_overriding_implementations(&self, method: &MethodRef) -> Option<Vec<String>>;
}

#[derive(Debug, Default)]
struct ClassRecord {
    superclass: Option<String>,
    subclasses: Vec<String>,
    reachable: bool,
    methods: FxHashSet<(String, String)>,
}

/// Class hierarchy with reachability marks and per-class method
/// implementations
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    classes: FxHashMap<String, ClassRecord>,
}

impl ClassHierarchy {
    /// Create an empty hierarchy
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with an optional superclass
    pub fn add_class(&mut self, name: &str, superclass: Option<&str>) {
        let record = self.classes.entry(name.to_string()).or_default();
        record.superclass = superclass.map(str::to_string);
        if let Some(superclass) = superclass {
            let parent = self.classes.entry(superclass.to_string()).or_default();
            if !parent.subclasses.iter().any(|s| s == name) {
                parent.subclasses.push(name.to_string());
            }
        }
    }

    /// Mark `class` as instantiated by reachable code
    pub fn mark_reachable(&mut self, class: &str) {
        self.classes.entry(class.to_string()).or_default().reachable = true;
    }

    /// Record that `class` defines its own body for `name` + `descriptor`
    pub fn add_implementation(&mut self, class: &str, name: &str, descriptor: &str) {
        self.classes
            .entry(class.to_string())
            .or_default()
            .methods
            .insert((name.to_string(), descriptor.to_string()));
    }

    /// Reachable proper subclasses of `class`, pre-order
    pub fn reachable_subclasses(&self, class: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut visited = FxHashSet::default();
        self.collect_subclasses(class, &mut out, &mut visited);
        out
    }

    fn collect_subclasses(&self, class: &str, out: &mut Vec<String>, visited: &mut FxHashSet<String>) {
        let Some(record) = self.classes.get(class) else {
            return;
        };
        for sub in &record.subclasses {
            if !visited.insert(sub.clone()) {
                continue;
            }
            if self.classes.get(sub).map_or(false, |r| r.reachable) {
                out.push(sub.clone());
            }
            self.collect_subclasses(sub, out, visited);
        }
    }

    /// Nearest class at or above `class` that implements the method
    fn implementing_class(&self, class: &str, method: &MethodRef) -> Option<String> {
        let key = (method.name.clone(), method.descriptor.clone());
        let mut current = Some(class.to_string());
        let mut steps = 0usize;
        while let Some(name) = current {
            let record = self.classes.get(&name)?;
            if record.methods.contains(&key) {
                return Some(name);
            }
            current = record.superclass.clone();
            steps += 1;
            if steps > self.classes.len() {
                // superclass cycle
                return None;
            }
        }
        None
    }
}

impl Reachability for ClassHierarchy {
    fn reachable_overriding_implementations(&self, method: &MethodRef) -> Option<Vec<String>> {
        let declaring = self.classes.get(&method.class)?;
        let subclasses = self.reachable_subclasses(&method.class);

        let mut receivers = Vec::new();
        if declaring.reachable || subclasses.is_empty() {
            receivers.push(method.class.clone());
        }
        receivers.extend(subclasses);

        let mut names: Vec<String> = Vec::new();
        for receiver in receivers {
            let owner = self.implementing_class(&receiver, method)?;
            let name = method.exact_name_in(&owner);
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Some(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> ClassHierarchy {
        let mut h = ClassHierarchy::new();
        h.add_class("pkg/Base", None);
        h.add_class("pkg/A", Some("pkg/Base"));
        h.add_class("pkg/B", Some("pkg/Base"));
        h.add_class("pkg/C", Some("pkg/A"));
        h.add_implementation("pkg/Base", "run", "()V");
        h.add_implementation("pkg/A", "run", "()V");
        h
    }

    #[test]
    fn test_no_reachable_subclasses() {
        let h = hierarchy();
        let m = MethodRef::new("pkg/Base", "run", "()V");
        assert_eq!(
            h.reachable_overriding_implementations(&m),
            Some(vec!["pkg.Base.run()V".to_string()])
        );
    }

    #[test]
    fn test_inherited_implementation() {
        let mut h = hierarchy();
        h.mark_reachable("pkg/B");
        h.mark_reachable("pkg/C");
        let m = MethodRef::new("pkg/Base", "run", "()V");
        // A is not reachable itself but C inherits A's body; B inherits Base's
        assert_eq!(
            h.reachable_overriding_implementations(&m),
            Some(vec!["pkg.A.run()V".to_string(), "pkg.Base.run()V".to_string()])
        );
    }

    #[test]
    fn test_unknown_class() {
        let h = hierarchy();
        let m = MethodRef::new("pkg/Missing", "run", "()V");
        assert_eq!(h.reachable_overriding_implementations(&m), None);
    }

    #[test]
    fn test_missing_body() {
        let mut h = hierarchy();
        h.mark_reachable("pkg/B");
        let m = MethodRef::new("pkg/Base", "stop", "()V");
        assert_eq!(h.reachable_overriding_implementations(&m), None);
    }
}
