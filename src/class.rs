// MiniTalk Class Metaobjects - classes, methods, and memoized lookup.
//
// Classes live in one flat table and refer to each other by `ClassId`.
// A class's `class` link points at its metaclass, which is itself a
// class in the same table; `Metaclass` closes the loop by being its own
// metaclass's class. Method lookup walks the superclass chain and
// memoizes per entry class, stamped against a global mutation epoch so
// any method installation anywhere invalidates every stale memo at
// once.

use log::debug;

use crate::fastmap;
use crate::primitives::PrimitiveFn;
use crate::symbol::SymbolId;
use crate::types::BodyId;

/// Class handle. Index into the `ClassTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Placeholder for a class link that has not been patched yet.
    /// Only ever observable in the middle of bootstrap.
    pub const UNSET: ClassId = ClassId(u32::MAX);
}

/// Method handle. Stable for the life of the table; replacing a
/// method's implementation reuses its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u32);

/// What runs when a method is invoked.
#[derive(Debug, Clone, Copy)]
pub enum MethodKind {
    /// Host-compiled body, executed by the registered evaluator.
    Compiled(BodyId),
    /// Built-in implemented in Rust.
    Primitive(PrimitiveFn),
}

pub struct Method {
    pub signature: SymbolId,
    pub holder: ClassId,
    pub kind: MethodKind,
}

/// Result of installing a method into a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// New selector for this class; appended.
    Added,
    /// Selector already present; implementation swapped in place.
    Replaced,
}

pub struct Class {
    pub name: SymbolId,
    /// Metaclass link. `UNSET` only during bootstrap.
    pub class: ClassId,
    pub superclass: Option<ClassId>,
    /// Cumulative field names, inherited fields first, in declaration
    /// order. An instance's field vector is laid out exactly like this.
    pub instance_fields: Vec<SymbolId>,
    /// Locally held methods, in installation order.
    pub instance_methods: Vec<MethodId>,
    /// Lookup memo: selector sent to instances of this class, with the
    /// epoch the answer was computed under.
    cache: fastmap::HashMap<SymbolId, (MethodId, u64)>,
}

/// All classes and methods, plus the name registry.
pub struct ClassTable {
    classes: Vec<Class>,
    methods: Vec<Method>,
    by_name: fastmap::HashMap<SymbolId, ClassId>,
    /// Bumped on every method installation. Lookup memos and dispatch
    /// chains stamped with an older epoch are stale.
    epoch: u64,
}

impl ClassTable {
    pub fn new() -> Self {
        ClassTable {
            classes: Vec::new(),
            methods: Vec::new(),
            by_name: fastmap::HashMap::default(),
            epoch: 0,
        }
    }

    /// Allocate an empty class and register it under `name`. The
    /// metaclass link starts `UNSET` and must be patched before use.
    pub fn alloc_class(&mut self, name: SymbolId) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(Class {
            name,
            class: ClassId::UNSET,
            superclass: None,
            instance_fields: Vec::new(),
            instance_methods: Vec::new(),
            cache: fastmap::HashMap::default(),
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn find_class(&self, name: SymbolId) -> Option<ClassId> {
        self.by_name.get(&name).copied()
    }

    pub fn get(&self, id: ClassId) -> &Class {
        &self.classes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.0 as usize]
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Install a method. If the class already holds the selector the
    /// implementation is swapped behind the existing `MethodId`, so
    /// cached references pick up the new body without invalidation.
    /// Either way the epoch advances, because an addition can shadow an
    /// inherited method that other classes have memoized.
    pub fn add_or_replace_method(
        &mut self,
        class: ClassId,
        signature: SymbolId,
        kind: MethodKind,
    ) -> (MethodId, InstallOutcome) {
        let existing = self.classes[class.0 as usize]
            .instance_methods
            .iter()
            .copied()
            .find(|mid| self.methods[mid.0 as usize].signature == signature);
        self.epoch += 1;
        match existing {
            Some(mid) => {
                let slot = &mut self.methods[mid.0 as usize];
                slot.kind = kind;
                slot.holder = class;
                (mid, InstallOutcome::Replaced)
            }
            None => {
                let mid = MethodId(self.methods.len() as u32);
                self.methods.push(Method {
                    signature,
                    holder: class,
                    kind,
                });
                self.classes[class.0 as usize].instance_methods.push(mid);
                (mid, InstallOutcome::Added)
            }
        }
    }

    /// Resolve `selector` starting at `class`, walking up the
    /// superclass chain. Memoizes at the entry class only, so each
    /// class's memo holds exactly the selectors sent to its instances.
    pub fn lookup(&mut self, class: ClassId, selector: SymbolId) -> Option<MethodId> {
        if let Some(&(mid, stamp)) = self.classes[class.0 as usize].cache.get(&selector) {
            if stamp == self.epoch {
                return Some(mid);
            }
        }
        let found = self.lookup_uncached(class, selector);
        if let Some(mid) = found {
            let epoch = self.epoch;
            self.classes[class.0 as usize]
                .cache
                .insert(selector, (mid, epoch));
        } else {
            debug!(
                "lookup miss: selector id {} not understood by class id {}",
                selector.0, class.0
            );
        }
        found
    }

    /// Chain walk without touching any memo. Local methods are scanned
    /// in installation order; first signature match wins.
    pub fn lookup_uncached(&self, class: ClassId, selector: SymbolId) -> Option<MethodId> {
        let mut current = Some(class);
        while let Some(cid) = current {
            let cls = &self.classes[cid.0 as usize];
            for &mid in &cls.instance_methods {
                if self.methods[mid.0 as usize].signature == selector {
                    return Some(mid);
                }
            }
            current = cls.superclass;
        }
        None
    }

    /// Field slot for `name` in instances of `class`. Scans the
    /// cumulative list back to front, so a subclass redeclaring an
    /// inherited name wins.
    pub fn field_index(&self, class: ClassId, name: SymbolId) -> Option<usize> {
        self.classes[class.0 as usize]
            .instance_fields
            .iter()
            .rposition(|f| *f == name)
    }

    pub fn num_instance_fields(&self, class: ClassId) -> usize {
        self.classes[class.0 as usize].instance_fields.len()
    }

    /// Direct subclasses of `class`, in definition order.
    pub fn subclasses_of(&self, class: ClassId) -> Vec<ClassId> {
        self.classes
            .iter()
            .enumerate()
            .filter(|(_, cls)| cls.superclass == Some(class))
            .map(|(i, _)| ClassId(i as u32))
            .collect()
    }

    /// True when `class` is `ancestor` or inherits from it.
    pub fn is_kind_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(cid) = current {
            if cid == ancestor {
                return true;
            }
            current = self.classes[cid.0 as usize].superclass;
        }
        false
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(n: u32) -> MethodKind {
        MethodKind::Compiled(BodyId(n))
    }

    // Small chain: C < B < A.
    fn chain() -> (ClassTable, ClassId, ClassId, ClassId) {
        let mut t = ClassTable::new();
        let a = t.alloc_class(SymbolId(0));
        let b = t.alloc_class(SymbolId(1));
        let c = t.alloc_class(SymbolId(2));
        t.get_mut(b).superclass = Some(a);
        t.get_mut(c).superclass = Some(b);
        (t, a, b, c)
    }

    #[test]
    fn test_lookup_finds_nearest_definition() {
        let (mut t, a, b, c) = chain();
        let sel = SymbolId(10);
        let (on_a, _) = t.add_or_replace_method(a, sel, compiled(1));
        assert_eq!(t.lookup(c, sel), Some(on_a));
        let (on_b, _) = t.add_or_replace_method(b, sel, compiled(2));
        assert_eq!(t.lookup(c, sel), Some(on_b));
        assert_eq!(t.lookup(a, sel), Some(on_a));
    }

    #[test]
    fn test_replace_reuses_method_id() {
        let (mut t, a, _, _) = chain();
        let sel = SymbolId(10);
        let (first, outcome) = t.add_or_replace_method(a, sel, compiled(1));
        assert_eq!(outcome, InstallOutcome::Added);
        let (second, outcome) = t.add_or_replace_method(a, sel, compiled(2));
        assert_eq!(outcome, InstallOutcome::Replaced);
        assert_eq!(first, second);
        assert!(matches!(
            t.method(first).kind,
            MethodKind::Compiled(BodyId(2))
        ));
        assert_eq!(t.get(a).instance_methods.len(), 1);
    }

    #[test]
    fn test_memo_invalidated_by_shadowing_addition() {
        let (mut t, a, b, c) = chain();
        let sel = SymbolId(10);
        let (on_a, _) = t.add_or_replace_method(a, sel, compiled(1));
        // Prime the memo at c.
        assert_eq!(t.lookup(c, sel), Some(on_a));
        // An unrelated addition bumps the epoch too; the memo must
        // recompute rather than replay.
        let (on_b, _) = t.add_or_replace_method(b, sel, compiled(2));
        assert_eq!(t.lookup(c, sel), Some(on_b));
    }

    #[test]
    fn test_lookup_memoizes_only_at_entry_class() {
        let (mut t, a, _, c) = chain();
        let sel = SymbolId(10);
        t.add_or_replace_method(a, sel, compiled(1));
        t.lookup(c, sel);
        assert!(t.get(c).cache.contains_key(&sel));
        // Intermediate class was walked through but never sent to.
        assert!(!t.get(ClassId(1)).cache.contains_key(&sel));
    }

    #[test]
    fn test_field_index_last_declaration_wins() {
        let (mut t, _, _, c) = chain();
        let x = SymbolId(20);
        let y = SymbolId(21);
        // Inherited x at 0, own y at 1, own redeclared x at 2.
        t.get_mut(c).instance_fields = vec![x, y, x];
        assert_eq!(t.field_index(c, x), Some(2));
        assert_eq!(t.field_index(c, y), Some(1));
        assert_eq!(t.field_index(c, SymbolId(22)), None);
    }

    #[test]
    fn test_subclasses_of_is_direct_only() {
        let (t, a, b, c) = chain();
        assert_eq!(t.subclasses_of(a), vec![b]);
        assert_eq!(t.subclasses_of(b), vec![c]);
        assert_eq!(t.subclasses_of(c), Vec::<ClassId>::new());
    }

    #[test]
    fn test_is_kind_of() {
        let (t, a, b, c) = chain();
        assert!(t.is_kind_of(c, a));
        assert!(t.is_kind_of(b, b));
        assert!(!t.is_kind_of(a, c));
    }

    #[test]
    fn test_lookup_miss_is_not_memoized() {
        let (mut t, a, _, c) = chain();
        let sel = SymbolId(10);
        assert_eq!(t.lookup(c, sel), None);
        let (on_a, _) = t.add_or_replace_method(a, sel, compiled(1));
        assert_eq!(t.lookup(c, sel), Some(on_a));
    }
}
