// MiniTalk Universe - bootstrap and the runtime's shared state.
//
// Owns the symbol table, class table, heap, domains, and globals, and
// wires the metaclass loop at startup. Everything above this module
// (dispatch chains, primitives, the host evaluator) borrows the
// universe mutably for the duration of one operation; there is no
// interior sharing.

use log::{info, warn};

use crate::class::{ClassId, ClassTable, MethodId, MethodKind};
use crate::dispatch::{with_receiver, Resolved, SendError};
use crate::domain::{allow_all_writes, DomainId, DomainTable, WritePolicyFn};
use crate::fastmap;
use crate::object::{AccessError, ArrayId, BlockId, ObjectId, ObjectStore};
use crate::primitives;
use crate::symbol::{SymbolId, SymbolTable};
use crate::types::{BodyId, Value};

/// Host evaluator for compiled method bodies. `arguments[0]` is the
/// receiver.
pub type EvalFn = fn(&mut Universe, BodyId, &[Value]) -> Result<Value, SendError>;

pub struct Universe {
    pub symbols: SymbolTable,
    pub classes: ClassTable,
    pub heap: ObjectStore,
    pub domains: DomainTable,
    globals: fastmap::HashMap<SymbolId, Value>,

    pub standard_domain: DomainId,
    current_domain: DomainId,
    write_policy: WritePolicyFn,
    evaluator: Option<EvalFn>,

    pub object_class: ClassId,
    pub class_class: ClassId,
    pub metaclass_class: ClassId,
    pub nil_class: ClassId,
    pub boolean_class: ClassId,
    pub integer_class: ClassId,
    pub double_class: ClassId,
    pub string_class: ClassId,
    pub symbol_class: ClassId,
    pub array_class: ClassId,
    pub block_class: ClassId,
    pub domain_class: ClassId,

    pub sym_does_not_understand: SymbolId,
    pub sym_escaped_block: SymbolId,
    pub sym_unknown_global: SymbolId,
}

impl Universe {
    /// Build a fully wired universe: metaclass loop, system classes,
    /// standard domain, globals, and built-in primitives. Panics if the
    /// result fails its own consistency check.
    pub fn new() -> Universe {
        let mut symbols = SymbolTable::new();
        let mut classes = ClassTable::new();
        let mut domains = DomainTable::new();
        let heap = ObjectStore::new();

        let standard_domain = domains.create();

        // Metaclass is the class of every metaclass, including its own.
        let metaclass_class = classes.alloc_class(symbols.intern("Metaclass"));
        let metaclass_meta = classes.alloc_class(symbols.intern("Metaclass class"));
        classes.get_mut(metaclass_class).class = metaclass_meta;
        classes.get_mut(metaclass_meta).class = metaclass_class;

        let system_class = |classes: &mut ClassTable, symbols: &mut SymbolTable, name: &str| {
            let cid = classes.alloc_class(symbols.intern(name));
            let meta = classes.alloc_class(symbols.intern(&format!("{} class", name)));
            classes.get_mut(cid).class = meta;
            classes.get_mut(meta).class = metaclass_class;
            cid
        };

        let object_class = system_class(&mut classes, &mut symbols, "Object");
        let class_class = system_class(&mut classes, &mut symbols, "Class");
        let nil_class = system_class(&mut classes, &mut symbols, "Nil");
        let boolean_class = system_class(&mut classes, &mut symbols, "Boolean");
        let integer_class = system_class(&mut classes, &mut symbols, "Integer");
        let double_class = system_class(&mut classes, &mut symbols, "Double");
        let string_class = system_class(&mut classes, &mut symbols, "String");
        let symbol_class = system_class(&mut classes, &mut symbols, "Symbol");
        let array_class = system_class(&mut classes, &mut symbols, "Array");
        let block_class = system_class(&mut classes, &mut symbols, "Block");
        let domain_class = system_class(&mut classes, &mut symbols, "Domain");

        // Superclass wiring. A class's metaclass inherits from the
        // superclass's metaclass; Object's metaclass bottoms out at
        // Class, which is what makes classes respond to Class methods.
        let wire = |classes: &mut ClassTable, cid: ClassId, superclass: Option<ClassId>| {
            let meta = classes.get(cid).class;
            match superclass {
                Some(sup) => {
                    let sup_meta = classes.get(sup).class;
                    classes.get_mut(cid).superclass = Some(sup);
                    classes.get_mut(meta).superclass = Some(sup_meta);
                }
                None => {
                    classes.get_mut(meta).superclass = Some(class_class);
                }
            }
        };
        wire(&mut classes, object_class, None);
        wire(&mut classes, class_class, Some(object_class));
        wire(&mut classes, metaclass_class, Some(class_class));
        for cid in [
            nil_class,
            boolean_class,
            integer_class,
            double_class,
            string_class,
            symbol_class,
            array_class,
            block_class,
            domain_class,
        ] {
            wire(&mut classes, cid, Some(object_class));
        }

        let sym_does_not_understand = symbols.intern("doesNotUnderstand:arguments:");
        let sym_escaped_block = symbols.intern("escapedBlock:");
        let sym_unknown_global = symbols.intern("unknownGlobal:");

        let mut globals = fastmap::HashMap::default();
        globals.insert(symbols.intern("nil"), Value::Nil);
        globals.insert(symbols.intern("true"), Value::Boolean(true));
        globals.insert(symbols.intern("false"), Value::Boolean(false));
        for cid in [
            object_class,
            class_class,
            metaclass_class,
            nil_class,
            boolean_class,
            integer_class,
            double_class,
            string_class,
            symbol_class,
            array_class,
            block_class,
            domain_class,
        ] {
            globals.insert(classes.get(cid).name, Value::Class(cid));
        }

        let mut universe = Universe {
            symbols,
            classes,
            heap,
            domains,
            globals,
            standard_domain,
            current_domain: standard_domain,
            write_policy: allow_all_writes,
            evaluator: None,
            object_class,
            class_class,
            metaclass_class,
            nil_class,
            boolean_class,
            integer_class,
            double_class,
            string_class,
            symbol_class,
            array_class,
            block_class,
            domain_class,
            sym_does_not_understand,
            sym_escaped_block,
            sym_unknown_global,
        };

        for cid in [
            universe.object_class,
            universe.class_class,
            universe.array_class,
            universe.domain_class,
        ] {
            primitives::install_primitives(&mut universe, cid, false);
        }

        universe.verify_bootstrap();
        info!(
            "universe bootstrapped: {} classes, {} symbols",
            universe.classes.num_classes(),
            universe.symbols.len()
        );
        universe
    }

    /// Consistency check over the bootstrap contract. Panics on any
    /// violation; a universe that fails here is unusable.
    pub fn verify_bootstrap(&self) {
        let meta_of_metaclass = self.classes.get(self.metaclass_class).class;
        assert_eq!(
            self.classes.get(meta_of_metaclass).class,
            self.metaclass_class,
            "Metaclass loop is not closed"
        );
        assert!(
            self.classes.get(self.object_class).superclass.is_none(),
            "Object must not have a superclass"
        );
        assert_eq!(
            self.classes
                .get(self.classes.get(self.object_class).class)
                .superclass,
            Some(self.class_class),
            "Object's metaclass must inherit from Class"
        );
        for cid in (0..self.classes.num_classes()).map(|i| ClassId(i as u32)) {
            let cls = self.classes.get(cid);
            assert_ne!(cls.class, ClassId::UNSET, "unpatched metaclass link");
            // The metaclass hierarchy mirrors the class hierarchy.
            // Metaclasses themselves are instances of Metaclass and sit
            // outside the mirror.
            if cls.class == self.metaclass_class || cid == self.object_class {
                continue;
            }
            if let Some(sup) = cls.superclass {
                assert_eq!(
                    self.classes.get(cls.class).superclass,
                    Some(self.classes.get(sup).class),
                    "metaclass hierarchy out of step with class hierarchy"
                );
            }
        }
        assert!(
            self.classes
                .lookup_uncached(self.object_class, self.sym_does_not_understand)
                .is_some(),
            "Object must understand doesNotUnderstand:arguments:"
        );
        for name in ["nil", "true", "false", "Object", "Class", "Metaclass"] {
            let sym = self
                .symbols
                .find(name)
                .unwrap_or_else(|| panic!("bootstrap global {} was never interned", name));
            assert!(
                self.globals.contains_key(&sym),
                "bootstrap global {} is missing",
                name
            );
        }
    }

    /// Class of any value. Total; immediates map to their system class.
    pub fn class_of(&self, value: &Value) -> ClassId {
        match value {
            Value::Nil => self.nil_class,
            Value::Boolean(_) => self.boolean_class,
            Value::Integer(_) | Value::BigInteger(_) => self.integer_class,
            Value::Double(_) => self.double_class,
            Value::Str(_) => self.string_class,
            Value::Symbol(_) => self.symbol_class,
            Value::Array(_) => self.array_class,
            Value::Instance(id) => self.heap.instance(*id).class,
            Value::Class(id) => self.classes.get(*id).class,
            Value::Block(_) => self.block_class,
            Value::Domain(_) => self.domain_class,
        }
    }

    pub fn global(&self, name: SymbolId) -> Option<Value> {
        self.globals.get(&name).cloned()
    }

    pub fn set_global(&mut self, name: SymbolId, value: Value) {
        self.globals.insert(name, value);
    }

    pub fn has_global(&self, name: SymbolId) -> bool {
        self.globals.contains_key(&name)
    }

    // ---- domains ----

    pub fn current_domain(&self) -> DomainId {
        self.current_domain
    }

    pub fn set_current_domain(&mut self, domain: DomainId) {
        self.current_domain = domain;
    }

    /// Domain new objects are allocated into right now. Follows the
    /// current domain's delegation.
    pub fn allocation_domain(&self) -> DomainId {
        self.domains.domain_for_new_objects(self.current_domain)
    }

    /// Owner of a value. Immediates belong to the standard domain; a
    /// domain value stands for itself.
    pub fn owner_of(&self, value: &Value) -> DomainId {
        match value {
            Value::Instance(id) => self.heap.instance(*id).domain,
            Value::Array(id) => self.heap.array(*id).domain,
            Value::Block(id) => self.heap.block(*id).domain,
            Value::Domain(id) => *id,
            _ => self.standard_domain,
        }
    }

    pub fn set_write_policy(&mut self, policy: WritePolicyFn) {
        self.write_policy = policy;
    }

    /// May the current domain mutate an object owned by `owner`?
    pub fn write_allowed(&self, owner: DomainId) -> bool {
        (self.write_policy)(self.current_domain, owner)
    }

    // ---- allocation ----

    pub fn new_instance(&mut self, class: ClassId) -> ObjectId {
        let domain = self.allocation_domain();
        let num_fields = self.classes.num_instance_fields(class);
        self.heap.alloc_instance(class, domain, num_fields)
    }

    pub fn new_array(&mut self, length: usize) -> ArrayId {
        let domain = self.allocation_domain();
        self.heap.alloc_array(domain, vec![Value::Nil; length])
    }

    pub fn new_array_from(&mut self, elements: Vec<Value>) -> ArrayId {
        let domain = self.allocation_domain();
        self.heap.alloc_array(domain, elements)
    }

    pub fn new_block(&mut self, body: BodyId) -> BlockId {
        let domain = self.allocation_domain();
        self.heap.alloc_block(body, domain)
    }

    // ---- field access ----

    /// Write a field, subject to the domain write policy. Returns
    /// false (and leaves the object untouched) when the policy denies
    /// the write.
    pub fn set_field_checked(&mut self, object: ObjectId, index: usize, value: Value) -> bool {
        let owner = self.heap.instance(object).domain;
        if !(self.write_policy)(self.current_domain, owner) {
            warn!(
                "write to field {} of object id {} denied: domain {} may not write domain {}",
                index, object.0, self.current_domain.0, owner.0
            );
            return false;
        }
        self.heap.instance_mut(object).set_field(index, value);
        true
    }

    /// Reflective read of a named field. Rejects receivers that carry
    /// no named fields instead of misreading their storage.
    pub fn field_named(&self, value: &Value, name: SymbolId) -> Result<Value, AccessError> {
        match value {
            Value::Instance(id) => {
                let inst = self.heap.instance(*id);
                let index = self
                    .classes
                    .field_index(inst.class, name)
                    .ok_or(AccessError::FieldNotFound { field: name })?;
                Ok(inst.field(index))
            }
            _ => Err(AccessError::NotAFieldObject),
        }
    }

    pub fn set_field_named(
        &mut self,
        value: &Value,
        name: SymbolId,
        new_value: Value,
    ) -> Result<(), AccessError> {
        match value {
            Value::Instance(id) => {
                let class = self.heap.instance(*id).class;
                let index = self
                    .classes
                    .field_index(class, name)
                    .ok_or(AccessError::FieldNotFound { field: name })?;
                self.heap.instance_mut(*id).set_field(index, new_value);
                Ok(())
            }
            _ => Err(AccessError::NotAFieldObject),
        }
    }

    /// Replace a class's field list and migrate every existing
    /// instance, matching fields by name and nil-filling new ones.
    /// Subclass layouts keep their cumulative shape: each descendant's
    /// inherited prefix is rebuilt from the updated ancestor chain and
    /// its instances are migrated as well. Returns the total number of
    /// instances migrated across the hierarchy.
    pub fn update_instance_fields(&mut self, class: ClassId, new_fields: Vec<SymbolId>) -> usize {
        let mut migrated = 0;
        let mut work = vec![(class, new_fields)];
        while let Some((cid, fields)) = work.pop() {
            let old_fields = std::mem::replace(
                &mut self.classes.get_mut(cid).instance_fields,
                fields.clone(),
            );
            let ids = self.heap.instances_of(cid);
            for id in &ids {
                self.heap.migrate_instance(*id, &old_fields, &fields);
            }
            info!(
                "class id {}: field list changed, migrated {} instances",
                cid.0,
                ids.len()
            );
            migrated += ids.len();
            for sub in self.classes.subclasses_of(cid) {
                // Everything past the old inherited prefix is the
                // subclass's own declaration suffix.
                let sub_fields = &self.classes.get(sub).instance_fields;
                let split = old_fields.len().min(sub_fields.len());
                let mut rebuilt = fields.clone();
                rebuilt.extend_from_slice(&sub_fields[split..]);
                work.push((sub, rebuilt));
            }
        }
        migrated
    }

    // ---- sends ----

    /// `doesNotUnderstand:arguments:` handler for instances of `class`.
    /// The bootstrap guarantees one exists on Object; a universe where
    /// this fails is corrupt.
    pub fn dnu_method(&mut self, class: ClassId) -> MethodId {
        let selector = self.sym_does_not_understand;
        match self.classes.lookup(class, selector) {
            Some(mid) => mid,
            None => panic!(
                "Bootstrap invariant broken: class id {} has no doesNotUnderstand:arguments:",
                class.0
            ),
        }
    }

    /// One-shot send resolution with `doesNotUnderstand:arguments:`
    /// fallback. Dispatch chains are the cached equivalent for sites
    /// that repeat.
    pub fn resolve_send(
        &mut self,
        receiver: Value,
        selector: SymbolId,
        arguments: &[Value],
    ) -> Resolved {
        let class = self.class_of(&receiver);
        match self.classes.lookup(class, selector) {
            Some(method) => Resolved {
                method,
                arguments: with_receiver(receiver, arguments),
            },
            None => {
                let method = self.dnu_method(class);
                let reified = self.new_array_from(arguments.to_vec());
                Resolved {
                    method,
                    arguments: vec![receiver, Value::Symbol(selector), Value::Array(reified)],
                }
            }
        }
    }

    /// A block was invoked after its defining activation returned.
    /// Resolves the `escapedBlock:` notification send to its home
    /// receiver.
    pub fn escaped_block(&mut self, receiver: Value, block: Value) -> Resolved {
        let selector = self.sym_escaped_block;
        self.resolve_send(receiver, selector, &[block])
    }

    /// A global was referenced that is not bound. Resolves the
    /// `unknownGlobal:` notification send.
    pub fn unknown_global(&mut self, receiver: Value, name: SymbolId) -> Resolved {
        let selector = self.sym_unknown_global;
        self.resolve_send(receiver, selector, &[Value::Symbol(name)])
    }

    pub fn set_evaluator(&mut self, evaluator: EvalFn) {
        self.evaluator = Some(evaluator);
    }

    /// Run a resolved send. Primitives execute directly; compiled
    /// bodies go through the registered evaluator.
    pub fn invoke(&mut self, resolved: &Resolved) -> Result<Value, SendError> {
        let kind = self.classes.method(resolved.method).kind;
        match kind {
            MethodKind::Primitive(code) => code(self, &resolved.arguments),
            MethodKind::Compiled(body) => {
                let eval = self.evaluator.ok_or(SendError::MissingEvaluator)?;
                eval(self, body, &resolved.arguments)
            }
        }
    }

    /// Resolve and invoke in one step.
    pub fn send(
        &mut self,
        receiver: Value,
        selector: SymbolId,
        arguments: &[Value],
    ) -> Result<Value, SendError> {
        let resolved = self.resolve_send(receiver, selector, arguments);
        self.invoke(&resolved)
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}
