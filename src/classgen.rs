// MiniTalk Class Generation - accumulating and assembling class definitions.
//
// The compiler front end fills a `ClassGenerationContext` while parsing
// a class body, flipping to the class side halfway through, then
// assembles it exactly once. Assembly builds the metaclass first, wires
// it under the superclass's metaclass, and only then builds the class
// itself, so a fully assembled class always satisfies the metaclass
// mirror invariant.

use std::fmt;

use log::debug;

use crate::class::{ClassId, MethodKind};
use crate::symbol::SymbolId;
use crate::types::Value;
use crate::universe::Universe;

/// A method declaration waiting for its holder class to exist.
#[derive(Debug, Clone, Copy)]
pub struct MethodDecl {
    pub signature: SymbolId,
    pub kind: MethodKind,
}

/// Assembly failure. The context is consumed either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    /// The named superclass is not defined.
    UnresolvedSuperclass(SymbolId),
    /// `set_name` was never called.
    MissingName,
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssembleError::UnresolvedSuperclass(name) => {
                write!(f, "superclass with symbol id {} is not defined", name.0)
            }
            AssembleError::MissingName => write!(f, "class definition has no name"),
        }
    }
}

impl std::error::Error for AssembleError {}

/// Accumulator for one class definition. Fields and methods land on
/// the instance side until `set_class_side(true)`.
pub struct ClassGenerationContext {
    name: Option<SymbolId>,
    super_name: Option<SymbolId>,
    class_side: bool,
    instance_fields: Vec<SymbolId>,
    instance_methods: Vec<MethodDecl>,
    class_fields: Vec<SymbolId>,
    class_methods: Vec<MethodDecl>,
}

impl ClassGenerationContext {
    pub fn new() -> Self {
        ClassGenerationContext {
            name: None,
            super_name: None,
            class_side: false,
            instance_fields: Vec::new(),
            instance_methods: Vec::new(),
            class_fields: Vec::new(),
            class_methods: Vec::new(),
        }
    }

    pub fn set_name(&mut self, name: SymbolId) {
        self.name = Some(name);
    }

    pub fn name(&self) -> Option<SymbolId> {
        self.name
    }

    /// Superclass by name, resolved at assembly. Defaults to `Object`.
    pub fn set_super_name(&mut self, name: SymbolId) {
        self.super_name = Some(name);
    }

    pub fn set_class_side(&mut self, class_side: bool) {
        self.class_side = class_side;
    }

    pub fn is_class_side(&self) -> bool {
        self.class_side
    }

    pub fn add_field(&mut self, name: SymbolId) {
        self.current_fields_mut().push(name);
    }

    pub fn add_method(&mut self, decl: MethodDecl) {
        if self.class_side {
            self.class_methods.push(decl);
        } else {
            self.instance_methods.push(decl);
        }
    }

    /// Is `name` declared on the side currently being accumulated?
    pub fn has_field(&self, name: SymbolId) -> bool {
        self.current_fields().contains(&name)
    }

    /// Declaration slot of `name` on the current side, latest
    /// declaration winning.
    pub fn field_index(&self, name: SymbolId) -> Option<usize> {
        self.current_fields().iter().rposition(|f| *f == name)
    }

    fn current_fields(&self) -> &Vec<SymbolId> {
        if self.class_side {
            &self.class_fields
        } else {
            &self.instance_fields
        }
    }

    fn current_fields_mut(&mut self) -> &mut Vec<SymbolId> {
        if self.class_side {
            &mut self.class_fields
        } else {
            &mut self.instance_fields
        }
    }

    /// Build the metaclass and class, register the class as a global,
    /// and return its id. Consumes the context; a context is assembled
    /// at most once.
    pub fn assemble(self, universe: &mut Universe) -> Result<ClassId, AssembleError> {
        let name = self.name.ok_or(AssembleError::MissingName)?;
        let super_class = match self.super_name {
            Some(super_name) => universe
                .classes
                .find_class(super_name)
                .ok_or(AssembleError::UnresolvedSuperclass(super_name))?,
            None => universe.object_class,
        };

        // Metaclass first. It inherits from the superclass's metaclass
        // and is an instance of Metaclass.
        let meta_name_str = format!("{} class", universe.symbols.name(name));
        let meta_name = universe.symbols.intern(&meta_name_str);
        let super_meta = universe.classes.get(super_class).class;
        let meta = universe.classes.alloc_class(meta_name);
        let mut meta_fields = universe.classes.get(super_meta).instance_fields.clone();
        meta_fields.extend(self.class_fields.iter().copied());
        {
            let m = universe.classes.get_mut(meta);
            m.superclass = Some(super_meta);
            m.instance_fields = meta_fields;
        }
        universe.classes.get_mut(meta).class = universe.metaclass_class;
        for decl in &self.class_methods {
            universe
                .classes
                .add_or_replace_method(meta, decl.signature, decl.kind);
        }

        let class = universe.classes.alloc_class(name);
        let mut fields = universe.classes.get(super_class).instance_fields.clone();
        fields.extend(self.instance_fields.iter().copied());
        {
            let c = universe.classes.get_mut(class);
            c.class = meta;
            c.superclass = Some(super_class);
            c.instance_fields = fields;
        }
        for decl in &self.instance_methods {
            universe
                .classes
                .add_or_replace_method(class, decl.signature, decl.kind);
        }

        universe.set_global(name, Value::Class(class));
        debug!(
            "assembled class id {} under superclass id {} with {} instance methods",
            class.0,
            super_class.0,
            self.instance_methods.len()
        );
        Ok(class)
    }

    /// Pour the accumulated definition into an already bootstrapped
    /// class, leaving its identity and links alone. Used when loading
    /// the source definitions of system classes.
    pub fn assemble_system_class(self, universe: &mut Universe, class: ClassId) {
        let meta = universe.classes.get(class).class;

        let mut fields = match universe.classes.get(class).superclass {
            Some(sup) => universe.classes.get(sup).instance_fields.clone(),
            None => Vec::new(),
        };
        fields.extend(self.instance_fields.iter().copied());
        universe.classes.get_mut(class).instance_fields = fields;

        let mut meta_fields = match universe.classes.get(meta).superclass {
            Some(sup) => universe.classes.get(sup).instance_fields.clone(),
            None => Vec::new(),
        };
        meta_fields.extend(self.class_fields.iter().copied());
        universe.classes.get_mut(meta).instance_fields = meta_fields;

        for decl in &self.instance_methods {
            universe
                .classes
                .add_or_replace_method(class, decl.signature, decl.kind);
        }
        for decl in &self.class_methods {
            universe
                .classes
                .add_or_replace_method(meta, decl.signature, decl.kind);
        }
    }
}

impl Default for ClassGenerationContext {
    fn default() -> Self {
        Self::new()
    }
}
