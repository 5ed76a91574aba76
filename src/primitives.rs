// MiniTalk Primitives - built-in methods implemented in Rust.
//
// Primitives are installed into the class table as ordinary methods,
// so dispatch treats them no differently from compiled code. Tables
// are keyed by system class name; `class_side` entries land on the
// metaclass. Indices arriving from the language are 1-based.

use log::{error, warn};

use crate::class::{ClassId, InstallOutcome, MethodKind};
use crate::dispatch::{self, SendError};
use crate::domain::DomainId;
use crate::object::{ArrayId, ObjectId};
use crate::types::Value;
use crate::universe::Universe;

/// A built-in method body. `args[0]` is the receiver.
pub type PrimitiveFn = fn(&mut Universe, &[Value]) -> Result<Value, SendError>;

pub struct PrimitiveSpec {
    pub selector: &'static str,
    /// Install on the metaclass instead of the class itself.
    pub class_side: bool,
    pub code: PrimitiveFn,
}

/// Built-ins for a system class, by name.
pub fn table_for(class_name: &str) -> Option<&'static [PrimitiveSpec]> {
    match class_name {
        "Object" => Some(OBJECT_PRIMITIVES),
        "Class" => Some(CLASS_PRIMITIVES),
        "Array" => Some(ARRAY_PRIMITIVES),
        "Domain" => Some(DOMAIN_PRIMITIVES),
        _ => None,
    }
}

/// Install the built-in table for `class`, if it has one. With
/// `warn_undeclared` set, installing a primitive the class never
/// declared logs a warning; replacements stay silent.
pub fn install_primitives(universe: &mut Universe, class: ClassId, warn_undeclared: bool) {
    let name = universe
        .symbols
        .name(universe.classes.get(class).name)
        .to_string();
    let specs = match table_for(&name) {
        Some(specs) => specs,
        None => return,
    };
    for spec in specs {
        let signature = universe.symbols.intern(spec.selector);
        let target = if spec.class_side {
            universe.classes.get(class).class
        } else {
            class
        };
        let (_, outcome) =
            universe
                .classes
                .add_or_replace_method(target, signature, MethodKind::Primitive(spec.code));
        if warn_undeclared && outcome == InstallOutcome::Added {
            warn!(
                "primitive {}>>#{} has no corresponding declared method",
                name, spec.selector
            );
        }
    }
}

// ---- argument helpers ----

fn arg<'a>(args: &'a [Value], index: usize) -> Result<&'a Value, SendError> {
    args.get(index)
        .ok_or_else(|| SendError::Primitive(format!("missing argument {}", index)))
}

fn instance_arg(args: &[Value], index: usize) -> Result<ObjectId, SendError> {
    match arg(args, index)? {
        Value::Instance(id) => Ok(*id),
        other => Err(SendError::Primitive(format!(
            "expected a field-bearing object, got {:?}",
            other
        ))),
    }
}

fn class_arg(args: &[Value], index: usize) -> Result<ClassId, SendError> {
    match arg(args, index)? {
        Value::Class(id) => Ok(*id),
        other => Err(SendError::Primitive(format!(
            "expected a class, got {:?}",
            other
        ))),
    }
}

fn symbol_arg(args: &[Value], index: usize) -> Result<crate::symbol::SymbolId, SendError> {
    match arg(args, index)? {
        Value::Symbol(id) => Ok(*id),
        other => Err(SendError::Primitive(format!(
            "expected a symbol, got {:?}",
            other
        ))),
    }
}

fn array_arg(args: &[Value], index: usize) -> Result<ArrayId, SendError> {
    match arg(args, index)? {
        Value::Array(id) => Ok(*id),
        other => Err(SendError::Primitive(format!(
            "expected an array, got {:?}",
            other
        ))),
    }
}

fn domain_arg(args: &[Value], index: usize) -> Result<DomainId, SendError> {
    match arg(args, index)? {
        Value::Domain(id) => Ok(*id),
        other => Err(SendError::Primitive(format!(
            "expected a domain, got {:?}",
            other
        ))),
    }
}

/// 1-based language index to 0-based store index.
fn index_arg(args: &[Value], index: usize) -> Result<usize, SendError> {
    match arg(args, index)? {
        Value::Integer(i) if *i >= 1 => Ok((*i - 1) as usize),
        Value::Integer(i) => Err(SendError::Primitive(format!(
            "index {} must be positive",
            i
        ))),
        other => Err(SendError::Primitive(format!(
            "expected an integer index, got {:?}",
            other
        ))),
    }
}

// ---- Object ----

const OBJECT_PRIMITIVES: &[PrimitiveSpec] = &[
    PrimitiveSpec {
        selector: "class",
        class_side: false,
        code: prim_class,
    },
    PrimitiveSpec {
        selector: "==",
        class_side: false,
        code: prim_identical,
    },
    PrimitiveSpec {
        selector: "isNil",
        class_side: false,
        code: prim_is_nil,
    },
    PrimitiveSpec {
        selector: "notNil",
        class_side: false,
        code: prim_not_nil,
    },
    PrimitiveSpec {
        selector: "instVarAt:",
        class_side: false,
        code: prim_inst_var_at,
    },
    PrimitiveSpec {
        selector: "instVarAt:put:",
        class_side: false,
        code: prim_inst_var_at_put,
    },
    PrimitiveSpec {
        selector: "instVarNamed:",
        class_side: false,
        code: prim_inst_var_named,
    },
    PrimitiveSpec {
        selector: "perform:",
        class_side: false,
        code: prim_perform,
    },
    PrimitiveSpec {
        selector: "perform:withArguments:",
        class_side: false,
        code: prim_perform_with_arguments,
    },
    PrimitiveSpec {
        selector: "perform:inSuperclass:",
        class_side: false,
        code: prim_perform_in_superclass_plain,
    },
    PrimitiveSpec {
        selector: "perform:withArguments:inSuperclass:",
        class_side: false,
        code: prim_perform_in_superclass,
    },
    PrimitiveSpec {
        selector: "doesNotUnderstand:arguments:",
        class_side: false,
        code: prim_does_not_understand,
    },
    PrimitiveSpec {
        selector: "domain",
        class_side: false,
        code: prim_domain,
    },
    PrimitiveSpec {
        selector: "halt",
        class_side: false,
        code: prim_halt,
    },
];

fn prim_class(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    Ok(Value::Class(universe.class_of(arg(args, 0)?)))
}

fn prim_identical(_universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    Ok(Value::Boolean(arg(args, 0)? == arg(args, 1)?))
}

fn prim_is_nil(_universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    Ok(Value::Boolean(arg(args, 0)?.is_nil()))
}

fn prim_not_nil(_universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    Ok(Value::Boolean(!arg(args, 0)?.is_nil()))
}

fn prim_inst_var_at(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let id = instance_arg(args, 0)?;
    let index = index_arg(args, 1)?;
    let inst = universe.heap.instance(id);
    if index >= inst.num_fields() {
        return Err(SendError::Primitive(format!(
            "field index {} out of bounds for {} fields",
            index + 1,
            inst.num_fields()
        )));
    }
    Ok(inst.field(index))
}

fn prim_inst_var_at_put(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let id = instance_arg(args, 0)?;
    let index = index_arg(args, 1)?;
    let value = arg(args, 2)?.clone();
    let num_fields = universe.heap.instance(id).num_fields();
    if index >= num_fields {
        return Err(SendError::Primitive(format!(
            "field index {} out of bounds for {} fields",
            index + 1,
            num_fields
        )));
    }
    if !universe.set_field_checked(id, index, value.clone()) {
        return Err(SendError::Primitive(
            "write denied by domain policy".to_string(),
        ));
    }
    Ok(value)
}

fn prim_inst_var_named(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let name = symbol_arg(args, 1)?;
    universe
        .field_named(arg(args, 0)?, name)
        .map_err(|e| SendError::Primitive(e.to_string()))
}

fn prim_perform(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let receiver = arg(args, 0)?.clone();
    let selector = symbol_arg(args, 1)?;
    let resolved = dispatch::perform(universe, receiver, selector, &[])?;
    universe.invoke(&resolved)
}

fn prim_perform_in_superclass_plain(
    universe: &mut Universe,
    args: &[Value],
) -> Result<Value, SendError> {
    let receiver = arg(args, 0)?.clone();
    let selector = symbol_arg(args, 1)?;
    let class = class_arg(args, 2)?;
    let resolved = dispatch::perform_in_superclass(universe, receiver, selector, &[], class)?;
    universe.invoke(&resolved)
}

fn prim_perform_with_arguments(
    universe: &mut Universe,
    args: &[Value],
) -> Result<Value, SendError> {
    let receiver = arg(args, 0)?.clone();
    let selector = symbol_arg(args, 1)?;
    let arguments = universe.heap.array(array_arg(args, 2)?).elements.clone();
    let resolved = dispatch::perform(universe, receiver, selector, &arguments)?;
    universe.invoke(&resolved)
}

fn prim_perform_in_superclass(
    universe: &mut Universe,
    args: &[Value],
) -> Result<Value, SendError> {
    let receiver = arg(args, 0)?.clone();
    let selector = symbol_arg(args, 1)?;
    let arguments = universe.heap.array(array_arg(args, 2)?).elements.clone();
    let class = class_arg(args, 3)?;
    let resolved =
        dispatch::perform_in_superclass(universe, receiver, selector, &arguments, class)?;
    universe.invoke(&resolved)
}

/// Default handler of last resort. Hosts normally shadow this with a
/// compiled method; the built-in just reports and answers nil.
fn prim_does_not_understand(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let selector = symbol_arg(args, 1)?;
    let class = universe.class_of(arg(args, 0)?);
    error!(
        "{} instance does not understand #{}",
        universe.symbols.name(universe.classes.get(class).name),
        universe.symbols.name(selector)
    );
    Ok(Value::Nil)
}

fn prim_domain(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    Ok(Value::Domain(universe.owner_of(arg(args, 0)?)))
}

/// Breakpoint marker. Reports and answers the receiver unchanged.
fn prim_halt(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let receiver = arg(args, 0)?.clone();
    let class = universe.class_of(&receiver);
    warn!(
        "BREAKPOINT: #halt sent to an instance of {}",
        universe.symbols.name(universe.classes.get(class).name)
    );
    Ok(receiver)
}

// ---- Class ----

const CLASS_PRIMITIVES: &[PrimitiveSpec] = &[
    PrimitiveSpec {
        selector: "name",
        class_side: false,
        code: prim_class_name,
    },
    PrimitiveSpec {
        selector: "superclass",
        class_side: false,
        code: prim_class_superclass,
    },
    PrimitiveSpec {
        selector: "fields",
        class_side: false,
        code: prim_class_fields,
    },
    PrimitiveSpec {
        selector: "methods",
        class_side: false,
        code: prim_class_methods,
    },
    PrimitiveSpec {
        selector: "new",
        class_side: false,
        code: prim_class_new,
    },
];

fn prim_class_name(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let class = class_arg(args, 0)?;
    Ok(Value::Symbol(universe.classes.get(class).name))
}

fn prim_class_superclass(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let class = class_arg(args, 0)?;
    Ok(match universe.classes.get(class).superclass {
        Some(sup) => Value::Class(sup),
        None => Value::Nil,
    })
}

fn prim_class_fields(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let class = class_arg(args, 0)?;
    let fields: Vec<Value> = universe
        .classes
        .get(class)
        .instance_fields
        .iter()
        .map(|&f| Value::Symbol(f))
        .collect();
    Ok(Value::Array(universe.new_array_from(fields)))
}

fn prim_class_methods(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let class = class_arg(args, 0)?;
    let selectors: Vec<Value> = universe
        .classes
        .get(class)
        .instance_methods
        .iter()
        .map(|&mid| Value::Symbol(universe.classes.method(mid).signature))
        .collect();
    Ok(Value::Array(universe.new_array_from(selectors)))
}

fn prim_class_new(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let class = class_arg(args, 0)?;
    Ok(Value::Instance(universe.new_instance(class)))
}

// ---- Array ----

const ARRAY_PRIMITIVES: &[PrimitiveSpec] = &[
    PrimitiveSpec {
        selector: "at:",
        class_side: false,
        code: prim_array_at,
    },
    PrimitiveSpec {
        selector: "at:put:",
        class_side: false,
        code: prim_array_at_put,
    },
    PrimitiveSpec {
        selector: "length",
        class_side: false,
        code: prim_array_length,
    },
    PrimitiveSpec {
        selector: "new:",
        class_side: true,
        code: prim_array_new,
    },
];

fn prim_array_at(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let id = array_arg(args, 0)?;
    let index = index_arg(args, 1)?;
    universe
        .heap
        .array_at(id, index)
        .map_err(|e| SendError::Primitive(e.to_string()))
}

fn prim_array_at_put(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let id = array_arg(args, 0)?;
    let index = index_arg(args, 1)?;
    let value = arg(args, 2)?.clone();
    let owner = universe.heap.array(id).domain;
    if !universe.write_allowed(owner) {
        return Err(SendError::Primitive(
            "write denied by domain policy".to_string(),
        ));
    }
    universe
        .heap
        .array_at_put(id, index, value.clone())
        .map_err(|e| SendError::Primitive(e.to_string()))?;
    Ok(value)
}

fn prim_array_length(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    let id = array_arg(args, 0)?;
    Ok(Value::Integer(universe.heap.array(id).elements.len() as i64))
}

fn prim_array_new(universe: &mut Universe, args: &[Value]) -> Result<Value, SendError> {
    match arg(args, 1)? {
        Value::Integer(n) if *n >= 0 => Ok(Value::Array(universe.new_array(*n as usize))),
        other => Err(SendError::Primitive(format!(
            "expected a non-negative length, got {:?}",
            other
        ))),
    }
}

// ---- Domain ----

const DOMAIN_PRIMITIVES: &[PrimitiveSpec] = &[
    PrimitiveSpec {
        selector: "domainForNewObjects",
        class_side: false,
        code: prim_domain_for_new_objects,
    },
    PrimitiveSpec {
        selector: "domainForNewObjects:",
        class_side: false,
        code: prim_domain_for_new_objects_put,
    },
    PrimitiveSpec {
        selector: "new",
        class_side: true,
        code: prim_domain_new,
    },
];

fn prim_domain_for_new_objects(
    universe: &mut Universe,
    args: &[Value],
) -> Result<Value, SendError> {
    let id = domain_arg(args, 0)?;
    Ok(Value::Domain(universe.domains.domain_for_new_objects(id)))
}

fn prim_domain_for_new_objects_put(
    universe: &mut Universe,
    args: &[Value],
) -> Result<Value, SendError> {
    let id = domain_arg(args, 0)?;
    let target = domain_arg(args, 1)?;
    universe.domains.set_domain_for_new_objects(id, target);
    Ok(args[0].clone())
}

fn prim_domain_new(universe: &mut Universe, _args: &[Value]) -> Result<Value, SendError> {
    Ok(Value::Domain(universe.domains.create()))
}
