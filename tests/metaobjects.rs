// Class assembly, field layout, lookup memoization, and the
// notification sends, exercised through the public surface.

use minitalk::class::{InstallOutcome, MethodKind};
use minitalk::classgen::{ClassGenerationContext, MethodDecl};
use minitalk::types::{BodyId, Value};
use minitalk::universe::Universe;

fn assemble(cgc: ClassGenerationContext, u: &mut Universe) -> minitalk::class::ClassId {
    match cgc.assemble(u) {
        Ok(id) => id,
        Err(e) => panic!("assembly failed: {}", e),
    }
}

fn define_point_hierarchy(u: &mut Universe) -> (minitalk::class::ClassId, minitalk::class::ClassId) {
    let mut point = ClassGenerationContext::new();
    let name = u.symbols.intern("Point");
    point.set_name(name);
    for f in ["x", "y"] {
        let f = u.symbols.intern(f);
        point.add_field(f);
    }
    let plus = u.symbols.intern("+");
    point.add_method(MethodDecl {
        signature: plus,
        kind: MethodKind::Compiled(BodyId(1)),
    });
    let point = assemble(point, u);

    let mut point3d = ClassGenerationContext::new();
    let name = u.symbols.intern("Point3D");
    let super_name = u.symbols.intern("Point");
    point3d.set_name(name);
    point3d.set_super_name(super_name);
    let z = u.symbols.intern("z");
    point3d.add_field(z);
    let point3d = assemble(point3d, u);
    (point, point3d)
}

#[test]
fn point_hierarchy_field_layout() {
    let mut u = Universe::new();
    let (_, point3d) = define_point_hierarchy(&mut u);
    let x = u.symbols.intern("x");
    let y = u.symbols.intern("y");
    let z = u.symbols.intern("z");
    assert_eq!(u.classes.field_index(point3d, x), Some(0));
    assert_eq!(u.classes.field_index(point3d, y), Some(1));
    assert_eq!(u.classes.field_index(point3d, z), Some(2));

    let obj = u.new_instance(point3d);
    assert_eq!(u.heap.instance(obj).num_fields(), 3);
}

#[test]
fn inherited_method_resolves_from_subclass() {
    let mut u = Universe::new();
    let (point, point3d) = define_point_hierarchy(&mut u);
    let plus = u.symbols.intern("+");
    let found = u.classes.lookup(point3d, plus);
    assert!(found.is_some());
    let found = match found {
        Some(m) => m,
        None => unreachable!(),
    };
    assert_eq!(u.classes.method(found).holder, point);
    assert_eq!(u.classes.lookup(point, plus), Some(found));
}

#[test]
fn redefinition_reaches_memoized_subclass_lookups() {
    let mut u = Universe::new();
    let (point, point3d) = define_point_hierarchy(&mut u);
    let plus = u.symbols.intern("+");
    let original = u.classes.lookup(point3d, plus);

    // Replace on the superclass: same id, new body, memo still valid.
    let (replaced, outcome) =
        u.classes
            .add_or_replace_method(point, plus, MethodKind::Compiled(BodyId(10)));
    assert_eq!(outcome, InstallOutcome::Replaced);
    assert_eq!(original, Some(replaced));
    assert!(matches!(
        u.classes.method(replaced).kind,
        MethodKind::Compiled(BodyId(10))
    ));

    // Override on the subclass: memoized answer must be recomputed.
    let (own, outcome) =
        u.classes
            .add_or_replace_method(point3d, plus, MethodKind::Compiled(BodyId(11)));
    assert_eq!(outcome, InstallOutcome::Added);
    assert_eq!(u.classes.lookup(point3d, plus), Some(own));
    assert_eq!(u.classes.lookup(point, plus), Some(replaced));
}

#[test]
fn classes_answer_metaclass_sends() {
    let mut u = Universe::new();
    let (point, _) = define_point_hierarchy(&mut u);
    let name = u.symbols.intern("name");
    let fields = u.symbols.intern("fields");
    let expected = u.symbols.intern("Point");
    assert_eq!(
        u.send(Value::Class(point), name, &[]),
        Ok(Value::Symbol(expected))
    );
    let x = u.symbols.intern("x");
    let y = u.symbols.intern("y");
    match u.send(Value::Class(point), fields, &[]) {
        Ok(Value::Array(id)) => {
            assert_eq!(
                u.heap.array(id).elements,
                vec![Value::Symbol(x), Value::Symbol(y)]
            );
        }
        other => panic!("expected field array, got {:?}", other),
    }
}

#[test]
fn new_instances_start_with_nil_fields() {
    let mut u = Universe::new();
    let (point, _) = define_point_hierarchy(&mut u);
    let new = u.symbols.intern("new");
    let get = u.symbols.intern("instVarNamed:");
    let x = u.symbols.intern("x");
    let obj = match u.send(Value::Class(point), new, &[]) {
        Ok(v) => v,
        Err(e) => panic!("new failed: {}", e),
    };
    assert_eq!(u.send(obj, get, &[Value::Symbol(x)]), Ok(Value::Nil));
}

#[test]
fn field_update_migrates_live_instances() {
    let mut u = Universe::new();
    let (point, _) = define_point_hierarchy(&mut u);
    let x = u.symbols.intern("x");
    let y = u.symbols.intern("y");
    let color = u.symbols.intern("color");

    let obj = u.new_instance(point);
    u.heap.instance_mut(obj).set_field(0, Value::Integer(4));
    u.heap.instance_mut(obj).set_field(1, Value::Integer(5));

    let migrated = u.update_instance_fields(point, vec![x, color, y]);
    assert_eq!(migrated, 1);
    let inst = u.heap.instance(obj);
    assert_eq!(inst.field(0), Value::Integer(4));
    assert_eq!(inst.field(1), Value::Nil);
    assert_eq!(inst.field(2), Value::Integer(5));
    assert_eq!(u.classes.field_index(point, color), Some(1));
}

#[test]
fn field_update_propagates_to_subclasses() {
    let mut u = Universe::new();
    let (point, point3d) = define_point_hierarchy(&mut u);
    let x = u.symbols.intern("x");
    let y = u.symbols.intern("y");
    let z = u.symbols.intern("z");

    let flat = u.new_instance(point);
    u.heap.instance_mut(flat).set_field(0, Value::Integer(1));
    let deep = u.new_instance(point3d);
    u.heap.instance_mut(deep).set_field(0, Value::Integer(2));
    u.heap.instance_mut(deep).set_field(2, Value::Integer(3));

    // Dropping y from Point must drop it from Point3D's layout too.
    let migrated = u.update_instance_fields(point, vec![x]);
    assert_eq!(migrated, 2);
    assert_eq!(u.classes.field_index(point3d, y), None);
    assert_eq!(u.classes.field_index(point3d, x), Some(0));
    assert_eq!(u.classes.field_index(point3d, z), Some(1));
    assert_eq!(u.classes.num_instance_fields(point3d), 2);

    let inst = u.heap.instance(deep);
    assert_eq!(inst.num_fields(), 2);
    assert_eq!(inst.field(0), Value::Integer(2));
    assert_eq!(inst.field(1), Value::Integer(3));
    assert_eq!(u.heap.instance(flat).num_fields(), 1);

    // Fresh subclass instances allocate the rebuilt layout.
    let fresh = u.new_instance(point3d);
    assert_eq!(u.heap.instance(fresh).num_fields(), 2);
}

#[test]
fn notification_sends_resolve_to_handlers() {
    let mut u = Universe::new();
    let mut cgc = ClassGenerationContext::new();
    let name = u.symbols.intern("Actor");
    cgc.set_name(name);
    let escaped = u.sym_escaped_block;
    let unknown = u.sym_unknown_global;
    cgc.add_method(MethodDecl {
        signature: escaped,
        kind: MethodKind::Compiled(BodyId(20)),
    });
    cgc.add_method(MethodDecl {
        signature: unknown,
        kind: MethodKind::Compiled(BodyId(21)),
    });
    let actor = assemble(cgc, &mut u);
    let receiver = Value::Instance(u.new_instance(actor));

    let block = Value::Block(u.new_block(BodyId(5)));
    let resolved = u.escaped_block(receiver.clone(), block.clone());
    assert_eq!(u.classes.method(resolved.method).holder, actor);
    assert_eq!(resolved.arguments, vec![receiver.clone(), block]);

    let missing = u.symbols.intern("TheMissingGlobal");
    let resolved = u.unknown_global(receiver.clone(), missing);
    assert_eq!(u.classes.method(resolved.method).holder, actor);
    assert_eq!(resolved.arguments, vec![receiver, Value::Symbol(missing)]);
}

#[test]
fn notification_sends_fall_back_to_dnu() {
    let mut u = Universe::new();
    // No handler anywhere: the notification becomes a DNU send.
    let block = Value::Block(u.new_block(BodyId(5)));
    let resolved = u.escaped_block(Value::Integer(1), block);
    assert_eq!(
        u.classes.method(resolved.method).signature,
        u.sym_does_not_understand
    );
    assert_eq!(resolved.arguments[1], Value::Symbol(u.sym_escaped_block));
}

#[test]
fn evaluator_receives_compiled_bodies() {
    fn eval(
        _u: &mut Universe,
        body: BodyId,
        args: &[Value],
    ) -> Result<Value, minitalk::dispatch::SendError> {
        assert!(!args.is_empty());
        Ok(Value::Integer(body.0 as i64))
    }
    let mut u = Universe::new();
    let (point, _) = define_point_hierarchy(&mut u);
    u.set_evaluator(eval);
    let plus = u.symbols.intern("+");
    let receiver = Value::Instance(u.new_instance(point));
    assert_eq!(
        u.send(receiver, plus, &[Value::Integer(2)]),
        Ok(Value::Integer(1))
    );
}

#[test]
fn domains_track_ownership_of_new_objects() {
    let mut u = Universe::new();
    let (point, _) = define_point_hierarchy(&mut u);
    let d = u.domains.create();
    u.set_current_domain(d);
    let obj = u.new_instance(point);
    assert_eq!(u.owner_of(&Value::Instance(obj)), d);
    // Literals stay with the standard domain regardless.
    assert_eq!(u.owner_of(&Value::Integer(3)), u.standard_domain);

    let domain_sel = u.symbols.intern("domain");
    assert_eq!(
        u.send(Value::Instance(obj), domain_sel, &[]),
        Ok(Value::Domain(d))
    );
}
