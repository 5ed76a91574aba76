// MiniTalk Object Store - heap storage for instances, arrays, and blocks.
//
// Three separate stores with three separate id types. A `Value::Array`
// can only ever index the array store, so "treat an array as a
// field-bearing object" is unrepresentable on the typed paths and is
// rejected with `AccessError` on the reflective ones. There is no GC;
// ids stay valid for the life of the `Universe`.

use std::fmt;

use crate::class::ClassId;
use crate::domain::DomainId;
use crate::symbol::SymbolId;
use crate::types::{BodyId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// Failure of a reflective field or element access.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessError {
    /// No instance field with that name, in the object's class or any
    /// superclass.
    FieldNotFound { field: SymbolId },
    /// Receiver has no named fields (array, block, or immediate).
    NotAFieldObject,
    /// Receiver is not an array.
    NotAnArray,
    /// Element or field index outside the receiver's extent.
    IndexOutOfBounds { index: usize, size: usize },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::FieldNotFound { field } => {
                write!(f, "no instance field with symbol id {}", field.0)
            }
            AccessError::NotAFieldObject => write!(f, "receiver has no named fields"),
            AccessError::NotAnArray => write!(f, "receiver is not an array"),
            AccessError::IndexOutOfBounds { index, size } => {
                write!(f, "index {} out of bounds for size {}", index, size)
            }
        }
    }
}

impl std::error::Error for AccessError {}

/// A field-bearing object. Field order is the cumulative declaration
/// order of its class at allocation time.
pub struct Instance {
    pub class: ClassId,
    pub domain: DomainId,
    fields: Vec<Value>,
}

impl Instance {
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Value {
        match self.fields.get(index) {
            Some(v) => v.clone(),
            None => panic!(
                "Field index {} out of bounds for instance with {} fields",
                index,
                self.fields.len()
            ),
        }
    }

    pub fn set_field(&mut self, index: usize, value: Value) {
        match self.fields.get_mut(index) {
            Some(slot) => *slot = value,
            None => panic!(
                "Field index {} out of bounds for instance with {} fields",
                index,
                self.fields.len()
            ),
        }
    }
}

/// Indexed storage. Arrays carry no class-declared fields.
pub struct ArrayObject {
    pub domain: DomainId,
    pub elements: Vec<Value>,
}

/// A closure value. The body is opaque here; the evaluator pairs it
/// with its captured environment.
pub struct Block {
    pub body: BodyId,
    pub domain: DomainId,
}

/// The heap. Allocation only; nothing is ever freed.
pub struct ObjectStore {
    instances: Vec<Instance>,
    arrays: Vec<ArrayObject>,
    blocks: Vec<Block>,
}

impl ObjectStore {
    pub fn new() -> Self {
        ObjectStore {
            instances: Vec::new(),
            arrays: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Allocate an instance with `num_fields` fields, all `Nil`.
    pub fn alloc_instance(
        &mut self,
        class: ClassId,
        domain: DomainId,
        num_fields: usize,
    ) -> ObjectId {
        let id = ObjectId(self.instances.len() as u32);
        self.instances.push(Instance {
            class,
            domain,
            fields: vec![Value::Nil; num_fields],
        });
        id
    }

    pub fn alloc_array(&mut self, domain: DomainId, elements: Vec<Value>) -> ArrayId {
        let id = ArrayId(self.arrays.len() as u32);
        self.arrays.push(ArrayObject { domain, elements });
        id
    }

    pub fn alloc_block(&mut self, body: BodyId, domain: DomainId) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block { body, domain });
        id
    }

    pub fn instance(&self, id: ObjectId) -> &Instance {
        &self.instances[id.0 as usize]
    }

    pub fn instance_mut(&mut self, id: ObjectId) -> &mut Instance {
        &mut self.instances[id.0 as usize]
    }

    pub fn array(&self, id: ArrayId) -> &ArrayObject {
        &self.arrays[id.0 as usize]
    }

    pub fn array_mut(&mut self, id: ArrayId) -> &mut ArrayObject {
        &mut self.arrays[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    /// Checked array element read, 0-based.
    pub fn array_at(&self, id: ArrayId, index: usize) -> Result<Value, AccessError> {
        let arr = self.array(id);
        arr.elements
            .get(index)
            .cloned()
            .ok_or(AccessError::IndexOutOfBounds {
                index,
                size: arr.elements.len(),
            })
    }

    /// Checked array element write, 0-based.
    pub fn array_at_put(
        &mut self,
        id: ArrayId,
        index: usize,
        value: Value,
    ) -> Result<(), AccessError> {
        let arr = self.array_mut(id);
        let size = arr.elements.len();
        match arr.elements.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(AccessError::IndexOutOfBounds { index, size }),
        }
    }

    /// Ids of all instances whose class is `class`, in allocation order.
    pub fn instances_of(&self, class: ClassId) -> Vec<ObjectId> {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.class == class)
            .map(|(i, _)| ObjectId(i as u32))
            .collect()
    }

    /// Rebuild an instance's field vector after its class's field list
    /// changed. Fields are matched by name; the last declaration of a
    /// name in `old_fields` wins, and fields new in `new_fields` start
    /// as `Nil`.
    pub fn migrate_instance(
        &mut self,
        id: ObjectId,
        old_fields: &[SymbolId],
        new_fields: &[SymbolId],
    ) {
        let inst = &mut self.instances[id.0 as usize];
        let mut fields = Vec::with_capacity(new_fields.len());
        for name in new_fields {
            let carried = old_fields
                .iter()
                .rposition(|f| f == name)
                .map(|i| inst.fields[i].clone());
            fields.push(carried.unwrap_or(Value::Nil));
        }
        inst.fields = fields;
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ObjectStore {
        ObjectStore::new()
    }

    #[test]
    fn test_instance_fields_start_nil() {
        let mut heap = store();
        let id = heap.alloc_instance(ClassId(0), DomainId(0), 3);
        let inst = heap.instance(id);
        assert_eq!(inst.num_fields(), 3);
        assert_eq!(inst.field(0), Value::Nil);
        assert_eq!(inst.field(2), Value::Nil);
    }

    #[test]
    fn test_field_write_read() {
        let mut heap = store();
        let id = heap.alloc_instance(ClassId(0), DomainId(0), 2);
        heap.instance_mut(id).set_field(1, Value::Integer(42));
        assert_eq!(heap.instance(id).field(1), Value::Integer(42));
        assert_eq!(heap.instance(id).field(0), Value::Nil);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_field_read_out_of_bounds_panics() {
        let mut heap = store();
        let id = heap.alloc_instance(ClassId(0), DomainId(0), 1);
        heap.instance(id).field(1);
    }

    #[test]
    fn test_array_bounds_are_checked() {
        let mut heap = store();
        let id = heap.alloc_array(DomainId(0), vec![Value::Nil; 2]);
        assert_eq!(heap.array_at(id, 1), Ok(Value::Nil));
        assert_eq!(
            heap.array_at(id, 2),
            Err(AccessError::IndexOutOfBounds { index: 2, size: 2 })
        );
        assert!(heap.array_at_put(id, 0, Value::Integer(1)).is_ok());
        assert_eq!(heap.array_at(id, 0), Ok(Value::Integer(1)));
    }

    #[test]
    fn test_migrate_preserves_by_name_and_nils_new() {
        let mut heap = store();
        let x = SymbolId(10);
        let y = SymbolId(11);
        let z = SymbolId(12);
        let old = vec![x, y];
        let new = vec![x, z, y];
        let id = heap.alloc_instance(ClassId(0), DomainId(0), 2);
        heap.instance_mut(id).set_field(0, Value::Integer(1));
        heap.instance_mut(id).set_field(1, Value::Integer(2));
        heap.migrate_instance(id, &old, &new);
        let inst = heap.instance(id);
        assert_eq!(inst.field(0), Value::Integer(1));
        assert_eq!(inst.field(1), Value::Nil);
        assert_eq!(inst.field(2), Value::Integer(2));
    }

    #[test]
    fn test_instances_of_filters_by_class() {
        let mut heap = store();
        let a = heap.alloc_instance(ClassId(1), DomainId(0), 0);
        let _b = heap.alloc_instance(ClassId(2), DomainId(0), 0);
        let c = heap.alloc_instance(ClassId(1), DomainId(0), 0);
        assert_eq!(heap.instances_of(ClassId(1)), vec![a, c]);
    }
}
