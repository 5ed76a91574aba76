// MiniTalk Core Types - tagged values and heap handles.
//
// `Value` is the universal currency between the object model, the
// dispatch machinery, and whatever evaluator the host wires in. Small
// immediates live inline; everything mutable lives behind a typed
// handle into one of the stores, so an array can never be mistaken for
// a field-bearing instance at the type level.

use num_bigint::BigInt;

use crate::class::ClassId;
use crate::domain::DomainId;
use crate::object::{ArrayId, BlockId, ObjectId};
use crate::symbol::SymbolId;

/// Opaque handle to a compiled method body. The evaluator owns the
/// mapping from `BodyId` to executable code; this crate only threads
/// it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(pub u32);

/// A runtime value. Immediates carry their payload; heap kinds carry a
/// typed index into the matching store in `Universe`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    BigInteger(BigInt),
    Double(f64),
    Str(String),
    Symbol(SymbolId),
    Array(ArrayId),
    Instance(ObjectId),
    Class(ClassId),
    Block(BlockId),
    Domain(DomainId),
}

impl Value {
    /// True for `Nil` and nothing else.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}
