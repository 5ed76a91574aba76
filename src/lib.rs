// MiniTalk: Object Model and Message Dispatch Core
//
// Class metaobjects, inline-cached message dispatch, and domain ownership
// for a Smalltalk-family language. Compilation and evaluation live outside
// this crate and talk to it through opaque method bodies and `Value`.

pub mod types;
pub mod fastmap;
pub mod symbol;
pub mod object;
pub mod class;
pub mod classgen;
pub mod dispatch;
pub mod domain;
pub mod universe;
pub mod primitives;
