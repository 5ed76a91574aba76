// MiniTalk Dispatch - inline-cached send sites and reflective sends.
//
// Each send site owns a `DispatchChain` keyed by receiver class. A
// chain starts empty, fills monomorphically up to `INLINE_CACHE_SIZE`
// distinct receiver classes, and collapses permanently to a megamorphic
// per-send lookup when one more class shows up. Lookup failure never
// surfaces here: it rewrites the send into `doesNotUnderstand:arguments:`,
// which the bootstrap guarantees `Object` answers.

use std::fmt;

use log::debug;
use smallvec::SmallVec;

use crate::class::{ClassId, MethodId};
use crate::symbol::SymbolId;
use crate::types::Value;
use crate::universe::Universe;

/// Distinct receiver classes a chain may cache before collapsing.
pub const INLINE_CACHE_SIZE: usize = 6;

/// What a send site resolved to for one receiver class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTarget {
    Method(MethodId),
    /// Selector not understood; target is the receiver's
    /// `doesNotUnderstand:arguments:` handler.
    DoesNotUnderstand(MethodId),
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    class: ClassId,
    target: DispatchTarget,
}

/// A resolved send, ready for invocation. `arguments[0]` is the
/// receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub method: MethodId,
    pub arguments: Vec<Value>,
}

/// Failure of a send or invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SendError {
    /// Reflective lookup found nothing; plain sends fall back to
    /// `doesNotUnderstand:arguments:` instead of reporting this.
    SelectorNotFound { class: ClassId, selector: SymbolId },
    /// A compiled method was invoked but no evaluator is registered.
    MissingEvaluator,
    /// A primitive rejected its arguments.
    Primitive(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::SelectorNotFound { class, selector } => write!(
                f,
                "selector id {} not found in class id {}",
                selector.0, class.0
            ),
            SendError::MissingEvaluator => {
                write!(f, "no evaluator registered for compiled methods")
            }
            SendError::Primitive(msg) => write!(f, "primitive failed: {}", msg),
        }
    }
}

impl std::error::Error for SendError {}

/// Per-send-site inline cache over receiver classes.
pub struct DispatchChain {
    selector: SymbolId,
    entries: SmallVec<[CacheEntry; INLINE_CACHE_SIZE]>,
    /// Once set, never cleared. Stale entries are dropped on epoch
    /// change, but a collapsed site stays collapsed.
    megamorphic: bool,
    epoch: u64,
}

impl DispatchChain {
    pub fn new(selector: SymbolId) -> Self {
        DispatchChain {
            selector,
            entries: SmallVec::new(),
            megamorphic: false,
            epoch: 0,
        }
    }

    pub fn selector(&self) -> SymbolId {
        self.selector
    }

    pub fn is_megamorphic(&self) -> bool {
        self.megamorphic
    }

    /// Cached receiver classes currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a send of this chain's selector. Always yields a target:
    /// unknown selectors become `doesNotUnderstand:arguments:` sends
    /// with the original selector and arguments reified.
    pub fn resolve(
        &mut self,
        universe: &mut Universe,
        receiver: Value,
        arguments: &[Value],
    ) -> Resolved {
        let class = universe.class_of(&receiver);
        let epoch = universe.classes.epoch();
        if self.epoch != epoch {
            self.entries.clear();
            self.epoch = epoch;
        }

        let cached = if self.megamorphic {
            None
        } else {
            self.entries
                .iter()
                .find(|e| e.class == class)
                .map(|e| e.target)
        };
        let target = match cached {
            Some(target) => target,
            None => {
                let target = target_for(universe, class, self.selector);
                if self.megamorphic {
                    // Per-send lookup; nothing to record.
                } else if self.entries.len() < INLINE_CACHE_SIZE {
                    self.entries.push(CacheEntry { class, target });
                } else {
                    debug!(
                        "send site for selector id {} saw class id {}, going megamorphic",
                        self.selector.0, class.0
                    );
                    self.entries.clear();
                    self.megamorphic = true;
                }
                target
            }
        };

        match target {
            DispatchTarget::Method(method) => Resolved {
                method,
                arguments: with_receiver(receiver, arguments),
            },
            DispatchTarget::DoesNotUnderstand(method) => {
                let reified = universe.new_array_from(arguments.to_vec());
                Resolved {
                    method,
                    arguments: vec![
                        receiver,
                        Value::Symbol(self.selector),
                        Value::Array(reified),
                    ],
                }
            }
        }
    }
}

fn target_for(universe: &mut Universe, class: ClassId, selector: SymbolId) -> DispatchTarget {
    match universe.classes.lookup(class, selector) {
        Some(method) => DispatchTarget::Method(method),
        None => DispatchTarget::DoesNotUnderstand(universe.dnu_method(class)),
    }
}

/// Reflective send: uncached lookup starting at the receiver's class.
/// Does not fall back to `doesNotUnderstand:arguments:`.
pub fn perform(
    universe: &mut Universe,
    receiver: Value,
    selector: SymbolId,
    arguments: &[Value],
) -> Result<Resolved, SendError> {
    let class = universe.class_of(&receiver);
    perform_in_superclass(universe, receiver, selector, arguments, class)
}

/// Reflective send with an explicit lookup class, for super-style
/// sends. The class is trusted to be on the receiver's chain.
pub fn perform_in_superclass(
    universe: &mut Universe,
    receiver: Value,
    selector: SymbolId,
    arguments: &[Value],
    class: ClassId,
) -> Result<Resolved, SendError> {
    let method = universe
        .classes
        .lookup_uncached(class, selector)
        .ok_or(SendError::SelectorNotFound { class, selector })?;
    Ok(Resolved {
        method,
        arguments: with_receiver(receiver, arguments),
    })
}

pub(crate) fn with_receiver(receiver: Value, arguments: &[Value]) -> Vec<Value> {
    let mut merged = Vec::with_capacity(arguments.len() + 1);
    merged.push(receiver);
    merged.extend_from_slice(arguments);
    merged
}
