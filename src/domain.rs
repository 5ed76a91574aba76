// MiniTalk Domains - ownership partitions over the heap.
//
// Every heap-allocated object belongs to exactly one domain. Literals
// and other immediates are owned by the standard domain. A domain can
// delegate allocation, so code running "in" one domain can produce
// objects owned by another. Ownership never moves after allocation.

/// Domain handle. Index into the `DomainTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainId(pub u32);

struct Domain {
    /// Where objects allocated while this domain is current end up.
    /// Starts out self-referential.
    domain_for_new_objects: DomainId,
}

/// All live domains. Domains are never removed.
pub struct DomainTable {
    domains: Vec<Domain>,
}

/// Host hook deciding whether `writer` may mutate an object owned by
/// `owner`. The default admits every write.
pub type WritePolicyFn = fn(writer: DomainId, owner: DomainId) -> bool;

pub fn allow_all_writes(_writer: DomainId, _owner: DomainId) -> bool {
    true
}

impl DomainTable {
    pub fn new() -> Self {
        DomainTable {
            domains: Vec::new(),
        }
    }

    /// Create a fresh domain that allocates into itself.
    pub fn create(&mut self) -> DomainId {
        let id = DomainId(self.domains.len() as u32);
        self.domains.push(Domain {
            domain_for_new_objects: id,
        });
        id
    }

    pub fn domain_for_new_objects(&self, id: DomainId) -> DomainId {
        self.domains[id.0 as usize].domain_for_new_objects
    }

    /// Redirect allocations made under `id` into `target`.
    pub fn set_domain_for_new_objects(&mut self, id: DomainId, target: DomainId) {
        self.domains[id.0 as usize].domain_for_new_objects = target;
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl Default for DomainTable {
    fn default() -> Self {
        Self::new()
    }
}
