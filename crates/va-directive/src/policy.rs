//! Blocking policy (§3, §5): the rule by which a directive can serialize
//! handling of later directives sharing its dialog group and medium.

/// The resource a directive's `handle()` occupies while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Medium {
    /// Occupies no medium; never blocks anything and is never blocked by
    /// another directive's medium occupancy.
    None,
    Audio,
    Visual,
}

/// Attached to a directive (via its handler's `DirectiveHandlerConfiguration`
/// entry) to declare whether handling it should serialize with respect to
/// other directives in the same dialog group that occupy the same medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingPolicy {
    pub medium: Medium,
    /// If true, no other directive in the same dialog group that shares
    /// this medium may begin `handle()` until this one completes (or
    /// fails). `medium == None` makes `is_blocking` moot — a directive that
    /// occupies no medium cannot block anything regardless of this flag.
    pub is_blocking: bool,
}

impl BlockingPolicy {
    pub const fn new(medium: Medium, is_blocking: bool) -> Self {
        BlockingPolicy { medium, is_blocking }
    }

    /// The default policy for a directive whose handler declared none:
    /// occupies no medium, blocks nothing.
    pub const fn non_blocking() -> Self {
        BlockingPolicy::new(Medium::None, false)
    }

    pub fn blocks(&self) -> bool {
        self.is_blocking && !matches!(self.medium, Medium::None)
    }
}

impl Default for BlockingPolicy {
    fn default() -> Self {
        BlockingPolicy::non_blocking()
    }
}
