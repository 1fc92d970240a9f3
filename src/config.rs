//! Compile-time configuration for the queued writes module and its helpers

/// Queued writes coordinator
pub mod qwr {
    /// Maximum number of attributes that can be registered per instance.
    ///
    /// 0 disables registration; every prepare write is then rejected and the
    /// user memory request is declined.
    pub const MAX_ATTR: usize = 8;

    /// Size of the memory buffer each instance stages prepared writes in
    pub const MEM_BUFFER_SIZE: usize = 512;

    /// Longest attribute value an apply step can rebuild
    pub const MAX_ATTR_VALUE_LEN: usize = 512;
}

/// GATT protocol limits
pub mod gatt {
    /// Largest prepare write payload (ATT_MTU 247 minus the 5 byte header)
    pub const MAX_PREPARE_WRITE_LEN: usize = 242;
}

/// Connection state tracking
pub mod conn_state {
    /// Concurrent links the stack is configured for
    pub const MAX_CONNECTIONS: usize = 4;
}

/// Link context storage
pub mod link_ctx {
    /// Per-link slot sizes must be a multiple of this
    pub const WORD_SIZE: usize = core::mem::size_of::<u32>();
}

/// Event dispatch
pub mod dispatch {
    /// Capacity of the stack event queue
    pub const EVENT_QUEUE_LEN: usize = 8;
}
