use bitflags::bitflags;

bitflags! {
    /// Capability switches of a storage policy, persisted as one integer column.
    ///
    /// A bit that is not set reads as `false`, so rows written before a flag
    /// existed keep the capability disabled.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PolicyFlags: i64 {
        /// Backend can produce thumbnails natively.
        const THUMBNAIL    = 1 << 0;
        /// Uploads are relayed through this node instead of going direct.
        const RELAY        = 1 << 1;
        /// Backend space is reserved before the upload starts.
        const PRE_ALLOCATE = 1 << 2;
        /// No new content may be written to this policy.
        const READ_ONLY    = 1 << 3;
    }
}

impl PolicyFlags {
    /// Decode a stored column value. Unknown bits are dropped.
    pub fn from_column(value: i64) -> Self {
        Self::from_bits_truncate(value)
    }

    pub fn to_column(self) -> i64 {
        self.bits()
    }

    pub fn is_read_only(self) -> bool {
        self.contains(Self::READ_ONLY)
    }
}
