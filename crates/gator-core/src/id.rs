use std::fmt;

macro_rules! define_seq_id {
    (
        $(#[$outer:meta])*
        struct $t:ident
    ) => {
        $(#[$outer])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
        pub struct $t(u64);

        impl $t {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_seq_id!(
    /// Identity of a registered user
    struct UserId
);

define_seq_id!(
    /// Identity of a registered feed
    struct FeedId
);

define_seq_id!(
    /// Identity of an ingested post
    struct PostId
);
