//! Surrogate id newtypes. Cyclic ownership (subnet <-> shared-network <->
//! host) is avoided in-memory by referencing parents by id rather than by
//! pointer, per the design notes.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! surrogate_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

surrogate_id!(MachineId);
surrogate_id!(AppId);
surrogate_id!(DaemonId);
surrogate_id!(SharedNetworkId);
surrogate_id!(SubnetId);
surrogate_id!(HostId);
surrogate_id!(UserId);
