//! Identifiers exchanged between the hypervisor, its tasks and RPC clients

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Default,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

define_id!(
    /// Identity of an external worker process tracked by the task registry
    TaskId
);

define_id!(
    /// Identity of a terminal session
    TerminalId
);

define_id!(
    /// Key of a pub/sub channel in the channel bus
    ChannelId
);

define_id!(
    /// Identity of any resource tracked by the channel bus
    ResourceId
);

/// Processes are addressed by the id of the task that runs them.
pub type ProcessId = TaskId;

impl From<TaskId> for ResourceId {
    fn from(id: TaskId) -> Self {
        Self(id.0)
    }
}

impl From<TerminalId> for ResourceId {
    fn from(id: TerminalId) -> Self {
        Self(id.0)
    }
}

impl From<ChannelId> for ResourceId {
    fn from(id: ChannelId) -> Self {
        Self(id.0)
    }
}
