//! Opaque identifiers for conversations and model/tool calls.
//!
//! Generated ids are `<prefix>_<uuid v7>`, so ids minted by one process sort
//! by creation time. Ids that come from outside (a host's conversation key,
//! a backend's tool-call id) are taken verbatim through `from_raw` and never
//! validated against the prefix.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident => $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Mint a fresh time-ordered id.
            pub fn new() -> Self {
                Self(format!("{}_{}", Self::PREFIX, Uuid::now_v7()))
            }

            pub fn from_raw(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Ok(Self::from_raw(raw))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id! {
    /// Key of a stored conversation state.
    ConversationId => "conv"
}

opaque_id! {
    /// One call to the text-generation backend; chains retries and tool
    /// rounds through `prior_call_id`.
    CallId => "call"
}

opaque_id! {
    /// One tool call requested by the backend within a generation.
    ToolCallId => "tool"
}
