use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two fixed relay nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Planet {
    Earth,
    Mars,
}

impl Planet {
    pub const ALL: [Planet; 2] = [Planet::Earth, Planet::Mars];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Earth => "Earth",
            Self::Mars => "Mars",
        }
    }

    /// Whether chat messages from this node are routed through the transport layer.
    ///
    /// Only Earth may originate `message` events.
    pub fn can_send_messages(self) -> bool {
        matches!(self, Self::Earth)
    }
}

impl fmt::Display for Planet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
