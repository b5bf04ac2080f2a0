//! Generation targets and the execution contexts each one pairs up.

use serde::{Deserialize, Serialize};

use crate::naming::{library_name, NamingBudget};
use crate::protocol::ChannelRole;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Target {
    /// Linux process paired with an AR C static library.
    #[default]
    CStaticLib,
    /// Linux process with Python/Node.js bindings paired with an AR C library.
    Swig,
}

/// One side of a generated channel: where its files go and which role it plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSpec {
    /// Directory under the component root.
    pub dir: String,
    pub role: ChannelRole,
    /// Name the side reports to the transport when it opens the channel.
    pub alias: String,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Target::CStaticLib => "c-static-lib",
            Target::Swig => "swig",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "c-static-lib" => Some(Target::CStaticLib),
            "swig" | "python" | "nodejs" => Some(Target::Swig),
            _ => None,
        }
    }

    /// Library-name budget the AR toolchain imposes for this target.
    pub fn default_budget(self) -> NamingBudget {
        match self {
            Target::CStaticLib => NamingBudget::new(10),
            Target::Swig => NamingBudget::new(7),
        }
    }

    /// The two contexts of one channel, publisher first.
    pub fn contexts(self, type_name: &str, budget: NamingBudget) -> [ContextSpec; 2] {
        let lib = library_name(type_name, budget);
        let ar_dir = match self {
            Target::CStaticLib => lib,
            Target::Swig => format!("lib{lib}"),
        };
        [
            ContextSpec {
                dir: "Linux".to_string(),
                role: ChannelRole::Publisher,
                alias: format!("{type_name}_Linux"),
            },
            ContextSpec {
                dir: ar_dir,
                role: ChannelRole::Subscriber,
                alias: format!("{type_name}_AR"),
            },
        ]
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
