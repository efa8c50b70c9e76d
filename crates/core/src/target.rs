//! Enumerated datasets held by the cache.
//!
//! Every table the application reads is a [`Target`]. The list is closed: the
//! cache never holds a dataset that is not named here.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A logical dataset, mapping one-to-one onto a database table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Sessions,
    Members,
    Settings,
    Locales,
    Themes,
    MemberDevices,
    Groups,
    Features,
    Widgets,
    Registry,
    Categories,
    Forums,
    Topics,
    Posts,
    ContentTracker,
}

impl Target {
    /// Every target, in build order.
    pub const ALL: [Target; 15] = [
        Target::Sessions,
        Target::Members,
        Target::Settings,
        Target::Locales,
        Target::Themes,
        Target::MemberDevices,
        Target::Groups,
        Target::Features,
        Target::Widgets,
        Target::Registry,
        Target::Categories,
        Target::Forums,
        Target::Topics,
        Target::Posts,
        Target::ContentTracker,
    ];

    /// Unprefixed table name.
    pub fn table(self) -> &'static str {
        match self {
            Target::Sessions => "sessions",
            Target::Members => "members",
            Target::Settings => "settings",
            Target::Locales => "locales",
            Target::Themes => "themes",
            Target::MemberDevices => "member_devices",
            Target::Groups => "user_groups",
            Target::Features => "features",
            Target::Widgets => "widgets",
            Target::Registry => "registry",
            Target::Categories => "categories",
            Target::Forums => "forums",
            Target::Topics => "topics",
            Target::Posts => "posts",
            Target::ContentTracker => "content_tracker",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .into_iter()
            .find(|t| t.table() == s)
            .ok_or_else(|| Error::NotFound(format!("unknown target: {s}")))
    }
}
