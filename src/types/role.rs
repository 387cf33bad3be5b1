//! User roles

use serde::{Deserialize, Serialize};

/// Which side of the marketplace a user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Business,
    Influencer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Business => "business",
            UserRole::Influencer => "influencer",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business" => Ok(UserRole::Business),
            "influencer" => Ok(UserRole::Influencer),
            other => Err(format!("unknown user role: {}", other)),
        }
    }
}
