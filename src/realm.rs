//
// Deployment surface a token/OTP/client belongs to.
//
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Realm {
    Web,
    Mobile,
}

impl Realm {
    pub fn as_str(self) -> &'static str {
        match self {
            Realm::Web => "web",
            Realm::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Realm {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Realm::Web),
            "mobile" => Ok(Realm::Mobile),
            _ => Err(()),
        }
    }
}
