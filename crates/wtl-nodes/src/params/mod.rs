mod store;
mod types;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use self::store::{ControlEntry, ParameterStore};
pub use self::types::{ParamDef, ParamValue};

/// One-shot button press sent by the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionFlag {
    /// Commit the previewed params and run the full effect.
    Apply,
    /// Pass the input (or current batch item) through unchanged.
    Skip,
}

impl ActionFlag {
    pub const ALL: &[ActionFlag] = &[ActionFlag::Apply, ActionFlag::Skip];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionFlag::Apply => "apply",
            ActionFlag::Skip => "skip",
        }
    }
}

impl fmt::Display for ActionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionFlag {
    type Err = String;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apply" => Ok(ActionFlag::Apply),
            "skip" => Ok(ActionFlag::Skip),
            _ => Err(s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("APPLY".parse(), Ok(ActionFlag::Apply));
        assert_eq!("Skip".parse(), Ok(ActionFlag::Skip));
        assert_eq!(" apply ".parse(), Ok(ActionFlag::Apply));
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!("maybe".parse::<ActionFlag>(), Err("maybe".to_string()));
        assert!("".parse::<ActionFlag>().is_err());
    }

    #[test]
    fn display_roundtrips() {
        for flag in ActionFlag::ALL {
            assert_eq!(flag.to_string().parse::<ActionFlag>(), Ok(*flag));
        }
    }
}
