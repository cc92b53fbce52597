use serde::{Deserialize, Serialize};

/// Declared shape of one editable node input, in the order the node lists it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ParamDef {
    Float {
        name: &'static str,
        default: f64,
        min: f64,
        max: f64,
    },
    Int {
        name: &'static str,
        default: i64,
        min: i64,
        max: i64,
    },
    Bool {
        name: &'static str,
        default: bool,
    },
    Choice {
        name: &'static str,
        default: &'static str,
        options: &'static [&'static str],
    },
}

impl ParamDef {
    pub fn name(&self) -> &'static str {
        match self {
            ParamDef::Float { name, .. } => name,
            ParamDef::Int { name, .. } => name,
            ParamDef::Bool { name, .. } => name,
            ParamDef::Choice { name, .. } => name,
        }
    }

    pub fn default_value(&self) -> ParamValue {
        match self {
            ParamDef::Float { default, .. } => ParamValue::Float(*default),
            ParamDef::Int { default, .. } => ParamValue::Int(*default),
            ParamDef::Bool { default, .. } => ParamValue::Bool(*default),
            ParamDef::Choice { default, .. } => ParamValue::Str((*default).to_string()),
        }
    }

    /// Convert a JSON value posted by the control panel into this param's
    /// value, clamping numbers into range. Returns the reason on mismatch.
    pub fn coerce(&self, value: &serde_json::Value) -> Result<ParamValue, String> {
        match self {
            ParamDef::Float { min, max, .. } => value
                .as_f64()
                .map(|v| ParamValue::Float(v.clamp(*min, *max)))
                .ok_or_else(|| format!("expected a number, got {value}")),
            ParamDef::Int { min, max, .. } => {
                let v = value
                    .as_i64()
                    .or_else(|| value.as_f64().map(|f| f.round() as i64))
                    .ok_or_else(|| format!("expected an integer, got {value}"))?;
                Ok(ParamValue::Int(v.clamp(*min, *max)))
            }
            ParamDef::Bool { .. } => value
                .as_bool()
                .map(ParamValue::Bool)
                .ok_or_else(|| format!("expected a boolean, got {value}")),
            ParamDef::Choice { options, .. } => {
                let s = value
                    .as_str()
                    .ok_or_else(|| format!("expected a string, got {value}"))?;
                if options.contains(&s) {
                    Ok(ParamValue::Str(s.to_string()))
                } else {
                    Err(format!("'{s}' is not one of {}", options.join(", ")))
                }
            }
        }
    }
}

/// One primitive live value. A node's params are an ordered `Vec<ParamValue>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Ints widen to floats; sliders may post either.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}
