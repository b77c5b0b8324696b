use serde::{Deserialize, Serialize};

/// A typed payload carried by a mixer parameter message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
}

impl ParamValue {
    pub fn to_f32(&self) -> f32 {
        match self {
            ParamValue::Float(v) => *v,
            ParamValue::Int(v) => *v as f32,
        }
    }

    /// Interpret the payload as an on/off bit (anything above one half is on).
    pub fn is_on(&self) -> bool {
        match self {
            ParamValue::Float(v) => *v > 0.5,
            ParamValue::Int(v) => *v != 0,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{:.4}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_on_bits() {
        assert!(ParamValue::Int(1).is_on());
        assert!(!ParamValue::Int(0).is_on());
        assert!(ParamValue::Float(1.0).is_on());
        assert!(!ParamValue::Float(0.0).is_on());
        assert_eq!(ParamValue::Int(3).to_f32(), 3.0);
    }
}
