//! Tensor descriptors and dtype enumeration shared by metadata and predict
//! (spec §3 Engine Handle, §6 Predict JSON shapes).

use std::collections::HashMap;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Tensor element type, numbered the way TensorFlow Serving's own
/// `DataType` enum is (clients parse `dtype` as this integer — spec §8 S3
/// fixes `dtype: 1` for `DT_FLOAT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DataType {
    Invalid = 0,
    Float = 1,
    Double = 2,
    Int32 = 3,
    Uint8 = 4,
    Int16 = 5,
    Int8 = 6,
    String = 7,
    Int64 = 9,
    Bool = 10,
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(*self as u32)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u32::deserialize(deserializer)?;
        Ok(match code {
            0 => DataType::Invalid,
            1 => DataType::Float,
            2 => DataType::Double,
            3 => DataType::Int32,
            4 => DataType::Uint8,
            5 => DataType::Int16,
            6 => DataType::Int8,
            7 => DataType::String,
            9 => DataType::Int64,
            10 => DataType::Bool,
            other => return Err(D::Error::custom(format!("unknown dtype code {other}"))),
        })
    }
}

/// Immutable description of one named input or output tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub dtype: DataType,
    /// `-1` marks a dynamic dimension (including the batch dimension).
    pub shape: Vec<i64>,
}

impl TensorDescriptor {
    pub fn new(dtype: DataType, shape: Vec<i64>) -> Self {
        TensorDescriptor { dtype, shape }
    }

    /// True if `dims` could be an instance of this descriptor: same rank,
    /// and every non-dynamic dimension matches exactly.
    pub fn accepts_shape(&self, dims: &[i64]) -> bool {
        if dims.len() != self.shape.len() {
            return false;
        }
        self.shape
            .iter()
            .zip(dims.iter())
            .all(|(&expected, &got)| expected < 0 || expected == got)
    }
}

/// Bidirectional mapping between client-facing tensor names and a model's
/// internal tensor names (spec §3 Engine Handle `model_keys`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelKeys {
    pub inputs: HashMap<String, String>,
    pub outputs: HashMap<String, String>,
}

/// A named tensor's value, carried as JSON until it reaches the inference
/// runtime. Nesting depth is the tensor's rank.
pub type TensorValue = Value;

/// A full named-tensor input or output set, as consumed/produced by
/// [`crate::engine::InferenceRuntime::infer`].
pub type NamedTensors = HashMap<String, TensorValue>;

/// Infer the shape of a JSON value under the row/column convention used by
/// the Predict surface: scalars are rank 0, nested arrays add one dimension
/// per level.
pub fn infer_json_shape(value: &Value) -> Vec<i64> {
    let mut shape = Vec::new();
    let mut cur = value;
    loop {
        match cur {
            Value::Array(items) => {
                shape.push(items.len() as i64);
                match items.first() {
                    Some(first) => cur = first,
                    None => break,
                }
            }
            _ => break,
        }
    }
    shape
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_shape_with_dynamic_batch() {
        let desc = TensorDescriptor::new(DataType::Float, vec![-1, 3, 224, 224]);
        assert!(desc.accepts_shape(&[1, 3, 224, 224]));
        assert!(desc.accepts_shape(&[8, 3, 224, 224]));
        assert!(!desc.accepts_shape(&[1, 3, 225, 224]));
        assert!(!desc.accepts_shape(&[1, 3, 224]));
    }

    #[test]
    fn json_shape_nested() {
        let v = json!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(infer_json_shape(&v), vec![2, 3]);
    }

    #[test]
    fn dtype_float_is_one() {
        assert_eq!(DataType::Float as u32, 1);
    }
}
