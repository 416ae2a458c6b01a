//! Predict input-format discriminator (spec §4.7, §6, §9 redesign note).
//!
//! The source dispatches on `type(body) is dict` and which key is present;
//! this elevates that into a tagged discriminator computed once per request.

use serde_json::{Map, Value};

use crate::{
    error::Error,
    tensor::{NamedTensors, TensorValue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Row,
    Column,
}

/// Classify a Predict request body. Anything that isn't exactly one of the
/// two recognized shapes is rejected with `INVALID_INPUT` up front, rather
/// than producing an `Invalid` variant callers have to remember to check.
pub fn detect_format(body: &Value) -> Result<InputFormat, Error> {
    let Value::Object(map) = body else {
        return Err(Error::invalid_input("Invalid inputs in request body"));
    };
    let has_instances = map.contains_key("instances");
    let has_inputs = map.contains_key("inputs");
    match (has_instances, has_inputs) {
        (true, false) => {
            if map.get("instances").map(Value::is_array).unwrap_or(false) {
                Ok(InputFormat::Row)
            } else {
                Err(Error::invalid_input("Invalid inputs in request body"))
            }
        }
        (false, true) => Ok(InputFormat::Column),
        _ => Err(Error::invalid_input("Invalid inputs in request body")),
    }
}

/// Turn a validated request body into the named, fully batched tensors the
/// Engine Handle expects (spec §6 Predict JSON shapes).
pub fn body_to_named_tensors(
    body: &Value,
    format: InputFormat,
    input_key_names: &[String],
) -> Result<NamedTensors, Error> {
    match format {
        InputFormat::Column => {
            let inputs = body.get("inputs").expect("format already validated");
            match inputs {
                Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
                other => {
                    let name = single_input_name(input_key_names)?;
                    Ok(NamedTensors::from([(name.clone(), other.clone())]))
                }
            }
        }
        InputFormat::Row => {
            let instances = body
                .get("instances")
                .and_then(Value::as_array)
                .expect("format already validated");
            if input_key_names.len() <= 1 {
                let name = single_input_name(input_key_names)?;
                Ok(NamedTensors::from([(name.clone(), Value::Array(instances.clone()))]))
            } else {
                let mut columns: NamedTensors = input_key_names
                    .iter()
                    .map(|name| (name.clone(), Value::Array(Vec::with_capacity(instances.len()))))
                    .collect();
                for row in instances {
                    let Value::Object(row) = row else {
                        return Err(Error::invalid_input(
                            "row format requires a mapping per instance for multi-input models",
                        ));
                    };
                    for name in input_key_names {
                        let value = row.get(name).cloned().ok_or_else(|| {
                            Error::invalid_input(format!("instance missing input '{name}'"))
                        })?;
                        let Value::Array(column) = columns.get_mut(name).unwrap() else {
                            unreachable!()
                        };
                        column.push(value);
                    }
                }
                Ok(columns)
            }
        }
    }
}

fn single_input_name(input_key_names: &[String]) -> Result<&String, Error> {
    input_key_names
        .first()
        .ok_or_else(|| Error::invalid_input("model declares no inputs"))
}

/// Mirror the request format in the Predict response (spec §6, property 3).
pub fn named_tensors_to_response(outputs: &NamedTensors, format: InputFormat) -> Value {
    match format {
        InputFormat::Column => {
            let body = if outputs.len() == 1 {
                outputs.values().next().cloned().unwrap_or(Value::Null)
            } else {
                Value::Object(outputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>())
            };
            Value::Object(Map::from_iter([("outputs".to_string(), body)]))
        }
        InputFormat::Row => {
            let predictions = if outputs.len() == 1 {
                let value = outputs.values().next().cloned().unwrap_or(Value::Null);
                value.as_array().cloned().unwrap_or_else(|| vec![value])
            } else {
                let batch_len = outputs
                    .values()
                    .next()
                    .and_then(TensorValue::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);
                (0..batch_len)
                    .map(|i| {
                        Value::Object(
                            outputs
                                .iter()
                                .map(|(name, value)| {
                                    let row = value
                                        .as_array()
                                        .and_then(|a| a.get(i).cloned())
                                        .unwrap_or(Value::Null);
                                    (name.clone(), row)
                                })
                                .collect::<Map<_, _>>(),
                        )
                    })
                    .collect()
            };
            Value::Object(Map::from_iter([(
                "predictions".to_string(),
                Value::Array(predictions),
            )]))
        }
    }
}
