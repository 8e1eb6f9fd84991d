/// Transform node operations
///
/// `set`, `merge` and `expression` are the whole vocabulary. Nothing here
/// reaches outside the `VariableContext` it is given.

use crate::error::NodeError;
use crate::runtime::context::VariableContext;
use crate::workflow::types::TransformConfig;
use serde_json::{Map, Value};

pub fn transform(config: &TransformConfig, ctx: &mut VariableContext) -> Result<Value, NodeError> {
    match config {
        TransformConfig::Set { variable, value } => {
            let resolved = ctx.resolve(value);
            ctx.set(variable.clone(), resolved.clone());
            Ok(single_entry(variable, resolved))
        }
        TransformConfig::Merge { sources } => {
            let mut merged = Map::new();
            for source in sources {
                // non-object sources are skipped
                if let Value::Object(map) = ctx.resolve(source) {
                    merged.extend(map);
                }
            }
            Ok(Value::Object(merged))
        }
        TransformConfig::Expression {
            expression,
            variable,
        } => {
            let value = expression.evaluate(ctx)?;
            match variable {
                Some(name) => {
                    ctx.set(name.clone(), value.clone());
                    Ok(single_entry(name, value))
                }
                None => Ok(value),
            }
        }
    }
}

fn single_entry(name: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), value);
    Value::Object(map)
}
