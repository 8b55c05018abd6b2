//! Built-in recipes
//!
//! The platform library every scope falls back to. `builtin.value` serves its
//! literal properties; `builtin.composite` additionally holds references to
//! other services and forwards calls to them.

use serde_json::{json, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::module::context::RecipeContext;
use crate::module::sandbox::{CallContext, Library};
use crate::module::traits::{CapabilityId, ComponentError, Invocation, Service, ServiceRef};

/// Name of the built-in platform library
pub const BUILTIN_LIBRARY: &str = "builtin";
/// Recipe id of the value service
pub const VALUE_RECIPE: &str = "builtin.value";
/// Capability served by value services
pub const VALUE_CAPABILITY: &str = "builtin.Value";
/// Recipe id of the composite service
pub const COMPOSITE_RECIPE: &str = "builtin.composite";
/// Capability served by composite services
pub const COMPOSITE_CAPABILITY: &str = "builtin.Composite";

/// Build the built-in platform library
pub fn library() -> Library {
    Library::new(BUILTIN_LIBRARY)
        .with_recipe(VALUE_RECIPE, |ctx| {
            let service: ServiceRef = Arc::new(ValueService::new(ctx.properties_json()?));
            Ok(service)
        })
        .with_recipe(COMPOSITE_RECIPE, build_composite)
        .declare_capability(VALUE_CAPABILITY)
        .declare_capability(COMPOSITE_CAPABILITY)
}

fn build_composite(ctx: &mut RecipeContext<'_>) -> Result<ServiceRef, ComponentError> {
    let mut refs = BTreeMap::new();
    for property in ctx.ref_names() {
        let target = ctx.reference(&property)?;
        refs.insert(property, target);
    }
    let service: ServiceRef = Arc::new(CompositeService {
        name: ctx.name().to_string(),
        values: ValueService::new(ctx.properties_json()?),
        refs,
    });
    Ok(service)
}

fn unknown(invocation: &Invocation) -> ComponentError {
    ComponentError::UnknownMethod {
        capability: invocation.capability.clone(),
        method: invocation.method.clone(),
    }
}

/// Service returning its literal properties
#[derive(Debug, Clone)]
pub struct ValueService {
    properties: Value,
}

impl ValueService {
    /// Create a value service over a JSON value
    pub fn new(properties: Value) -> Self {
        Self { properties }
    }

    /// The served value
    pub fn value(&self) -> &Value {
        &self.properties
    }

    fn get(&self, args: &Value) -> Value {
        match args.get("key").and_then(Value::as_str) {
            Some(key) => self.properties.get(key).cloned().unwrap_or(Value::Null),
            None => self.properties.clone(),
        }
    }
}

impl Service for ValueService {
    fn capabilities(&self) -> Vec<CapabilityId> {
        vec![VALUE_CAPABILITY.to_string()]
    }

    fn invoke(
        &self,
        _call: &mut CallContext,
        invocation: &Invocation,
    ) -> Result<Value, ComponentError> {
        match (invocation.capability.as_str(), invocation.method.as_str()) {
            (VALUE_CAPABILITY, "get") => Ok(self.get(&invocation.args)),
            _ => Err(unknown(invocation)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Service holding references to other services
pub struct CompositeService {
    name: String,
    values: ValueService,
    refs: BTreeMap<String, ServiceRef>,
}

impl CompositeService {
    /// Reference held under a property name
    pub fn reference(&self, property: &str) -> Option<&ServiceRef> {
        self.refs.get(property)
    }

    /// Property names of the held references
    pub fn reference_names(&self) -> Vec<String> {
        self.refs.keys().cloned().collect()
    }

    fn forward(&self, call: &mut CallContext, args: &Value) -> Result<Value, ComponentError> {
        let field = |key: &str| {
            args.get(key).and_then(Value::as_str).ok_or_else(|| {
                ComponentError::Invocation(format!("{}: call requires '{}'", self.name, key))
            })
        };
        let property = field("ref")?;
        let target = self.refs.get(property).ok_or_else(|| {
            ComponentError::Invocation(format!("{} holds no reference {}", self.name, property))
        })?;

        let inner = Invocation::new(
            field("capability")?,
            field("method")?,
            args.get("args").cloned().unwrap_or(Value::Null),
        );
        debug!("{} forwarding {} via {}", self.name, inner, property);
        target.invoke(call, &inner)
    }
}

impl Service for CompositeService {
    fn capabilities(&self) -> Vec<CapabilityId> {
        vec![COMPOSITE_CAPABILITY.to_string(), VALUE_CAPABILITY.to_string()]
    }

    fn invoke(
        &self,
        call: &mut CallContext,
        invocation: &Invocation,
    ) -> Result<Value, ComponentError> {
        match (invocation.capability.as_str(), invocation.method.as_str()) {
            (COMPOSITE_CAPABILITY, "call") => self.forward(call, &invocation.args),
            (COMPOSITE_CAPABILITY, "refs") => Ok(json!(self.reference_names())),
            (VALUE_CAPABILITY, _) => self.values.invoke(call, invocation),
            _ => Err(unknown(invocation)),
        }
    }

    fn destroy(&self) {
        debug!("Releasing {} references held by {}", self.refs.len(), self.name);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::sandbox::ResolutionScope;

    fn call() -> CallContext {
        CallContext::new(ResolutionScope::platform(vec![Arc::new(library())]))
    }

    #[test]
    fn test_value_get() {
        let service = ValueService::new(json!({"greeting": "hello", "count": 2}));
        let mut call = call();

        let all = service
            .invoke(&mut call, &Invocation::new(VALUE_CAPABILITY, "get", Value::Null))
            .unwrap();
        assert_eq!(all["count"], 2);

        let one = service
            .invoke(
                &mut call,
                &Invocation::new(VALUE_CAPABILITY, "get", json!({"key": "greeting"})),
            )
            .unwrap();
        assert_eq!(one, json!("hello"));
    }

    #[test]
    fn test_unknown_method() {
        let service = ValueService::new(Value::Null);
        let err = service
            .invoke(&mut call(), &Invocation::new(VALUE_CAPABILITY, "set", Value::Null))
            .unwrap_err();
        assert!(matches!(err, ComponentError::UnknownMethod { .. }));
    }

    #[test]
    fn test_composite_forwards_to_reference() {
        let target: ServiceRef = Arc::new(ValueService::new(json!({"k": "v"})));
        let mut refs = BTreeMap::new();
        refs.insert("store".to_string(), target);
        let composite = CompositeService {
            name: "c".into(),
            values: ValueService::new(json!({})),
            refs,
        };
        let mut call = call();

        let out = composite
            .invoke(
                &mut call,
                &Invocation::new(
                    COMPOSITE_CAPABILITY,
                    "call",
                    json!({"ref": "store", "capability": VALUE_CAPABILITY, "method": "get", "args": {"key": "k"}}),
                ),
            )
            .unwrap();
        assert_eq!(out, json!("v"));

        let names = composite
            .invoke(&mut call, &Invocation::new(COMPOSITE_CAPABILITY, "refs", Value::Null))
            .unwrap();
        assert_eq!(names, json!(["store"]));

        let missing = composite.invoke(
            &mut call,
            &Invocation::new(COMPOSITE_CAPABILITY, "call", json!({"ref": "nope"})),
        );
        assert!(matches!(missing, Err(ComponentError::Invocation(_))));
    }

    #[test]
    fn test_library_declares_builtin_capabilities() {
        let lib = library();
        assert!(lib.declares(VALUE_CAPABILITY));
        assert!(lib.declares(COMPOSITE_CAPABILITY));
        assert!(lib.recipe(VALUE_RECIPE).is_some());
        assert!(lib.recipe(COMPOSITE_RECIPE).is_some());
    }
}
