//! Call descriptors: the per-invocation record a memoized call is keyed on.
//!
//! A [`CallDescriptor`] carries the function's qualified name, its
//! canonicalized arguments, and the keying configuration. The bound entity
//! (the receiver of a method call) is an explicit field with an explicit
//! exclusion flag rather than something inferred from parameter names;
//! callers that wrap methods state it outright.

use std::collections::BTreeMap;

use crate::value::ArgValue;

/// Immutable description of a single function invocation.
///
/// Created per call by the wrapper, consumed by the key generator and
/// metadata construction, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    /// Qualified name of the function being memoized.
    function_name: String,
    /// Canonicalized positional arguments (excluding the bound entity).
    args: Vec<ArgValue>,
    /// Canonicalized named arguments.
    kwargs: BTreeMap<String, ArgValue>,
    /// Declared names of the positional parameters, aligned with `args`.
    /// Used to match positional arguments against `key_parameters`.
    param_names: Vec<String>,
    /// The receiver of a method call, if any.
    bound_entity: Option<ArgValue>,
    /// Whether the bound entity is excluded from key and metadata. The
    /// default is inclusion: exclusion happens only when explicitly
    /// requested.
    ignore_bound_entity: bool,
    /// Explicit subset of parameter names to key on. `None` keys on all
    /// arguments.
    key_parameters: Option<Vec<String>>,
}

impl CallDescriptor {
    /// Start building a descriptor for the named function.
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            param_names: Vec::new(),
            bound_entity: None,
            ignore_bound_entity: false,
            key_parameters: None,
        }
    }

    /// Append a positional argument with its declared parameter name.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.param_names.push(name.into());
        self.args.push(value.into());
        self
    }

    /// Add a named argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Attach the bound entity (method receiver).
    pub fn bound(mut self, entity: impl Into<ArgValue>) -> Self {
        self.bound_entity = Some(entity.into());
        self
    }

    /// Exclude the bound entity from key and metadata computation.
    pub fn ignore_bound_entity(mut self, ignore: bool) -> Self {
        self.ignore_bound_entity = ignore;
        self
    }

    /// Restrict the key to the named parameters.
    pub fn key_parameters(mut self, names: Vec<String>) -> Self {
        self.key_parameters = Some(names);
        self
    }

    /// Qualified function name.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn bound_entity(&self) -> Option<&ArgValue> {
        self.bound_entity.as_ref()
    }

    pub fn is_bound_entity_ignored(&self) -> bool {
        self.ignore_bound_entity
    }

    pub fn configured_key_parameters(&self) -> Option<&[String]> {
        self.key_parameters.as_deref()
    }

    /// Fill keying configuration from settings where the descriptor has
    /// none of its own. Descriptor-level configuration wins.
    pub fn with_settings_defaults(
        mut self,
        key_parameters: Option<&[String]>,
        ignore_bound_entity: bool,
    ) -> Self {
        if self.key_parameters.is_none() {
            self.key_parameters = key_parameters.map(|names| names.to_vec());
        }
        self.ignore_bound_entity = self.ignore_bound_entity || ignore_bound_entity;
        self
    }

    /// Arguments recorded into metadata: the bound entity is filtered out
    /// when ignored, everything else is kept regardless of `key_parameters`.
    pub fn recorded_args(&self) -> Vec<ArgValue> {
        let mut recorded = Vec::with_capacity(self.args.len() + 1);
        if let Some(bound) = &self.bound_entity {
            if !self.ignore_bound_entity {
                recorded.push(bound.clone());
            }
        }
        recorded.extend(self.args.iter().cloned());
        recorded
    }

    /// Named arguments recorded into metadata.
    pub fn recorded_kwargs(&self) -> BTreeMap<String, ArgValue> {
        self.kwargs.clone()
    }

    /// Positional arguments participating in the cache key.
    ///
    /// With `key_parameters` configured, only arguments whose declared
    /// parameter name appears in the subset are included; the rest are
    /// structurally absent, not hashed-away. The bound entity has no
    /// parameter name, so a configured subset always excludes it.
    pub fn key_args(&self) -> Vec<ArgValue> {
        match &self.key_parameters {
            Some(subset) => self
                .param_names
                .iter()
                .zip(self.args.iter())
                .filter(|(name, _)| subset.contains(name))
                .map(|(_, value)| value.clone())
                .collect(),
            None => self.recorded_args(),
        }
    }

    /// Named arguments participating in the cache key.
    pub fn key_kwargs(&self) -> BTreeMap<String, ArgValue> {
        match &self.key_parameters {
            Some(subset) => self
                .kwargs
                .iter()
                .filter(|(name, _)| subset.contains(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            None => self.kwargs.clone(),
        }
    }
}
