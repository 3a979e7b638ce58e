//! The memoization call wrapper.
//!
//! A [`Memoizer`] ties a backend, cache settings, and a type registry
//! together and drives the lookup/compute/persist cycle for a single call,
//! described by a [`CallDescriptor`]. The wrapped computation reports its
//! result as an [`Outcome`], which distinguishes a usable value produced
//! alongside a failure (persisted, then the failure is surfaced) from an
//! outright failure (nothing persisted).

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use memoir_core::{
    generate_key, is_primitive_type, is_valid, qualified_name, ArgValue, CacheEntry, CacheError,
    CacheSettings, CallDescriptor, Metadata, TypeRegistry,
};

use crate::CacheBackend;

/// Result of one invocation of the wrapped computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, E> {
    /// A value to cache and return.
    Success(T),
    /// A usable value produced despite a failure: the value is cached so
    /// later calls can recover it, then the failure is surfaced.
    Recoverable(T, E),
    /// Nothing usable; nothing is cached.
    Failure(E),
}

/// Error from a memoized call: either the cache machinery failed, or the
/// wrapped computation did.
#[derive(Debug, Error)]
pub enum CallError<E: std::error::Error> {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("memoized function failed: {0}")]
    Function(#[source] E),
}

impl<E: std::error::Error> CallError<E> {
    /// Whether this is a cache-only miss.
    pub fn is_miss(&self) -> bool {
        matches!(self, CallError::Cache(err) if err.is_miss())
    }
}

/// A memoized return value, with metadata attached when the settings ask
/// for it.
#[derive(Debug, Clone, PartialEq)]
pub enum Memoized<T> {
    Plain(T),
    WithMetadata(T, Metadata),
}

impl<T> Memoized<T> {
    pub fn value(&self) -> &T {
        match self {
            Memoized::Plain(value) => value,
            Memoized::WithMetadata(value, _) => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Memoized::Plain(value) => value,
            Memoized::WithMetadata(value, _) => value,
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            Memoized::Plain(_) => None,
            Memoized::WithMetadata(_, metadata) => Some(metadata),
        }
    }

    /// Whether the value was recalled from cache rather than computed.
    /// Without attached metadata the provenance is unknown and this
    /// reports false.
    pub fn from_cache(&self) -> bool {
        self.metadata().map(|md| md.from_cache).unwrap_or(false)
    }
}

/// Drives memoized calls against a backend.
///
/// The registry is owned and interior-mutable: encoding a payload may
/// auto-register its type.
#[derive(Debug)]
pub struct Memoizer<B> {
    backend: B,
    settings: CacheSettings,
    registry: RwLock<TypeRegistry>,
}

impl<B: CacheBackend> Memoizer<B> {
    pub fn new(backend: B, settings: CacheSettings) -> Self {
        Self {
            backend,
            settings,
            registry: RwLock::new(TypeRegistry::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Pre-register a payload type with the generic envelope pair.
    pub fn register_type<T>(&self) -> Result<(), CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.registry
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .register::<T>();
        Ok(())
    }

    /// Apply a custom registration to the owned registry.
    pub fn with_registry<F>(&self, configure: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut TypeRegistry),
    {
        let mut registry = self.registry.write().map_err(|_| CacheError::LockPoisoned)?;
        configure(&mut registry);
        Ok(())
    }

    /// Execute one memoized call.
    ///
    /// A stored, unexpired entry is returned without invoking `compute`,
    /// its metadata marked as recalled. Otherwise `compute` runs; its
    /// [`Outcome`] decides what is persisted and what is returned. With
    /// `cache_only` set, a miss is a hard [`CacheError::Miss`] and
    /// `compute` is never invoked.
    pub fn call<T, E, F>(
        &self,
        descriptor: &CallDescriptor,
        compute: F,
    ) -> Result<Memoized<T>, CallError<E>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: std::error::Error,
        F: FnOnce() -> Outcome<T, E>,
    {
        let descriptor = descriptor.clone().with_settings_defaults(
            self.settings.key_parameters.as_deref(),
            self.settings.ignore_bound_entity,
        );
        let key = generate_key(&descriptor);

        if let Some(entry) = self.backend.get(&key)? {
            let valid = is_valid(&entry.metadata, Utc::now(), &self.settings)
                .map_err(CacheError::from)?;
            if valid {
                return self.recall(entry);
            }
        }

        if self.settings.cache_only {
            return Err(CallError::Cache(CacheError::Miss {
                function: descriptor.function_name().to_string(),
                key,
            }));
        }

        match compute() {
            Outcome::Success(value) => {
                let metadata = self.persist(&key, &descriptor, &value)?;
                Ok(self.shape(value, metadata))
            }
            Outcome::Recoverable(value, err) => {
                self.persist(&key, &descriptor, &value)?;
                Err(CallError::Function(err))
            }
            Outcome::Failure(err) => Err(CallError::Function(err)),
        }
    }

    fn recall<T, E>(&self, entry: CacheEntry) -> Result<Memoized<T>, CallError<E>>
    where
        T: DeserializeOwned + Send + 'static,
        E: std::error::Error,
    {
        let mut metadata = entry.metadata;
        metadata.from_cache = true;

        let declared = self
            .settings
            .force_data_type
            .as_deref()
            .or(metadata.data_type.as_deref());
        let registry = self.registry.read().map_err(|_| CacheError::LockPoisoned)?;
        let value: T = registry
            .decode(&entry.data, declared)
            .map_err(CacheError::from)?;
        drop(registry);

        Ok(self.shape(value, metadata))
    }

    fn persist<T, E>(
        &self,
        key: &str,
        descriptor: &CallDescriptor,
        value: &T,
    ) -> Result<Metadata, CallError<E>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: std::error::Error,
    {
        let now = Utc::now();
        let mut metadata = Metadata::new_at(now);
        metadata.expires_at = self
            .settings
            .resolve_expires_at(now)
            .map_err(CacheError::from)?;
        metadata.args = descriptor.recorded_args();
        metadata.kwargs = descriptor.recorded_kwargs();
        metadata.data_type = Some(
            self.settings
                .force_data_type
                .clone()
                .unwrap_or_else(|| qualified_name::<T>().to_string()),
        );
        metadata.is_flat_data = self.settings.is_flat_data;

        let data = self
            .registry
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .encode(value)
            .map_err(CacheError::from)?;

        let entry = CacheEntry::new(metadata.clone(), data);
        self.backend.set(key, &entry)?;
        Ok(metadata)
    }

    fn shape<T>(&self, value: T, metadata: Metadata) -> Memoized<T> {
        if !self.settings.return_metadata_as_member {
            return Memoized::Plain(value);
        }
        let primitive = metadata
            .data_type
            .as_deref()
            .map(is_primitive_type)
            .unwrap_or(false);
        if primitive && !self.settings.return_metadata_on_primitives {
            return Memoized::Plain(value);
        }
        Memoized::WithMetadata(value, metadata)
    }
}

/// Arguments for one invocation of a wrapped function.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    args: Vec<(String, ArgValue)>,
    kwargs: BTreeMap<String, ArgValue>,
    bound_entity: Option<ArgValue>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument with its declared parameter name.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn bound(mut self, entity: impl Into<ArgValue>) -> Self {
        self.bound_entity = Some(entity.into());
        self
    }

    /// Look up a positional argument by its declared name.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.args
            .iter()
            .find(|(arg_name, _)| arg_name == name)
            .map(|(_, value)| value)
            .or_else(|| self.kwargs.get(name))
    }

    fn into_descriptor(self, function_name: &str) -> CallDescriptor {
        let mut descriptor = CallDescriptor::new(function_name);
        for (name, value) in self.args {
            descriptor = descriptor.arg(name, value);
        }
        for (name, value) in self.kwargs {
            descriptor = descriptor.kwarg(name, value);
        }
        if let Some(entity) = self.bound_entity {
            descriptor = descriptor.bound(entity);
        }
        descriptor
    }
}

/// Wrap a computation into a reusable memoized function.
///
/// The returned closure takes the call's arguments, derives the key, and
/// runs the full lookup/compute/persist cycle on each invocation.
pub fn wrap<'a, B, T, E, F>(
    memoizer: &'a Memoizer<B>,
    function_name: &'a str,
    f: F,
) -> impl Fn(CallArgs) -> Result<Memoized<T>, CallError<E>> + 'a
where
    B: CacheBackend,
    T: Serialize + DeserializeOwned + Send + 'static,
    E: std::error::Error,
    F: Fn(&CallArgs) -> Outcome<T, E> + 'a,
{
    move |args: CallArgs| {
        let descriptor = args.clone().into_descriptor(function_name);
        memoizer.call(&descriptor, || f(&args))
    }
}
