use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Fully resolved attributes, ready to cross the isolation boundary to the
/// conversion engine.
pub type AttributeMap = BTreeMap<String, serde_json::Value>;

/// Trailing marker flagging a key as overridable by later contributions.
pub const OVERRIDE_MARKER: char = '@';

/// Placeholder written for a value that is still deferred after the single
/// resolution pass.
pub const DEFERRED_PLACEHOLDER: &str = "<deferred>";

/// An attribute value that is either concrete or deferred until the
/// conversion pass resolves it.
#[derive(Clone)]
pub enum AttributeValue {
    Value(serde_json::Value),
    Deferred(Arc<dyn Fn() -> AttributeValue + Send + Sync>),
}

impl AttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::Value(serde_json::Value::String(value.into()))
    }

    pub fn deferred(supplier: impl Fn() -> AttributeValue + Send + Sync + 'static) -> Self {
        Self::Deferred(Arc::new(supplier))
    }

    /// Resolves the value exactly once. A deferred value that yields another
    /// deferred value is not resolved further; it is normalized to its
    /// string form because the result must be serializable.
    fn resolve_once(self) -> serde_json::Value {
        match self {
            AttributeValue::Value(value) => value,
            AttributeValue::Deferred(supplier) => match supplier() {
                AttributeValue::Value(value) => value,
                AttributeValue::Deferred(_) => {
                    serde_json::Value::String(DEFERRED_PLACEHOLDER.to_string())
                }
            },
        }
    }
}

impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Value(value) => write!(f, "Value({value})"),
            AttributeValue::Deferred(_) => f.write_str(DEFERRED_PLACEHOLDER),
        }
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::string(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Value(serde_json::Value::Bool(value))
    }
}

/// A pluggable source of attribute contributions, merged before computed
/// defaults in registration order (later providers win on collision).
pub trait AttributeProvider: Send + Sync {
    fn attributes(&self) -> BTreeMap<String, AttributeValue>;
}

/// Merges seed attributes, per-language attributes, provider contributions,
/// and computed defaults into one effective map.
///
/// Precedence: user-supplied (seed) values always beat computed defaults;
/// per-language values beat global seed values; providers are overlaid in
/// list order. Computed defaults are suppressed when the key is already
/// present (override marker stripped before comparison) and stored under
/// their marker-suffixed form otherwise.
#[derive(Default)]
pub struct AttributeResolver {
    seed: BTreeMap<String, AttributeValue>,
    per_language: BTreeMap<String, BTreeMap<String, AttributeValue>>,
    providers: Vec<Arc<dyn AttributeProvider>>,
    computed_defaults: BTreeMap<String, AttributeValue>,
}

impl AttributeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.seed.insert(key.into(), value.into());
        self
    }

    pub fn language_attribute(
        mut self,
        language: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.per_language
            .entry(language.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn AttributeProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn computed_default(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.computed_defaults.insert(key.into(), value.into());
        self
    }

    /// Computes the effective attribute map for one conversion pass.
    pub fn resolve(&self, language: Option<&str>) -> AttributeMap {
        let mut working = self.seed.clone();

        if let Some(code) = language {
            if let Some(overlay) = self.per_language.get(code) {
                working.extend(overlay.clone());
            }
        }

        for provider in &self.providers {
            working.extend(provider.attributes());
        }

        let present: BTreeSet<String> = working
            .keys()
            .map(|key| strip_marker(key).to_string())
            .collect();

        let mut defaults = self.computed_defaults.clone();
        if let Some(code) = language {
            defaults
                .entry("lang".to_string())
                .or_insert_with(|| AttributeValue::string(code));
        }
        for (key, value) in defaults {
            let bare = strip_marker(&key);
            if present.contains(bare) {
                continue;
            }
            working.insert(format!("{bare}{OVERRIDE_MARKER}"), value);
        }

        working
            .into_iter()
            .map(|(key, value)| (key, value.resolve_once()))
            .collect()
    }
}

fn strip_marker(key: &str) -> &str {
    key.strip_suffix(OVERRIDE_MARKER).unwrap_or(key)
}
