use indexmap::IndexMap;

use crate::{
    script::{Scope, Value},
    SmarteeResult,
};

/// Named values a template is rendered with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    data: IndexMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: AsRef<str>, V: Into<Value>>(&mut self, name: N, value: V) -> &mut Self {
        self.data.insert(name.as_ref().to_string(), value.into());
        self
    }

    pub fn get<N: AsRef<str>>(&self, name: N) -> Option<&Value> {
        self.data.get(name.as_ref())
    }

    pub fn contains<N: AsRef<str>>(&self, name: N) -> bool {
        self.data.contains_key(name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn to_scope(&self) -> Scope {
        self.data.clone()
    }

    /// Builds parameters from any serializable map-like value, e.g. a struct.
    ///
    /// # Errors
    /// - If serialization fails.
    /// - If `value` does not serialize to a map.
    #[cfg(feature = "serde")]
    pub fn from_serialize<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        use serde::ser::Error as _;

        match serde_json::to_value(value)? {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(serde_json::Error::custom(format!(
                "parameters must serialize to a map, got {other}"
            ))),
        }
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl From<Scope> for Params {
    fn from(data: Scope) -> Self {
        Self { data }
    }
}

/// `SmarteeInterface` is the entry point of the engine: register templates
/// by name, then render them with parameters.
pub trait SmarteeInterface {
    /// `add_template` compiles a template and makes it available by name.
    ///
    /// # Errors
    /// - If the template name is a duplicate.
    /// - If the template does not compile.
    fn add_template<N: AsRef<str>, C: Into<String>>(
        &mut self,
        name: N,
        content: C,
    ) -> SmarteeResult<()>;

    /// `render` renders a template with the given parameters.
    ///
    /// # Errors
    /// - If the template, or one it pulls in, cannot be found or compiled.
    /// - If rendering fails.
    fn render<N: AsRef<str>>(
        &self,
        template_name: N,
        params: Option<&Params>,
    ) -> SmarteeResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_params_builder() {
        let mut params = Params::new();
        params.insert("name", "World").insert("count", 3);
        assert_eq!(params.len(), 2);
        assert!(params.contains("name"));
        assert_eq!(params.get("count"), Some(&Value::Int(3)));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_params_keep_insertion_order() {
        let params: Params = [("b", 1), ("a", 2)].into_iter().collect();
        let keys: Vec<String> = params.to_scope().keys().cloned().collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
