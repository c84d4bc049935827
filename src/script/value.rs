use std::{cell::RefCell, cmp::Ordering, fmt, rc::Rc};

use indexmap::IndexMap;

/// Array key. Decimal strings such as `"12"` are normalised to integers, so
/// `$a['1']` and `$a[1]` address the same slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::Int(*i),
            Self::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        let canonical = s
            .parse::<i64>()
            .ok()
            .filter(|i| i.to_string() == s);
        canonical.map_or_else(|| Self::Str(s.to_string()), Self::Int)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        match Self::from(s.as_str()) {
            Self::Int(i) => Self::Int(i),
            Self::Str(_) => Self::Str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Self::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

pub type Array = IndexMap<Key, Value>;

/// Position of a named `{foreach}` loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopState {
    pub items: Vec<(Key, Value)>,
    pub index: usize,
}

/// Shared handle to a [`LoopState`]. The loop advances it while templates
/// read its properties through `$smarty.foreach.<name>.<property>`.
#[derive(Debug, Clone, Default)]
pub struct LoopTracker(Rc<RefCell<LoopState>>);

impl PartialEq for LoopTracker {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl LoopTracker {
    pub fn new(items: Vec<(Key, Value)>) -> Self {
        Self(Rc::new(RefCell::new(LoopState { items, index: 0 })))
    }

    pub fn total(&self) -> usize {
        self.0.borrow().items.len()
    }

    pub(crate) fn item(&self, index: usize) -> Option<(Key, Value)> {
        let mut state = self.0.borrow_mut();
        let item = state.items.get(index).cloned()?;
        state.index = index;
        Some(item)
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        let state = self.0.borrow();
        let total = state.items.len();
        let index = state.index;
        let iteration = index.saturating_add(1);
        let value = match name {
            "index" | "counter0" => Value::from(index),
            "iteration" | "counter" => Value::from(iteration),
            "first" => Value::Bool(index == 0),
            "last" => Value::Bool(iteration == total),
            "total" => Value::from(total),
            "show" => Value::Bool(total > 0),
            "empty" => Value::Bool(total == 0),
            "odd" => Value::Bool(iteration % 2 == 1),
            "even" => Value::Bool(iteration % 2 == 0),
            _ => return None,
        };
        Some(value)
    }
}

/// A runtime value of the target script.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Markup that is already safe to print in an HTML context.
    Html(String),
    Array(Array),
    Loop(LoopTracker),
}

impl Value {
    pub fn html(markup: impl Into<String>) -> Self {
        Self::Html(markup.into())
    }

    /// A list keyed `0..n`.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Self>,
    {
        Self::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Key::from(i), v.into()))
                .collect(),
        )
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Html(_) => "html",
            Self::Array(_) => "array",
            Self::Loop(_) => "loop",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) | Self::Html(s) => !s.is_empty() && s != "0",
            Self::Array(a) => !a.is_empty(),
            Self::Loop(_) => true,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// String content of a string or markup value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Html(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Element count; scalars count as one and null as zero.
    pub fn count(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Array(a) => a.len(),
            Self::Loop(tracker) => tracker.total(),
            _ => 1,
        }
    }

    /// Reads `$value[key]`.
    pub fn get(&self, key: &Key) -> Option<&Self> {
        match self {
            Self::Array(a) => a.get(key),
            _ => None,
        }
    }

    /// Numeric view used by arithmetic and comparisons.
    pub fn to_number(&self) -> Self {
        match self {
            Self::Int(_) | Self::Float(_) => self.clone(),
            Self::Null => Self::Int(0),
            Self::Bool(b) => Self::Int(i64::from(*b)),
            Self::Str(s) | Self::Html(s) => parse_numeric_prefix(s),
            Self::Array(a) => Self::Int(i64::from(!a.is_empty())),
            Self::Loop(_) => Self::Int(1),
        }
    }

    pub fn to_int(&self) -> i64 {
        match self.to_number() {
            Self::Int(i) => i,
            #[allow(clippy::cast_possible_truncation, reason = "saturating float conversion")]
            Self::Float(f) => f as i64,
            _ => 0,
        }
    }

    pub fn to_float(&self) -> f64 {
        match self.to_number() {
            #[allow(clippy::cast_precision_loss, reason = "numeric widening")]
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
            _ => 0.0,
        }
    }

    fn is_numeric(&self) -> bool {
        match self {
            Self::Int(_) | Self::Float(_) => true,
            Self::Str(s) | Self::Html(s) => is_numeric_str(s),
            _ => false,
        }
    }

    pub fn to_key(&self) -> Key {
        match self {
            Self::Int(i) => Key::Int(*i),
            Self::Bool(b) => Key::Int(i64::from(*b)),
            #[allow(clippy::cast_possible_truncation, reason = "keys truncate floats")]
            Self::Float(f) => Key::Int(*f as i64),
            Self::Str(s) | Self::Html(s) => Key::from(s.as_str()),
            Self::Null | Self::Array(_) | Self::Loop(_) => Key::Str(self.to_string()),
        }
    }

    /// `==`: loose comparison with type juggling.
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, Self::Str(s) | Self::Html(s)) | (Self::Str(s) | Self::Html(s), Self::Null) => {
                s.is_empty()
            }
            (Self::Bool(_) | Self::Null, _) | (_, Self::Bool(_) | Self::Null) => {
                self.is_truthy() == other.is_truthy()
            }
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            (Self::Loop(a), Self::Loop(b)) => a == b,
            _ if self.is_numeric() && other.is_numeric() => {
                self.to_float() == other.to_float()
            }
            (Self::Array(_) | Self::Loop(_), _) | (_, Self::Array(_) | Self::Loop(_)) => false,
            _ => self.to_string() == other.to_string(),
        }
    }

    /// `===`: same type and same value.
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.strict_eq(vb))
            }
            _ => self == other,
        }
    }

    /// Ordering for `<`, `>`, `<=` and `>=`.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        let both_text = matches!(self, Self::Str(_) | Self::Html(_))
            && matches!(other, Self::Str(_) | Self::Html(_));
        if both_text && !(self.is_numeric() && other.is_numeric()) {
            return Some(self.to_string().cmp(&other.to_string()));
        }
        if let (Self::Array(a), Self::Array(b)) = (self, other) {
            return Some(a.len().cmp(&b.len()));
        }
        match (self.to_number(), other.to_number()) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            _ => self.to_float().partial_cmp(&other.to_float()),
        }
    }
}

fn is_numeric_str(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && s.parse::<f64>().is_ok_and(f64::is_finite)
}

/// Leading-number conversion: `"12abc"` is 12, `"abc"` is 0.
fn parse_numeric_prefix(s: &str) -> Value {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        let sign = i == 0 && (c == '-' || c == '+');
        if c.is_ascii_digit() || sign {
            end = i.saturating_add(1);
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            end = i.saturating_add(1);
        } else {
            break;
        }
    }
    let prefix = s.get(..end).unwrap_or_default().trim_end_matches('.');
    if let Ok(i) = prefix.parse::<i64>() {
        return Value::Int(i);
    }
    prefix.parse::<f64>().map_or(Value::Int(0), Value::Float)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null | Self::Bool(false) | Self::Loop(_) => Ok(()),
            Self::Bool(true) => f.write_str("1"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{x:.0}")
            }
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) | Self::Html(s) => f.write_str(s),
            Self::Array(_) => f.write_str("Array"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        i64::try_from(i).map_or_else(
            |_| {
                #[allow(clippy::cast_precision_loss, reason = "out of i64 range")]
                Self::Float(i as f64)
            },
            Self::Int,
        )
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Self::Array(a)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::list(items)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(feature = "serde")]
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::list(items),
            serde_json::Value::Object(map) => Self::Array(
                map.into_iter()
                    .map(|(k, v)| (Key::from(k), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("0").is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0.0").is_truthy());
        assert!(!Value::list(Vec::<Value>::new()).is_truthy());
        assert!(Value::list([1]).is_truthy());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_display() {
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Bool(false).to_string(), "");
        assert_eq!(Value::Float(2.0).to_string(), "2");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::list([1, 2]).to_string(), "Array");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_loose_equality() {
        assert!(Value::from("1").loose_eq(&Value::Int(1)));
        assert!(Value::from("1.0").loose_eq(&Value::from("1")));
        assert!(Value::Null.loose_eq(&Value::from("")));
        assert!(!Value::Null.loose_eq(&Value::from("0")));
        assert!(Value::Null.loose_eq(&Value::Int(0)));
        assert!(!Value::from("abc").loose_eq(&Value::Int(0)));
        assert!(Value::from("a").loose_eq(&Value::html("a")));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_strict_equality() {
        assert!(!Value::from("1").strict_eq(&Value::Int(1)));
        assert!(Value::Int(1).strict_eq(&Value::Int(1)));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_numeric_conversion() {
        assert_eq!(Value::from("12abc").to_int(), 12);
        assert_eq!(Value::from("abc").to_int(), 0);
        assert_eq!(Value::from("1.5").to_number(), Value::Float(1.5));
        assert_eq!(Value::from(" -3").to_number(), Value::Int(-3));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_keys_normalise_numeric_strings() {
        assert_eq!(Key::from("12"), Key::Int(12));
        assert_eq!(Key::from("012"), Key::Str("012".into()));
        assert_eq!(Value::from("7").to_key(), Key::Int(7));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_loop_tracker_properties() {
        let tracker = LoopTracker::new(vec![
            (Key::Int(0), Value::from("a")),
            (Key::Int(1), Value::from("b")),
        ]);
        assert_eq!(tracker.property("first"), Some(Value::Bool(true)));
        tracker.item(1);
        assert_eq!(tracker.property("last"), Some(Value::Bool(true)));
        assert_eq!(tracker.property("iteration"), Some(Value::Int(2)));
        assert_eq!(tracker.property("total"), Some(Value::Int(2)));
        assert_eq!(tracker.property("bogus"), None);
    }
}
