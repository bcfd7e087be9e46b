use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Flat, ordered solver configuration (`General.SessionId`, `Weight.*`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    values: IndexMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "true" || v == "1" || v == "yes" || v == "on" => true,
            Some(v) if v == "false" || v == "0" || v == "no" || v == "off" => false,
            _ => default,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
    }

    /// Comma separated list of ids; unparsable entries are skipped.
    pub fn get_i64_list(&self, key: &str) -> Vec<i64> {
        self.get(key)
            .map(|v| v.split(',').filter_map(|s| s.trim().parse().ok()).collect())
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Overrides entries with the other properties.
    pub fn extend(&mut self, other: &Properties) {
        for (key, value) in other.iter() {
            self.values.insert(key.to_string(), value.to_string());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let props: Properties = [
            ("General.StartSolver", "true"),
            ("General.SessionId", "239259"),
            ("General.SolverGroupId", "3, 7,x"),
            ("Weight.CoursePreferences", "2.5"),
        ]
        .into_iter()
        .collect();

        assert!(props.get_bool("General.StartSolver", false));
        assert!(props.get_bool("General.Missing", true));
        assert_eq!(props.get_i64("General.SessionId"), Some(239259));
        assert_eq!(props.get_i64_list("General.SolverGroupId"), vec![3, 7]);
        assert_eq!(props.get_f64("Weight.CoursePreferences", 1.0), 2.5);
        assert_eq!(props.get_str("General.CommonItypes", "lec"), "lec");
    }

    #[test]
    fn test_extend_overrides_and_keeps_order() {
        let mut props = Properties::new();
        props.set("a", "1");
        props.set("b", "2");
        let mut other = Properties::new();
        other.set("a", "3");
        other.set("c", 4);
        props.extend(&other);
        let keys: Vec<&str> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(props.get("a"), Some("3"));
        assert_eq!(props.remove("b"), Some("2".to_string()));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_serde_is_flat_object() {
        let mut props = Properties::new();
        props.set("General.UseAmPm", "false");
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"General.UseAmPm":"false"}"#);
        let back: Properties = serde_json::from_str(&json).unwrap();
        assert_eq!(back, props);
    }
}
