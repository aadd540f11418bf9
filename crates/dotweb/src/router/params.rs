/// A single URL parameter, consisting of a key and a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// Ordered parameters captured while matching a route.
///
/// The slice is ordered: the first URL parameter is also the first entry,
/// so reading by index is safe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<Param>);

impl Params {
    pub fn new() -> Self {
        Params(Vec::new())
    }

    /// Returns the value of the first parameter whose key matches `name`,
    /// or an empty string when there is none.
    pub fn by_name(&self, name: &str) -> &str {
        self.0
            .iter()
            .find(|p| p.key == name)
            .map(|p| p.value.as_str())
            .unwrap_or("")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|p| p.key == name).map(|p| p.value.as_str())
    }

    pub fn push(&mut self, key: &str, value: &str) {
        self.0.push(Param {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops every entry while keeping the allocation for reuse.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}
