//! Owner/call-site label composition.

use smallvec::SmallVec;

/// Label values for one recorded event: owner values then call-site values.
pub type LabelValues<'a> = SmallVec<[&'a str; 6]>;

/// Merges a surface's fixed owner labels with per-event call-site labels.
///
/// Owner labels are fixed at construction and always come first, in their
/// declared order. Call-site labels follow in the order the caller supplies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelComposer {
    owner: Vec<(String, String)>,
}

impl LabelComposer {
    pub fn new<K, V>(owner: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            owner: owner
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// A composer without owner labels.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn owner(&self) -> &[(String, String)] {
        &self.owner
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }

    /// Declared key list for a collector: owner keys, then `call_site` keys.
    pub fn keys(&self, call_site: &[&str]) -> Vec<String> {
        self.owner
            .iter()
            .map(|(k, _)| k.clone())
            .chain(call_site.iter().map(|k| k.to_string()))
            .collect()
    }

    /// Full value vector for a collector declared with [`keys`](Self::keys).
    pub fn resolve<'a>(&'a self, call_site: &[&'a str]) -> LabelValues<'a> {
        let mut values = LabelValues::with_capacity(self.owner.len() + call_site.len());
        values.extend(self.owner.iter().map(|(_, v)| v.as_str()));
        values.extend_from_slice(call_site);
        values
    }
}
