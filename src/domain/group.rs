// Control group domain model
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A named, unordered set of point ids. Points are referenced by id only;
/// deleting a point strips it from every group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub points: BTreeSet<String>,
}

impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            points: BTreeSet::new(),
        }
    }

    pub fn with_points<I, S>(mut self, points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.points = points.into_iter().map(Into::into).collect();
        self
    }

    /// Drop a point reference. Returns true if the group referenced it.
    pub fn forget_point(&mut self, point_id: &str) -> bool {
        self.points.remove(point_id)
    }
}
