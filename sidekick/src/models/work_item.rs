//! Work item snapshot as returned by the tracking system.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::relation::{Relation, RelationKind};

/// Reference names of the fields this crate reads.
pub mod field {
    pub const ID: &str = "System.Id";
    pub const TITLE: &str = "System.Title";
    pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
    pub const STATE: &str = "System.State";
    pub const REASON: &str = "System.Reason";
    pub const DESCRIPTION: &str = "System.Description";
    pub const ACCEPTANCE_CRITERIA: &str = "Microsoft.VSTS.Common.AcceptanceCriteria";
    pub const ASSIGNED_TO: &str = "System.AssignedTo";
    pub const AREA_PATH: &str = "System.AreaPath";
    pub const ITERATION_PATH: &str = "System.IterationPath";
    pub const TAGS: &str = "System.Tags";
    pub const PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
    pub const STORY_POINTS: &str = "Microsoft.VSTS.Scheduling.StoryPoints";
    pub const EFFORT: &str = "Microsoft.VSTS.Scheduling.Effort";
    pub const ORIGINAL_ESTIMATE: &str = "Microsoft.VSTS.Scheduling.OriginalEstimate";
    pub const REMAINING_WORK: &str = "Microsoft.VSTS.Scheduling.RemainingWork";
    pub const COMPLETED_WORK: &str = "Microsoft.VSTS.Scheduling.CompletedWork";

    /// Everything requested on the full REST fetch.
    pub const FULL: &[&str] = &[
        ID,
        TITLE,
        WORK_ITEM_TYPE,
        STATE,
        REASON,
        DESCRIPTION,
        ACCEPTANCE_CRITERIA,
        ASSIGNED_TO,
        AREA_PATH,
        ITERATION_PATH,
        TAGS,
        PRIORITY,
        STORY_POINTS,
        EFFORT,
        ORIGINAL_ESTIMATE,
        REMAINING_WORK,
        COMPLETED_WORK,
    ];

    /// First fallback: the form service's commonly available fields.
    pub const REDUCED: &[&str] = &[
        ID,
        TITLE,
        WORK_ITEM_TYPE,
        STATE,
        DESCRIPTION,
        ACCEPTANCE_CRITERIA,
        ASSIGNED_TO,
        AREA_PATH,
        ITERATION_PATH,
        STORY_POINTS,
    ];

    /// Last fallback before a placeholder.
    pub const MINIMAL: &[&str] = &[ID, TITLE, WORK_ITEM_TYPE, STATE];
}

/// How complete a snapshot is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemSource {
    /// Full REST fetch: fields plus relations.
    #[default]
    Rest,
    /// Reduced field set from the host form service, no relations.
    FormService,
    /// Four-field minimal set from the host form service.
    MinimalFields,
    /// Synthesized from the id alone.
    Placeholder,
}

/// Read-only snapshot of a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<u64>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Not part of the API payload; set by the resolver.
    #[serde(default)]
    pub source: WorkItemSource,
}

impl WorkItem {
    /// Build a snapshot from a field map (form-service results).
    pub fn from_fields(id: u64, fields: Map<String, Value>, source: WorkItemSource) -> Self {
        Self {
            id,
            rev: None,
            fields,
            relations: Vec::new(),
            source,
        }
    }

    /// Stand-in used when every fetch path failed.
    pub fn placeholder(id: u64) -> Self {
        let mut fields = Map::new();
        fields.insert(field::TITLE.to_string(), Value::String(format!("Work Item {id}")));
        Self::from_fields(id, fields, WorkItemSource::Placeholder)
    }

    /// Set a field, builder style.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Text rendering of a field, or `None` when absent, null or blank.
    ///
    /// Identity objects (`{"displayName": ..}`) render as their display name.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Object(obj) => obj
                .get("displayName")
                .or_else(|| obj.get("uniqueName"))
                .and_then(Value::as_str)
                .map(String::from),
            Value::Null | Value::Array(_) => None,
        }
    }

    pub fn title(&self) -> Option<String> {
        self.text(field::TITLE)
    }

    pub fn work_item_type(&self) -> Option<String> {
        self.text(field::WORK_ITEM_TYPE)
    }

    pub fn state(&self) -> Option<String> {
        self.text(field::STATE)
    }

    pub fn description(&self) -> Option<String> {
        self.text(field::DESCRIPTION)
    }

    pub fn acceptance_criteria(&self) -> Option<String> {
        self.text(field::ACCEPTANCE_CRITERIA)
    }

    pub fn assigned_to(&self) -> Option<String> {
        self.text(field::ASSIGNED_TO)
    }

    /// Relations of the given direction, in list order.
    pub fn relations_of(&self, kind: RelationKind) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(move |r| r.kind() == kind)
    }

    pub const fn is_degraded(&self) -> bool {
        !matches!(self.source, WorkItemSource::Rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_rest_payload() {
        let json = r#"{
            "id": 100,
            "rev": 4,
            "fields": {
                "System.Title": "Checkout flow",
                "System.WorkItemType": "User Story",
                "System.State": "Active",
                "System.AssignedTo": {"displayName": "Sam Lee", "uniqueName": "sam@example.com"},
                "Microsoft.VSTS.Scheduling.StoryPoints": 5.0
            },
            "relations": [
                {"rel": "System.LinkTypes.Hierarchy-Reverse", "url": "https://h/_apis/wit/workItems/50"},
                {"rel": "System.LinkTypes.Hierarchy-Forward", "url": "https://h/_apis/wit/workItems/101"}
            ]
        }"#;

        let item: WorkItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, 100);
        assert_eq!(item.rev, Some(4));
        assert_eq!(item.source, WorkItemSource::Rest);
        assert_eq!(item.title().as_deref(), Some("Checkout flow"));
        assert_eq!(item.assigned_to().as_deref(), Some("Sam Lee"));
        assert_eq!(item.text(field::STORY_POINTS).as_deref(), Some("5.0"));
        assert_eq!(item.relations_of(RelationKind::Parent).count(), 1);
        assert_eq!(item.relations_of(RelationKind::Child).count(), 1);
    }

    #[test]
    fn missing_relations_default_to_empty() {
        let item: WorkItem = serde_json::from_str(r#"{"id": 3, "fields": {}}"#).unwrap();
        assert!(item.relations.is_empty());
        assert_eq!(item.title(), None);
    }

    #[test]
    fn blank_and_null_fields_are_absent() {
        let item = WorkItem::placeholder(1)
            .with_field(field::DESCRIPTION, "   ")
            .with_field(field::STATE, Value::Null);
        assert_eq!(item.description(), None);
        assert_eq!(item.state(), None);
    }

    #[test]
    fn placeholder_has_generated_title() {
        let item = WorkItem::placeholder(7);
        assert_eq!(item.id, 7);
        assert_eq!(item.title().as_deref(), Some("Work Item 7"));
        assert!(item.is_degraded());
    }
}
