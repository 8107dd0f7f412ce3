//! Planning
//!
//! Decides what applying a configuration would do to an existing object.

use super::data::ResourceState;
use super::schema::{equivalent, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Create,
    Update,
    /// Delete, then create again
    Replace,
    Delete,
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub action: PlanAction,
    /// Attributes whose value differs
    #[serde(default)]
    pub changed: Vec<String>,
    /// Changed attributes that cannot be updated in place
    #[serde(default)]
    pub requires_replace: Vec<String>,
}

impl PlannedChange {
    fn new(action: PlanAction) -> Self {
        Self {
            action,
            changed: Vec::new(),
            requires_replace: Vec::new(),
        }
    }

    /// Turn an in-place update into a replacement when one of `attributes`
    /// changed, for changes only the resource can judge (e.g. a sku downgrade)
    pub fn force_new(&mut self, attributes: &[String]) {
        if self.action != PlanAction::Update {
            return;
        }
        let forced: Vec<String> = attributes
            .iter()
            .filter(|a| self.changed.contains(a))
            .cloned()
            .collect();
        if forced.is_empty() {
            return;
        }
        self.requires_replace.extend(forced);
        self.action = PlanAction::Replace;
    }
}

/// Compare a configuration (defaults applied) with prior state
///
/// No configuration means the object should go away; no prior state means it
/// should be created.
pub fn plan(schema: &Schema, config: Option<&Value>, prior: Option<&ResourceState>) -> PlannedChange {
    let (config, prior) = match (config.filter(|c| !c.is_null()), prior) {
        (None, None) => return PlannedChange::new(PlanAction::NoOp),
        (None, Some(_)) => return PlannedChange::new(PlanAction::Delete),
        (Some(config), None) => {
            let mut change = PlannedChange::new(PlanAction::Create);
            change.changed = schema
                .attributes
                .keys()
                .filter(|name| config.get(name.as_str()).is_some_and(|v| !v.is_null()))
                .cloned()
                .collect();
            return change;
        }
        (Some(config), Some(prior)) => (config, prior),
    };

    let mut change = PlannedChange::new(PlanAction::NoOp);
    for (name, attribute) in &schema.attributes {
        let desired = config.get(name.as_str()).unwrap_or(&Value::Null);
        if attribute.computed && desired.is_null() {
            continue;
        }
        let current = prior.attributes.get(name).unwrap_or(&Value::Null);
        if equivalent(&attribute.ty, desired, current) {
            continue;
        }

        change.changed.push(name.clone());
        if attribute.force_new {
            change.requires_replace.push(name.clone());
        }
    }

    change.action = if !change.requires_replace.is_empty() {
        PlanAction::Replace
    } else if !change.changed.is_empty() {
        PlanAction::Update
    } else {
        PlanAction::NoOp
    };
    change
}
