//! Skill requirements (Bloom levels) questions are generated against

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRequirement {
    pub name: String,
    pub requirement: String,
}

/// Ordered skill list plus the requirement text for each skill.
/// Read-only for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct SkillSet {
    order: Vec<String>,
    requirements: HashMap<String, SkillRequirement>,
}

impl SkillSet {
    /// Build from the declared order and requirement map. Every listed skill
    /// must have a requirement.
    pub fn new(list: &[String], requirements: &HashMap<String, String>) -> anyhow::Result<Self> {
        if list.is_empty() {
            anyhow::bail!("skills.list is empty");
        }

        let mut map = HashMap::with_capacity(list.len());
        for name in list {
            let requirement = requirements.get(name).ok_or_else(|| {
                anyhow::anyhow!("skill '{}' has no entry in skills.requirements", name)
            })?;
            map.insert(
                name.clone(),
                SkillRequirement {
                    name: name.clone(),
                    requirement: requirement.clone(),
                },
            );
        }

        Ok(Self {
            order: list.to_vec(),
            requirements: map,
        })
    }

    pub fn requirement(&self, skill: &str) -> Option<&SkillRequirement> {
        self.requirements.get(skill)
    }

    /// Iterate requirements in declared order
    pub fn iter(&self) -> impl Iterator<Item = &SkillRequirement> {
        self.order.iter().filter_map(|name| self.requirements.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
