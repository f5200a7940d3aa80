//! Category grouping
//!
//! Buckets tasks by category in a single pass. Groups appear in order of the
//! first task carrying their category, and only categories that actually
//! occur produce a group.

use std::collections::HashMap;

use crate::categories::{normalize_category, Category, Theme};
use crate::keywords::filter_keywords;
use crate::models::Task;

/// Tasks sharing one category, as seen by a single rebuild
#[derive(Debug, Clone)]
pub struct Group<'a> {
    /// Normalized category key
    pub key: String,
    pub category: Category,
    pub display_name: &'static str,
    pub tasks: Vec<&'a Task>,
    /// Filtered union of the members' keywords, possibly empty
    pub keywords: Vec<String>,
    pub theme: Theme,
    /// Highest priority value among members
    pub max_priority: u8,
}

/// Partitions `tasks` into category groups
pub fn group_tasks(tasks: &[Task]) -> Vec<Group<'_>> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<&Task>> = HashMap::new();

    for task in tasks {
        let key = normalize_category(&task.category);
        buckets
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(task);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let members = buckets.remove(&key)?;
            if members.is_empty() {
                return None;
            }
            Some(build_group(key, members))
        })
        .collect()
}

fn build_group(key: String, tasks: Vec<&Task>) -> Group<'_> {
    let category = Category::from_key(&key);
    let union: Vec<&str> = tasks
        .iter()
        .flat_map(|task| task.keywords.iter().map(String::as_str))
        .collect();
    let max_priority = tasks
        .iter()
        .map(|task| task.priority.value())
        .max()
        .unwrap_or(0);

    Group {
        key,
        category,
        display_name: category.display_name(),
        keywords: filter_keywords(&union),
        theme: category.theme(),
        max_priority,
        tasks,
    }
}
