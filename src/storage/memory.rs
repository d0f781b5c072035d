use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::engine::performance::UserPerformanceProfile;
use crate::engine::scheduler::ReviewItem;
use crate::storage::{check_version, profile_key, review_item_key, LearningStore, StorageResult};

/// Process-local store, mainly for tests and single-session use.
#[derive(Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<String, UserPerformanceProfile>>,
    review_items: RwLock<HashMap<String, HashMap<String, ReviewItem>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Entry `item` would replace: same id, else the entry already tracking its
/// task and skill.
fn stored_entry<'a>(existing: &'a HashMap<String, ReviewItem>, item: &ReviewItem) -> Option<&'a ReviewItem> {
    existing
        .get(&item.id)
        .or_else(|| existing.values().find(|i| i.matches(&item.task_id, &item.skill)))
}

/// New version plus the id of the entry being replaced.
fn check_item(
    existing: &HashMap<String, ReviewItem>,
    user_id: &str,
    item: &ReviewItem,
) -> StorageResult<(i64, Option<String>)> {
    let stored = stored_entry(existing, item);
    let found = stored.map(|i| i.version).unwrap_or(0);
    let next = check_version(review_item_key(user_id, &item.id), item.version, found)?;
    Ok((next, stored.map(|i| i.id.clone())))
}

fn store_item(existing: &mut HashMap<String, ReviewItem>, item: &ReviewItem, version: i64, replaced: Option<String>) {
    if let Some(old_id) = replaced {
        existing.remove(&old_id);
    }
    let mut stored = item.clone();
    stored.version = version;
    existing.insert(item.id.clone(), stored);
}

fn sorted_items(items: Option<&HashMap<String, ReviewItem>>) -> Vec<ReviewItem> {
    let mut items: Vec<ReviewItem> = items.map(|m| m.values().cloned().collect()).unwrap_or_default();
    items.sort_by(|a, b| (&a.task_id, &a.skill, &a.id).cmp(&(&b.task_id, &b.skill, &b.id)));
    items
}

#[async_trait]
impl LearningStore for MemoryStore {
    async fn load_profile(&self, user_id: &str) -> StorageResult<Option<UserPerformanceProfile>> {
        Ok(self.profiles.read().get(user_id).cloned())
    }

    async fn save_profile(&self, profile: &UserPerformanceProfile) -> StorageResult<i64> {
        let mut profiles = self.profiles.write();
        let found = profiles.get(&profile.user_id).map(|p| p.version).unwrap_or(0);
        let next = check_version(profile_key(&profile.user_id), profile.version, found)?;

        let mut stored = profile.clone();
        stored.version = next;
        profiles.insert(profile.user_id.clone(), stored);
        Ok(next)
    }

    async fn load_review_items(&self, user_id: &str) -> StorageResult<Vec<ReviewItem>> {
        Ok(sorted_items(self.review_items.read().get(user_id)))
    }

    async fn save_review_items(&self, user_id: &str, items: &[ReviewItem]) -> StorageResult<Vec<i64>> {
        let mut all = self.review_items.write();
        let existing = all.entry(user_id.to_string()).or_default();

        let checked = items
            .iter()
            .map(|item| check_item(existing, user_id, item))
            .collect::<StorageResult<Vec<_>>>()?;

        let mut versions = Vec::with_capacity(items.len());
        for (item, (version, replaced)) in items.iter().zip(checked) {
            store_item(existing, item, version, replaced);
            versions.push(version);
        }
        Ok(versions)
    }

    async fn upsert_review_item(&self, user_id: &str, item: &ReviewItem) -> StorageResult<i64> {
        let mut all = self.review_items.write();
        let existing = all.entry(user_id.to_string()).or_default();
        let (next, replaced) = check_item(existing, user_id, item)?;
        store_item(existing, item, next, replaced);
        Ok(next)
    }
}
