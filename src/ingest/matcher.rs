use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use super::normalize::fold_key;

/// Shortest name key eligible for a containment match.
const MIN_FUZZY_KEY_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Mapping,
    ExternalRef,
    DisplayName,
}

#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub id: Uuid,
    pub display_name: String,
    pub external_ref: Option<String>,
}

/// Lookup tables used to tie CSV names to workers.
#[derive(Debug, Default)]
pub struct WorkerDirectory {
    mappings: HashMap<String, Uuid>,
    external_refs: HashMap<String, Uuid>,
    names: Vec<(String, Uuid)>,
}

impl WorkerDirectory {
    pub fn new(
        mappings: impl IntoIterator<Item = (String, Uuid)>,
        workers: impl IntoIterator<Item = WorkerIdentity>,
    ) -> Self {
        let mut directory = Self {
            mappings: mappings
                .into_iter()
                .map(|(key, worker_id)| (fold_key(&key), worker_id))
                .collect(),
            ..Self::default()
        };

        for worker in workers {
            if let Some(reference) = worker.external_ref.as_deref().map(str::trim) {
                if !reference.is_empty() {
                    directory
                        .external_refs
                        .insert(reference.to_string(), worker.id);
                }
            }
            directory
                .names
                .push((fold_key(&worker.display_name), worker.id));
        }

        directory
    }

    /// Manual mapping, then external reference, then display name.
    pub fn resolve(
        &self,
        name_key: &str,
        raw_name: &str,
        external_ref: Option<&str>,
    ) -> Option<(Uuid, MatchTier)> {
        if let Some(worker_id) = self.mappings.get(name_key) {
            return Some((*worker_id, MatchTier::Mapping));
        }

        let by_reference = external_ref
            .into_iter()
            .chain(Some(raw_name))
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .find_map(|reference| self.external_refs.get(reference));
        if let Some(worker_id) = by_reference {
            return Some((*worker_id, MatchTier::ExternalRef));
        }

        self.match_display_name(name_key)
            .map(|worker_id| (worker_id, MatchTier::DisplayName))
    }

    fn match_display_name(&self, name_key: &str) -> Option<Uuid> {
        if name_key.is_empty() {
            return None;
        }

        if let Some((_, worker_id)) = self.names.iter().find(|(key, _)| key == name_key) {
            return Some(*worker_id);
        }

        if name_key.chars().count() < MIN_FUZZY_KEY_LEN {
            return None;
        }

        let mut candidates = self.names.iter().filter(|(key, _)| {
            !key.is_empty() && (key.contains(name_key) || name_key.contains(key.as_str()))
        });
        match (candidates.next(), candidates.next()) {
            (Some((_, worker_id)), None) => Some(*worker_id),
            _ => None,
        }
    }
}
