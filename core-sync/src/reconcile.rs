//! # Snapshot Reconciliation
//!
//! Pure planning step of a sync: given the full remote snapshot of one kind
//! and the rows currently cached for it, compute every write needed to make
//! the cache match the remote while keeping locally owned state.
//!
//! Nothing here touches the database. The coordinator loads [`ExistingState`]
//! inside its write transaction, calls [`plan`], and applies the result.

use bridge_traits::{
    ContentKind, RemoteAudioLocale, RemoteContentItem, RemoteTranslation, TranslationField,
};
use core_library::{AudioLocaleVariant, ContentItem, TranslationRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Full remote state of one content kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub kind: ContentKind,
    pub items: Vec<RemoteContentItem>,
    pub translations: Vec<RemoteTranslation>,
    pub audio_locales: Vec<RemoteAudioLocale>,
}

impl RemoteSnapshot {
    pub fn new(kind: ContentKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
            translations: Vec::new(),
            audio_locales: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<RemoteContentItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_translations(mut self, translations: Vec<RemoteTranslation>) -> Self {
        self.translations = translations;
        self
    }

    pub fn with_audio_locales(mut self, audio_locales: Vec<RemoteAudioLocale>) -> Self {
        self.audio_locales = audio_locales;
        self
    }
}

/// Rows cached for one kind at the start of the apply
#[derive(Debug, Clone, Default)]
pub struct ExistingState {
    pub items: Vec<ContentItem>,
    pub translations: Vec<TranslationRecord>,
    pub audio: Vec<AudioLocaleVariant>,
    /// Document ids cached under a different kind
    pub foreign_ids: BTreeSet<String>,
}

/// Child record type of an orphaned row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ChildRecord {
    Translation { field: TranslationField },
    AudioLocale,
}

/// Remote child row whose cross-reference id matched no item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedChildRow {
    pub kind: ContentKind,
    pub record: ChildRecord,
    pub cross_ref_id: i64,
}

/// Remote item rejected before merging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub document_id: String,
    pub reason: String,
}

/// Writes needed to bring one kind in line with its snapshot
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// New rows, inserted with local fields at their defaults
    pub inserts: Vec<ContentItem>,
    /// Existing rows with replaced remote fields and preserved local fields
    pub updates: Vec<ContentItem>,
    pub unchanged: usize,
    pub translation_upserts: Vec<TranslationRecord>,
    pub translation_removals: Vec<(String, TranslationField)>,
    pub audio_upserts: Vec<AudioLocaleVariant>,
    pub audio_removals: Vec<String>,
    pub orphans: Vec<OrphanedChildRow>,
    pub skipped: Vec<SkippedItem>,
    /// Cached items absent from the snapshot
    pub withdrawn: Vec<String>,
    /// Whether `withdrawn` is deleted on apply
    pub prune: bool,
}

impl ReconcilePlan {
    /// Whether applying the plan writes nothing
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
            && self.updates.is_empty()
            && self.translation_upserts.is_empty()
            && self.translation_removals.is_empty()
            && self.audio_upserts.is_empty()
            && self.audio_removals.is_empty()
            && !self.prunes_anything()
    }

    pub fn prunes_anything(&self) -> bool {
        self.prune && !self.withdrawn.is_empty()
    }
}

/// Compute the plan for the snapshot's kind.
///
/// Duplicate document ids and duplicate cross-reference ids in the snapshot
/// resolve last-wins. Child rows that reference no merged item are reported
/// as orphans and dropped.
pub fn plan(
    snapshot: &RemoteSnapshot,
    existing: &ExistingState,
    prune_withdrawn: bool,
) -> ReconcilePlan {
    let kind = snapshot.kind;
    let mut plan = ReconcilePlan {
        prune: prune_withdrawn,
        ..ReconcilePlan::default()
    };

    let merged = merge_items(kind, snapshot, existing, &mut plan);
    let cross_refs = cross_reference_index(kind, &merged);
    let merged_ids: BTreeSet<&str> = merged.iter().map(|item| item.document_id.as_str()).collect();

    plan_translations(kind, snapshot, existing, &cross_refs, &merged_ids, &mut plan);

    if kind.supports_audio_locales() {
        plan_audio(kind, snapshot, existing, &cross_refs, &merged_ids, &mut plan);
    } else if !snapshot.audio_locales.is_empty() {
        debug!(
            kind = %kind,
            count = snapshot.audio_locales.len(),
            "Ignoring audio locale rows for kind without localized audio"
        );
    }

    plan.withdrawn = existing
        .items
        .iter()
        .filter(|item| !merged_ids.contains(item.document_id.as_str()))
        .map(|item| item.document_id.clone())
        .collect();

    plan
}

fn merge_items(
    kind: ContentKind,
    snapshot: &RemoteSnapshot,
    existing: &ExistingState,
    plan: &mut ReconcilePlan,
) -> Vec<ContentItem> {
    let cached: HashMap<&str, &ContentItem> = existing
        .items
        .iter()
        .map(|item| (item.document_id.as_str(), item))
        .collect();

    let mut merged: Vec<ContentItem> = Vec::with_capacity(snapshot.items.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for remote in &snapshot.items {
        if remote.document_id.trim().is_empty() {
            warn!(kind = %kind, local_id = remote.local_id, "Skipping remote item without document id");
            plan.skipped.push(SkippedItem {
                document_id: String::new(),
                reason: "empty document_id".to_string(),
            });
            continue;
        }

        if remote.kind != kind {
            warn!(
                document_id = %remote.document_id,
                expected = %kind,
                actual = %remote.kind,
                "Skipping remote item of another kind"
            );
            plan.skipped.push(SkippedItem {
                document_id: remote.document_id.clone(),
                reason: format!("kind {} in {} snapshot", remote.kind, kind),
            });
            continue;
        }

        if existing.foreign_ids.contains(&remote.document_id) {
            warn!(
                document_id = %remote.document_id,
                kind = %kind,
                "Skipping remote item whose id is cached under another kind"
            );
            plan.skipped.push(SkippedItem {
                document_id: remote.document_id.clone(),
                reason: "document_id cached under another kind".to_string(),
            });
            continue;
        }

        if remote.popularity_count < 0 {
            warn!(
                document_id = %remote.document_id,
                popularity_count = remote.popularity_count,
                "Clamping negative popularity count"
            );
        }

        let item = match cached.get(remote.document_id.as_str()) {
            Some(current) => current.merged_with_remote(remote),
            None => ContentItem::from_remote(remote),
        };

        match positions.get(&item.document_id) {
            Some(&index) => {
                warn!(document_id = %item.document_id, "Duplicate document id in snapshot, last one wins");
                merged[index] = item;
            }
            None => {
                positions.insert(item.document_id.clone(), merged.len());
                merged.push(item);
            }
        }
    }

    for item in &merged {
        match cached.get(item.document_id.as_str()) {
            Some(current) if current.has_same_remote_fields(item) => plan.unchanged += 1,
            Some(_) => plan.updates.push(item.clone()),
            None => plan.inserts.push(item.clone()),
        }
    }

    merged
}

fn cross_reference_index(kind: ContentKind, merged: &[ContentItem]) -> HashMap<i64, String> {
    let mut index = HashMap::with_capacity(merged.len());
    for item in merged {
        if let Some(previous) = index.insert(item.local_id, item.document_id.clone()) {
            warn!(
                kind = %kind,
                local_id = item.local_id,
                previous = %previous,
                current = %item.document_id,
                "Duplicate cross-reference id, last one wins"
            );
        }
    }
    index
}

fn plan_translations(
    kind: ContentKind,
    snapshot: &RemoteSnapshot,
    existing: &ExistingState,
    cross_refs: &HashMap<i64, String>,
    merged_ids: &BTreeSet<&str>,
    plan: &mut ReconcilePlan,
) {
    let mut incoming: HashMap<(String, TranslationField), TranslationRecord> = HashMap::new();
    let mut order: Vec<(String, TranslationField)> = Vec::new();

    for row in &snapshot.translations {
        let Some(document_id) = cross_refs.get(&row.id) else {
            warn!(kind = %kind, cross_ref_id = row.id, field = %row.field, "Dropping orphaned translation");
            plan.orphans.push(OrphanedChildRow {
                kind,
                record: ChildRecord::Translation { field: row.field },
                cross_ref_id: row.id,
            });
            continue;
        };

        let key = (document_id.clone(), row.field);
        let record = TranslationRecord::new(document_id.clone(), row.field, row.texts.clone());
        if incoming.insert(key.clone(), record).is_none() {
            order.push(key);
        }
    }

    let cached: HashMap<(&str, TranslationField), &TranslationRecord> = existing
        .translations
        .iter()
        .map(|record| ((record.document_id.as_str(), record.field), record))
        .collect();

    for key in order {
        let Some(record) = incoming.remove(&key) else {
            continue;
        };
        match cached.get(&(key.0.as_str(), key.1)) {
            Some(current) if **current == record => {}
            _ => plan.translation_upserts.push(record),
        }
    }

    let delivered: BTreeSet<(&str, TranslationField)> = snapshot
        .translations
        .iter()
        .filter_map(|row| cross_refs.get(&row.id).map(|id| (id.as_str(), row.field)))
        .collect();

    plan.translation_removals = existing
        .translations
        .iter()
        .filter(|record| merged_ids.contains(record.document_id.as_str()))
        .filter(|record| !delivered.contains(&(record.document_id.as_str(), record.field)))
        .map(|record| (record.document_id.clone(), record.field))
        .collect();
}

fn plan_audio(
    kind: ContentKind,
    snapshot: &RemoteSnapshot,
    existing: &ExistingState,
    cross_refs: &HashMap<i64, String>,
    merged_ids: &BTreeSet<&str>,
    plan: &mut ReconcilePlan,
) {
    let mut incoming: HashMap<String, AudioLocaleVariant> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for row in &snapshot.audio_locales {
        let Some(document_id) = cross_refs.get(&row.id) else {
            warn!(kind = %kind, cross_ref_id = row.id, "Dropping orphaned audio locale row");
            plan.orphans.push(OrphanedChildRow {
                kind,
                record: ChildRecord::AudioLocale,
                cross_ref_id: row.id,
            });
            continue;
        };

        let variant = AudioLocaleVariant::new(document_id.clone(), row.assets.clone());
        if incoming.insert(document_id.clone(), variant).is_none() {
            order.push(document_id.clone());
        }
    }

    let cached: HashMap<&str, &AudioLocaleVariant> = existing
        .audio
        .iter()
        .map(|variant| (variant.document_id.as_str(), variant))
        .collect();

    let delivered: BTreeSet<String> = order.iter().cloned().collect();

    for document_id in order {
        let Some(variant) = incoming.remove(&document_id) else {
            continue;
        };
        match cached.get(document_id.as_str()) {
            Some(current) if **current == variant => {}
            _ => plan.audio_upserts.push(variant),
        }
    }

    plan.audio_removals = existing
        .audio
        .iter()
        .filter(|variant| merged_ids.contains(variant.document_id.as_str()))
        .filter(|variant| !delivered.contains(&variant.document_id))
        .map(|variant| variant.document_id.clone())
        .collect();
}
