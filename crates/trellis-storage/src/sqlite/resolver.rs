//! Key resolution: maps caller-supplied key strings to unique rows.
//!
//! Resolution order is exact key, then numeric suffix, then slug-qualified
//! key. A numeric lookup matching more than one row is an ambiguity the
//! store cannot resolve; it is reported distinctly from not-found so callers
//! can disambiguate.

use rusqlite::Connection;

use trellis_core::epic::Epic;
use trellis_core::feature::Feature;
use trellis_core::keys::{EpicRef, FeatureRef, TaskRef, parse_epic_ref, parse_feature_ref, parse_task_ref};
use trellis_core::task::Task;

use crate::error::{Result, StoreError};
use crate::sqlite::epics::get_epic_by_key_on_conn;
use crate::sqlite::features::{FEATURE_COLUMNS, get_feature_by_key_on_conn, scan_feature};
use crate::sqlite::store::SqliteStore;
use crate::sqlite::tasks::{TASK_COLUMNS, get_task_by_key_on_conn, scan_task};

/// Resolves an epic reference (`E07`, `E07-epic-name`).
pub(crate) fn resolve_epic_on_conn(conn: &Connection, input: &str) -> Result<Epic> {
    let parsed =
        parse_epic_ref(input).ok_or_else(|| StoreError::not_found("epic", input))?;
    match parsed {
        EpicRef::Exact(key) | EpicRef::Slugged { key, .. } => {
            get_epic_by_key_on_conn(conn, &key)
        }
    }
}

/// Resolves a feature reference (`E07-F11`, `F11`, `F11-slug`,
/// `E07-F11-slug`).
pub(crate) fn resolve_feature_on_conn(conn: &Connection, input: &str) -> Result<Feature> {
    let parsed =
        parse_feature_ref(input).ok_or_else(|| StoreError::not_found("feature", input))?;
    match parsed {
        FeatureRef::Exact(key) | FeatureRef::Slugged { key, .. } => {
            get_feature_by_key_on_conn(conn, &key)
        }
        FeatureRef::Numeric(number) => {
            let matches = features_by_suffix(conn, &number)?;
            pick_unique(matches, input, "feature", |f: &Feature| f.key.clone())
        }
        FeatureRef::NumericSlugged { number, slug } => {
            let matches = features_by_suffix(conn, &number)?;
            if matches.len() > 1 {
                let mut narrowed: Vec<Feature> = matches
                    .iter()
                    .filter(|f| f.slug.as_deref() == Some(slug.as_str()))
                    .cloned()
                    .collect();
                if narrowed.len() == 1 {
                    return Ok(narrowed.remove(0));
                }
                return pick_unique(matches, input, "feature", |f: &Feature| f.key.clone());
            }
            pick_unique(matches, input, "feature", |f: &Feature| f.key.clone())
        }
    }
}

/// Resolves a task reference (`T-E07-F11-003`, `003`, `T-003`, full key with
/// slug).
pub(crate) fn resolve_task_on_conn(conn: &Connection, input: &str) -> Result<Task> {
    let parsed =
        parse_task_ref(input).ok_or_else(|| StoreError::not_found("task", input))?;
    match parsed {
        TaskRef::Exact(key) | TaskRef::Slugged { key, .. } => {
            get_task_by_key_on_conn(conn, &key)
        }
        TaskRef::Numeric(serial) => {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE key LIKE '%-' || ?1 ORDER BY key"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params![serial], scan_task)?;
            let mut matches = Vec::new();
            for row in rows {
                matches.push(row?);
            }
            pick_unique(matches, input, "task", |t: &Task| t.key.clone())
        }
    }
}

/// Features whose key ends in `-<number>` (e.g. `-F11`).
fn features_by_suffix(conn: &Connection, number: &str) -> Result<Vec<Feature>> {
    let sql = format!(
        "SELECT {FEATURE_COLUMNS} FROM features WHERE key LIKE '%-' || ?1 ORDER BY key"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params![number], scan_feature)?;
    let mut matches = Vec::new();
    for row in rows {
        matches.push(row?);
    }
    Ok(matches)
}

/// Zero matches is not-found, one is the answer, more is ambiguous.
fn pick_unique<T>(
    mut matches: Vec<T>,
    input: &str,
    entity: &str,
    key_of: impl Fn(&T) -> String,
) -> Result<T> {
    match matches.len() {
        0 => Err(StoreError::not_found(entity, input)),
        1 => Ok(matches.remove(0)),
        _ => Err(StoreError::AmbiguousKey {
            input: input.to_string(),
            matches: matches.iter().map(key_of).collect(),
        }),
    }
}

// ---------------------------------------------------------------------------
// SqliteStore resolver methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub(crate) fn get_epic_by_key_impl(&self, key: &str) -> Result<Epic> {
        let conn = self.acquire()?;
        resolve_epic_on_conn(&conn, key)
    }

    pub(crate) fn get_feature_by_key_impl(&self, key: &str) -> Result<Feature> {
        let conn = self.acquire()?;
        resolve_feature_on_conn(&conn, key)
    }

    pub(crate) fn get_task_by_key_impl(&self, key: &str) -> Result<Task> {
        let conn = self.acquire()?;
        resolve_task_on_conn(&conn, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::cancel::CancelToken;
    use trellis_core::epic::EpicBuilder;
    use trellis_core::feature::FeatureBuilder;
    use trellis_core::task::TaskBuilder;

    use crate::traits::Store;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        let e1 = store
            .create_epic(&EpicBuilder::new("User Auth").key("E01").build(), &cancel)
            .unwrap();
        let e2 = store
            .create_epic(&EpicBuilder::new("Billing").key("E02").build(), &cancel)
            .unwrap();
        let f1 = store
            .create_feature(
                &FeatureBuilder::new(e1.id, "Login Flow").key("E01-F01").build(),
                &cancel,
            )
            .unwrap();
        store
            .create_feature(
                &FeatureBuilder::new(e2.id, "Invoices").key("E02-F02").build(),
                &cancel,
            )
            .unwrap();
        store
            .create_task(
                &TaskBuilder::new(f1.id, "Build form").key("T-E01-F01-001").build(),
                &cancel,
            )
            .unwrap();
        store
    }

    #[test]
    fn exact_lookups() {
        let store = seeded_store();
        assert_eq!(store.get_epic_by_key("E01").unwrap().key, "E01");
        assert_eq!(store.get_feature_by_key("E01-F01").unwrap().key, "E01-F01");
        assert_eq!(
            store.get_task_by_key("T-E01-F01-001").unwrap().key,
            "T-E01-F01-001"
        );
    }

    #[test]
    fn lookups_are_case_insensitive_on_key_parts() {
        let store = seeded_store();
        assert_eq!(store.get_epic_by_key("e01").unwrap().key, "E01");
        assert_eq!(store.get_task_by_key("t-e01-f01-001").unwrap().key, "T-E01-F01-001");
    }

    #[test]
    fn slugged_lookups_resolve_by_key_portion() {
        let store = seeded_store();
        assert_eq!(store.get_epic_by_key("E01-user-auth").unwrap().key, "E01");
        assert_eq!(
            store.get_feature_by_key("E01-F01-login-flow").unwrap().key,
            "E01-F01"
        );
        assert_eq!(
            store.get_task_by_key("T-E01-F01-001-build-form").unwrap().key,
            "T-E01-F01-001"
        );
    }

    #[test]
    fn numeric_suffix_lookups() {
        let store = seeded_store();
        assert_eq!(store.get_feature_by_key("F01").unwrap().key, "E01-F01");
        assert_eq!(store.get_task_by_key("001").unwrap().key, "T-E01-F01-001");
        assert_eq!(store.get_task_by_key("T-001").unwrap().key, "T-E01-F01-001");
    }

    #[test]
    fn ambiguous_numeric_lookup_is_distinct_from_not_found() {
        let store = seeded_store();
        let cancel = CancelToken::new();
        // Second feature numbered F01, under the other epic.
        let e2 = store.get_epic_by_key("E02").unwrap();
        store
            .create_feature(
                &FeatureBuilder::new(e2.id, "Other F01").key("E02-F01").build(),
                &cancel,
            )
            .unwrap();

        let err = store.get_feature_by_key("F01").unwrap_err();
        match err {
            StoreError::AmbiguousKey { matches, .. } => {
                assert_eq!(matches, vec!["E01-F01".to_string(), "E02-F01".to_string()]);
            }
            other => panic!("expected AmbiguousKey, got {other:?}"),
        }

        let err = store.get_feature_by_key("F09").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn slug_disambiguates_numeric_lookup() {
        let store = seeded_store();
        let cancel = CancelToken::new();
        let e2 = store.get_epic_by_key("E02").unwrap();
        store
            .create_feature(
                &FeatureBuilder::new(e2.id, "Checkout").key("E02-F01").build(),
                &cancel,
            )
            .unwrap();

        assert_eq!(store.get_feature_by_key("F01-checkout").unwrap().key, "E02-F01");
        assert_eq!(
            store.get_feature_by_key("F01-login-flow").unwrap().key,
            "E01-F01"
        );
    }

    #[test]
    fn unparseable_input_is_not_found() {
        let store = seeded_store();
        assert!(store.get_epic_by_key("EPIC-ONE").unwrap_err().is_not_found());
        assert!(store.get_task_by_key("42").unwrap_err().is_not_found());
    }
}
