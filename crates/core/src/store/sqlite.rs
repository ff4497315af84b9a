//! SQLite-backed implementation of all three store contracts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{HandledFileStore, QualityStore, ShowStore, StoreError};
use crate::models::{Episode, Name, QualityDecision, QualityTier, State};

/// SQLite store holding episodes, quality decisions and handled filenames.
///
/// All statements run under a single connection mutex, so each trait
/// operation is atomic with respect to every other caller in the process.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                title TEXT NOT NULL,
                season INTEGER NOT NULL,
                episode INTEGER NOT NULL,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (title, season, episode)
            );

            CREATE INDEX IF NOT EXISTS idx_episodes_state ON episodes(state);

            CREATE TABLE IF NOT EXISTS quality_decisions (
                title TEXT NOT NULL,
                season INTEGER NOT NULL,
                episode INTEGER NOT NULL,
                first_seen_at TEXT NOT NULL,
                accepted_tier TEXT,
                accepted_at TEXT,
                PRIMARY KEY (title, season, episode)
            );

            CREATE TABLE IF NOT EXISTS handled_files (
                filename TEXT PRIMARY KEY,
                handled_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(format!("connection lock poisoned: {}", e)))
    }

    fn parse_time(key: &Name, value: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("invalid timestamp {:?}: {}", value, e),
            })
    }

    fn parse_state(key: &Name, value: &str) -> Result<State, StoreError> {
        State::parse(value).ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("unknown state {:?}", value),
        })
    }

    fn read_decision(
        conn: &Connection,
        name: &Name,
    ) -> Result<Option<QualityDecision>, StoreError> {
        let row = conn
            .query_row(
                "SELECT first_seen_at, accepted_tier, accepted_at FROM quality_decisions
                 WHERE title = ?1 AND season = ?2 AND episode = ?3",
                params![name.title, name.season, name.episode],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((first_seen_at, accepted_tier, accepted_at)) = row else {
            return Ok(None);
        };

        let accepted_tier = match accepted_tier {
            Some(tier) => Some(QualityTier::parse(&tier).ok_or_else(|| StoreError::Corrupt {
                key: name.to_string(),
                reason: format!("unknown tier {:?}", tier),
            })?),
            None => None,
        };
        let accepted_at = match accepted_at {
            Some(at) => Some(Self::parse_time(name, &at)?),
            None => None,
        };

        Ok(Some(QualityDecision {
            first_seen_at: Self::parse_time(name, &first_seen_at)?,
            accepted_tier,
            accepted_at,
        }))
    }
}

impl ShowStore for SqliteStore {
    fn get(&self, name: &Name) -> Result<Option<Episode>, StoreError> {
        let conn = self.conn()?;
        let state: Option<String> = conn
            .query_row(
                "SELECT state FROM episodes WHERE title = ?1 AND season = ?2 AND episode = ?3",
                params![name.title, name.season, name.episode],
                |row| row.get(0),
            )
            .optional()?;

        match state {
            Some(state) => Ok(Some(Episode::new(
                name.clone(),
                Self::parse_state(name, &state)?,
            ))),
            None => Ok(None),
        }
    }

    fn upsert(&self, episode: &Episode) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO episodes (title, season, episode, state, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (title, season, episode)
             DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
            params![
                episode.name.title,
                episode.name.season,
                episode.name.episode,
                episode.state.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_if_absent(&self, episode: &Episode) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO episodes (title, season, episode, state, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (title, season, episode) DO NOTHING",
            params![
                episode.name.title,
                episode.name.season,
                episode.name.episode,
                episode.state.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    fn list_by_state(&self, state: State) -> Result<Vec<Episode>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT title, season, episode FROM episodes WHERE state = ?1
             ORDER BY title, season, episode",
        )?;
        let names = stmt
            .query_map(params![state.as_str()], |row| {
                Ok(Name::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(names.into_iter().map(|name| Episode::new(name, state)).collect())
    }
}

impl QualityStore for SqliteStore {
    fn get(&self, name: &Name) -> Result<Option<QualityDecision>, StoreError> {
        let conn = self.conn()?;
        Self::read_decision(&conn, name)
    }

    fn get_or_create(
        &self,
        name: &Name,
        now: DateTime<Utc>,
    ) -> Result<QualityDecision, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO quality_decisions (title, season, episode, first_seen_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (title, season, episode) DO NOTHING",
            params![name.title, name.season, name.episode, now.to_rfc3339()],
        )?;

        Self::read_decision(&conn, name)?.ok_or_else(|| StoreError::Corrupt {
            key: name.to_string(),
            reason: "decision missing after insert".to_string(),
        })
    }

    fn set_accepted(
        &self,
        name: &Name,
        tier: QualityTier,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE quality_decisions SET accepted_tier = ?4, accepted_at = ?5
             WHERE title = ?1 AND season = ?2 AND episode = ?3 AND accepted_tier IS NULL",
            params![
                name.title,
                name.season,
                name.episode,
                tier.as_str(),
                at.to_rfc3339()
            ],
        )?;
        Ok(updated == 1)
    }
}

impl HandledFileStore for SqliteStore {
    fn contains(&self, filename: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM handled_files WHERE filename = ?1",
                params![filename],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_handled(&self, filename: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO handled_files (filename, handled_at) VALUES (?1, ?2)",
            params![filename, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn house() -> Name {
        Name::new("house", 3, 1)
    }

    #[test]
    fn test_upsert_twice_keeps_one_record_equal_to_second_write() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert(&Episode::desired(house())).unwrap();
        store.upsert(&Episode::existing(house())).unwrap();

        assert_eq!(
            ShowStore::get(&store, &house()).unwrap(),
            Some(Episode::existing(house()))
        );
        assert!(store.list_by_state(State::Desired).unwrap().is_empty());
        assert_eq!(store.list_by_state(State::Exists).unwrap().len(), 1);
    }

    #[test]
    fn test_get_missing_episode() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(ShowStore::get(&store, &house()).unwrap().is_none());
    }

    #[test]
    fn test_insert_if_absent_does_not_replace() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert(&Episode::existing(house())).unwrap();

        assert!(!store.insert_if_absent(&Episode::desired(house())).unwrap());
        assert_eq!(
            ShowStore::get(&store, &house()).unwrap().unwrap().state,
            State::Exists
        );

        let other = Name::new("house", 3, 2);
        assert!(store.insert_if_absent(&Episode::desired(other.clone())).unwrap());
        assert!(ShowStore::get(&store, &other).unwrap().unwrap().is_desired());
    }

    #[test]
    fn test_list_by_state_is_name_ordered() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert(&Episode::desired(Name::new("wire", 1, 1))).unwrap();
        store.upsert(&Episode::desired(Name::new("house", 2, 1))).unwrap();
        store.upsert(&Episode::desired(Name::new("house", 1, 5))).unwrap();

        let names: Vec<Name> = store
            .list_by_state(State::Desired)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            vec![
                Name::new("house", 1, 5),
                Name::new("house", 2, 1),
                Name::new("wire", 1, 1)
            ]
        );
    }

    #[test]
    fn test_get_or_create_keeps_first_seen() {
        let store = SqliteStore::in_memory().unwrap();
        let t0 = Utc::now();

        let first = store.get_or_create(&house(), t0).unwrap();
        let second = store
            .get_or_create(&house(), t0 + Duration::minutes(10))
            .unwrap();

        assert_eq!(first.first_seen_at.timestamp(), t0.timestamp());
        assert_eq!(second.first_seen_at, first.first_seen_at);
        assert!(!second.is_accepted());
    }

    #[test]
    fn test_set_accepted_only_once() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        store.get_or_create(&house(), now).unwrap();

        assert!(store
            .set_accepted(&house(), QualityTier::Secondary, now)
            .unwrap());
        assert!(!store
            .set_accepted(&house(), QualityTier::Primary, now)
            .unwrap());

        let decision = QualityStore::get(&store, &house()).unwrap().unwrap();
        assert_eq!(decision.accepted_tier, Some(QualityTier::Secondary));
        assert!(decision.accepted_at.is_some());
    }

    #[test]
    fn test_set_accepted_without_decision_is_false() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store
            .set_accepted(&house(), QualityTier::Primary, Utc::now())
            .unwrap());
    }

    #[test]
    fn test_concurrent_set_accepted_has_single_winner() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store.get_or_create(&house(), Utc::now()).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .set_accepted(&house(), QualityTier::Primary, Utc::now())
                        .unwrap()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_handled_files() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.contains("show.s01e01.mkv").unwrap());
        assert!(store.mark_handled("show.s01e01.mkv").unwrap());
        assert!(!store.mark_handled("show.s01e01.mkv").unwrap());
        assert!(store.contains("show.s01e01.mkv").unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.upsert(&Episode::desired(house())).unwrap();
            store.mark_handled("a.mkv").unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert!(ShowStore::get(&store, &house()).unwrap().unwrap().is_desired());
        assert!(store.contains("a.mkv").unwrap());
    }
}
