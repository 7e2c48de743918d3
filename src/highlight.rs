//! Highlight Coordinator
//!
//! Tracks the short "this just changed" window the diagram shows after a
//! refresh. Every changed table and every added or removed column gets its
//! own window; each window closes on its own timer, or earlier when the
//! next diff arrives.
//!
//! While any window of a table is open its column delta stays available, so
//! the render model can keep showing removed columns (flagged `removed`)
//! and flag new ones (`new`). After the last window closes the delta is
//! dropped and the table renders its current columns only.

use crate::snapshot::{ColumnDelta, SchemaDiff};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Default window length
pub const DEFAULT_HIGHLIGHT_DURATION: Duration = Duration::from_millis(1500);

/// Something that can be highlighted
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HighlightEntity {
    Table { table: String },
    Column { table: String, column: String },
}

impl HighlightEntity {
    pub fn table(table: impl Into<String>) -> Self {
        Self::Table { table: table.into() }
    }

    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::Column {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Table key this entity belongs to
    pub fn table_key(&self) -> &str {
        match self {
            Self::Table { table } | Self::Column { table, .. } => table,
        }
    }
}

/// A currently open window, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightWindow {
    pub entity: HighlightEntity,
    /// Milliseconds left before the window closes
    pub remaining_ms: u64,
    pub duration_ms: u64,
}

/// Point-in-time view of every open window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightSnapshot {
    pub tables: BTreeSet<String>,
    pub column_deltas: BTreeMap<String, ColumnDelta>,
    pub windows: Vec<HighlightWindow>,
}

impl HighlightSnapshot {
    pub fn is_table_highlighted(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn column_delta(&self, table: &str) -> Option<&ColumnDelta> {
        self.column_deltas.get(table)
    }
}

struct ActiveWindow {
    opened_at: Instant,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct HighlightState {
    windows: HashMap<HighlightEntity, ActiveWindow>,
    column_deltas: BTreeMap<String, ColumnDelta>,
    generation: u64,
}

impl HighlightState {
    fn cancel_all(&mut self) {
        for (_, window) in self.windows.drain() {
            window.timer.abort();
        }
        self.column_deltas.clear();
    }

    /// Close `entity` if it still belongs to `generation`.
    fn expire(&mut self, entity: &HighlightEntity, generation: u64) {
        let owned = self
            .windows
            .get(entity)
            .is_some_and(|w| w.generation == generation);
        if !owned {
            return;
        }

        self.windows.remove(entity);
        let table = entity.table_key();
        if !self.windows.keys().any(|e| e.table_key() == table) {
            self.column_deltas.remove(table);
        }
        debug!(?entity, "Highlight window closed");
    }
}

/// Owner of all highlight windows and their timers
pub struct HighlightCoordinator {
    state: Arc<Mutex<HighlightState>>,
    duration: Duration,
}

impl HighlightCoordinator {
    pub fn new(duration: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(HighlightState::default())),
            duration,
        }
    }

    /// Replace every open window with windows for `diff`.
    ///
    /// Windows from earlier diffs are cancelled first, so an entity touched
    /// again restarts its timer instead of gaining a second one.
    pub async fn open(&self, diff: &SchemaDiff) {
        let mut state = self.state.lock().await;
        state.cancel_all();
        state.generation += 1;
        let generation = state.generation;

        let mut entities: BTreeSet<HighlightEntity> = diff
            .changed_tables
            .iter()
            .map(HighlightEntity::table)
            .collect();
        for (table, delta) in &diff.column_deltas {
            for column in delta.added.iter().chain(&delta.removed) {
                entities.insert(HighlightEntity::column(table, column));
            }
            state.column_deltas.insert(table.clone(), delta.clone());
        }

        let opened_at = Instant::now();
        for entity in entities {
            let timer = self.spawn_timer(entity.clone(), generation, opened_at + self.duration);
            state.windows.insert(
                entity,
                ActiveWindow {
                    opened_at,
                    generation,
                    timer,
                },
            );
        }

        debug!(
            generation,
            windows = state.windows.len(),
            "Opened highlight windows"
        );
    }

    fn spawn_timer(&self, entity: HighlightEntity, generation: u64, deadline: Instant) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            state.lock().await.expire(&entity, generation);
        })
    }

    /// Cancel every window and timer. Safe to call any number of times.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.cancel_all();
        state.generation += 1;
    }

    #[cfg(test)]
    pub async fn is_active(&self, entity: &HighlightEntity) -> bool {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .windows
            .get(entity)
            .is_some_and(|w| now < w.opened_at + self.duration)
    }

    /// Everything still open right now.
    ///
    /// Deadlines are checked here as well, so a window whose timer has not
    /// been polled yet is already reported closed.
    pub async fn snapshot(&self) -> HighlightSnapshot {
        let state = self.state.lock().await;
        let now = Instant::now();

        let mut live: Vec<(&HighlightEntity, Duration)> = state
            .windows
            .iter()
            .filter_map(|(entity, w)| {
                let deadline = w.opened_at + self.duration;
                (now < deadline).then(|| (entity, deadline - now))
            })
            .collect();
        live.sort_by(|a, b| a.0.cmp(b.0));

        let tables: BTreeSet<String> = live
            .iter()
            .filter_map(|(entity, _)| match entity {
                HighlightEntity::Table { table } => Some(table.clone()),
                HighlightEntity::Column { .. } => None,
            })
            .collect();

        let column_deltas = state
            .column_deltas
            .iter()
            .filter(|(table, _)| live.iter().any(|(e, _)| e.table_key() == table.as_str()))
            .map(|(table, delta)| (table.clone(), delta.clone()))
            .collect();

        let windows = live
            .into_iter()
            .map(|(entity, remaining)| HighlightWindow {
                entity: entity.clone(),
                remaining_ms: remaining.as_millis() as u64,
                duration_ms: self.duration.as_millis() as u64,
            })
            .collect();

        HighlightSnapshot {
            tables,
            column_deltas,
            windows,
        }
    }

    /// Number of windows whose timers have not fired or been cancelled
    #[cfg(test)]
    pub async fn pending_timers(&self) -> usize {
        self.state.lock().await.windows.len()
    }
}

impl Default for HighlightCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn diff(tables: &[&str], deltas: &[(&str, Vec<&str>, Vec<&str>)]) -> SchemaDiff {
        SchemaDiff {
            changed_tables: tables.iter().map(|t| t.to_string()).collect(),
            column_deltas: deltas
                .iter()
                .map(|(table, added, removed)| {
                    (
                        table.to_string(),
                        ColumnDelta {
                            added: added.iter().map(|c| c.to_string()).collect(),
                            removed: removed.iter().map(|c| c.to_string()).collect(),
                        },
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Let spawned timer tasks observe the advanced clock.
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires_after_duration() {
        let highlights = HighlightCoordinator::default();
        highlights.open(&diff(&["public.users"], &[])).await;
        let users = HighlightEntity::table("public.users");

        assert!(highlights.is_active(&users).await);

        tokio::time::advance(Duration::from_millis(1499)).await;
        assert!(highlights.is_active(&users).await);

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        assert!(!highlights.is_active(&users).await);
        assert_eq!(highlights.pending_timers().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_resets_timer() {
        let highlights = HighlightCoordinator::default();
        let users = HighlightEntity::table("public.users");

        highlights.open(&diff(&["public.users"], &[])).await;
        tokio::time::advance(Duration::from_millis(1000)).await;
        highlights.open(&diff(&["public.users"], &[])).await;
        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;

        assert!(highlights.is_active(&users).await);
        assert_eq!(highlights.pending_timers().await, 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        settle().await;
        assert!(!highlights.is_active(&users).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_diff_supersedes_old_windows() {
        let highlights = HighlightCoordinator::default();

        highlights.open(&diff(&["public.users"], &[])).await;
        highlights.open(&diff(&["public.orders"], &[])).await;

        let snapshot = highlights.snapshot().await;
        assert_eq!(snapshot.tables, BTreeSet::from(["public.orders".to_string()]));
        assert_eq!(highlights.pending_timers().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_column_windows_and_delta_lifetime() {
        let highlights = HighlightCoordinator::default();
        highlights
            .open(&diff(&["public.users"], &[("public.users", vec!["email"], vec!["name"])]))
            .await;

        assert!(highlights.is_active(&HighlightEntity::column("public.users", "email")).await);
        assert!(highlights.is_active(&HighlightEntity::column("public.users", "name")).await);
        let snapshot = highlights.snapshot().await;
        assert_eq!(snapshot.column_delta("public.users").unwrap().removed, vec!["name".to_string()]);
        assert_eq!(snapshot.windows.len(), 3);

        tokio::time::advance(Duration::from_millis(1500)).await;
        settle().await;

        let snapshot = highlights.snapshot().await;
        assert_eq!(snapshot, HighlightSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_is_idempotent() {
        let highlights = HighlightCoordinator::default();
        highlights.open(&diff(&["public.users"], &[])).await;

        highlights.clear().await;
        highlights.clear().await;

        assert_eq!(highlights.pending_timers().await, 0);
        assert!(highlights.snapshot().await.tables.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_diff_closes_everything() {
        let highlights = HighlightCoordinator::new(Duration::from_millis(500));
        highlights.open(&diff(&["public.users"], &[])).await;
        highlights.open(&SchemaDiff::default()).await;

        assert_eq!(highlights.pending_timers().await, 0);
    }

    #[test]
    fn test_entity_table_key() {
        assert_eq!(HighlightEntity::column("public.users", "id").table_key(), "public.users");
        assert_eq!(HighlightEntity::table("public.users").table_key(), "public.users");
    }
}
