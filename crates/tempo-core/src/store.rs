use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::task::{Task, User};

pub type SubscriberId = u64;

pub type Callback = Box<dyn Fn(&[Task]) + Send>;

// Two fixed keys in one data directory: the full task list and the user
// profile. Storage failures never escape the public surface; a list that
// cannot be read is an empty list, a write that fails is skipped and the
// in-memory list stays authoritative for the session.
pub struct TaskStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub user_path: PathBuf,
    next_subscriber: SubscriberId,
    observers: Vec<(SubscriberId, Callback)>,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("data_dir", &self.data_dir)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TaskStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.json");
        let user_path = data_dir.join("user.json");

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            user = %user_path.display(),
            "opened task store"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            user_path,
            next_subscriber: 0,
            observers: vec![],
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Vec<Task> {
        if !self.tasks_path.exists() {
            return vec![];
        }
        match load_json(&self.tasks_path) {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "could not read task list; treating as empty");
                vec![]
            }
        }
    }

    // Persists the full list, then hands it to every subscriber exactly
    // once. A failed write is logged and skipped, never surfaced.
    #[tracing::instrument(skip(self, tasks))]
    pub fn save(&self, tasks: &[Task]) {
        if let Err(err) = save_json_atomic(&self.tasks_path, tasks) {
            warn!(error = %format!("{err:#}"), "task list write skipped");
        }
        self.broadcast(tasks);
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn remove(&self, id: &Uuid) {
        let tasks: Vec<Task> = self
            .load()
            .into_iter()
            .filter(|task| task.id != *id)
            .collect();
        self.save(&tasks);
    }

    pub fn subscribe(&mut self, callback: Callback) -> SubscriberId {
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.observers.push((id, callback));
        debug!(subscriber = id, "added task list subscriber");
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.observers.retain(|(sub, _)| *sub != id);
        debug!(subscriber = id, "removed task list subscriber");
    }

    fn broadcast(&self, tasks: &[Task]) {
        debug!(
            subscribers = self.observers.len(),
            count = tasks.len(),
            "broadcasting task list"
        );
        for (_, callback) in &self.observers {
            callback(tasks);
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn load_user(&self) -> Option<User> {
        if !self.user_path.exists() {
            return None;
        }
        match load_json::<User>(&self.user_path) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "could not read user profile");
                None
            }
        }
    }

    #[tracing::instrument(skip(self, user))]
    pub fn save_user(&self, user: &User) {
        if let Err(err) = save_json_atomic(&self.user_path, user) {
            warn!(error = %format!("{err:#}"), "user profile write skipped");
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_user(&self) {
        if self.user_path.exists()
            && let Err(err) = fs::remove_file(&self.user_path)
        {
            warn!(error = %err, "could not remove user profile");
        }
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

fn save_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let serialized = serde_json::to_string_pretty(value)?;
    temp.write_all(serialized.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
