//! Per-task memory budgeting and guaranteed-release task scope.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

/// Tracks one task's memory budget.
///
/// Consumers request bytes before growing their in-memory footprint and
/// release them when the backing allocation is freed. A denied request is
/// not an error; it is the signal to spill.
#[derive(Debug)]
pub struct TaskMemoryManager {
    /// Budget in bytes; 0 means unlimited.
    budget: usize,
    used: AtomicUsize,
}

impl TaskMemoryManager {
    /// Creates a manager with the given budget in bytes (0 = unlimited).
    #[must_use]
    pub fn new(budget: usize) -> Self {
        TaskMemoryManager {
            budget,
            used: AtomicUsize::new(0),
        }
    }

    /// Returns the configured budget in bytes.
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Returns the bytes currently granted.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Requests `bytes` from the budget. Returns true if granted.
    pub fn try_allocate(&self, bytes: usize) -> bool {
        if self.budget == 0 {
            self.used.fetch_add(bytes, Ordering::Relaxed);
            return true;
        }
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let Some(next) = current.checked_add(bytes) else {
                return false;
            };
            if next > self.budget {
                return false;
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns `bytes` to the budget.
    pub fn release(&self, bytes: usize) {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(bytes);
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

type CompletionHook = Box<dyn FnOnce() + Send>;

/// The scope of one task over one partition.
///
/// Owns the task's memory budget, its private temporary area, and the
/// completion hooks that must run exactly once on every exit path.
pub struct TaskContext {
    task_id: u64,
    memory: TaskMemoryManager,
    temp_dir: PathBuf,
    hooks: Mutex<Vec<CompletionHook>>,
    completed: AtomicBool,
}

impl TaskContext {
    /// Creates a task context.
    ///
    /// `temp_dir` is the task-private temporary area used for spill files;
    /// `memory_budget` is in bytes (0 = unlimited).
    #[must_use]
    pub fn new(task_id: u64, memory_budget: usize, temp_dir: impl Into<PathBuf>) -> Self {
        TaskContext {
            task_id,
            memory: TaskMemoryManager::new(memory_budget),
            temp_dir: temp_dir.into(),
            hooks: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
        }
    }

    /// Returns the task id.
    #[must_use]
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    /// Returns the task's memory manager.
    #[must_use]
    pub fn memory(&self) -> &TaskMemoryManager {
        &self.memory
    }

    /// Returns the task-private temporary directory.
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Returns a unique task-scoped path for a new spill file.
    #[must_use]
    pub fn spill_path(&self) -> PathBuf {
        self.temp_dir
            .join(format!("rowqueue-{}-{}.spill", self.task_id, Uuid::new_v4()))
    }

    /// Registers a hook to run when the task completes or fails.
    ///
    /// Hooks registered after completion are dropped without running.
    pub fn on_completion(&self, hook: impl FnOnce() + Send + 'static) {
        if self.completed.load(Ordering::Acquire) {
            return;
        }
        self.hooks.lock().push(Box::new(hook));
    }

    /// Runs all completion hooks, exactly once across all callers.
    ///
    /// Must be invoked on both normal completion and failure paths.
    pub fn complete(&self) {
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
    }

    /// Returns true if `complete()` has already run.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("temp_dir", &self.temp_dir)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn test_allocate_within_budget() {
        let mm = TaskMemoryManager::new(100);
        assert!(mm.try_allocate(60));
        assert!(mm.try_allocate(40));
        assert_eq!(mm.used(), 100);
        assert!(!mm.try_allocate(1));
        mm.release(50);
        assert!(mm.try_allocate(30));
    }

    #[test]
    fn test_zero_budget_is_unlimited() {
        let mm = TaskMemoryManager::new(0);
        assert!(mm.try_allocate(usize::MAX / 2));
    }

    #[test]
    fn test_release_saturates() {
        let mm = TaskMemoryManager::new(100);
        assert!(mm.try_allocate(10));
        mm.release(1000);
        assert_eq!(mm.used(), 0);
    }

    #[test]
    fn test_completion_hooks_run_exactly_once() {
        let ctx = TaskContext::new(1, 0, std::env::temp_dir());
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        ctx.on_completion(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        ctx.complete();
        ctx.complete();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(ctx.is_completed());

        // Hooks registered after completion never run.
        let c = Arc::clone(&count);
        ctx.on_completion(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        ctx.complete();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spill_paths_are_unique() {
        let ctx = TaskContext::new(7, 0, std::env::temp_dir());
        assert_ne!(ctx.spill_path(), ctx.spill_path());
        assert!(ctx
            .spill_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("rowqueue-7-"));
    }
}
