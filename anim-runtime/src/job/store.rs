//! 任务存储：带代数的 arena
//!
//! 句柄里的代数和槽位代数不一致即视为已销毁，
//! 回调中销毁任务后，调用方据此提前返回。

use super::{Job, JobId};

struct Slot {
    generation: u32,
    job: Option<Job>,
}

#[derive(Default)]
pub(crate) struct JobStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl JobStore {
    pub(crate) fn insert(&mut self, job: Job) -> JobId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.job = Some(job);
            return JobId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            job: Some(job),
        });
        JobId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, id: JobId) -> Option<&Job> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.job.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.job.as_mut())
    }

    pub(crate) fn contains(&self, id: JobId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn remove(&mut self, id: JobId) -> Option<Job> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let job = slot.job.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(job)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobKind, LeafJob, PauseJob};

    fn pause() -> Job {
        Job::new(JobKind::Leaf(LeafJob::Pause(PauseJob::new(10))))
    }

    #[test]
    fn test_removed_handle_is_stale() {
        let mut store = JobStore::default();
        let a = store.insert(pause());
        assert!(store.contains(a));
        assert!(store.remove(a).is_some());
        assert!(!store.contains(a));

        // 槽位复用后旧句柄仍然无效
        let b = store.insert(pause());
        assert_eq!(a.index, b.index);
        assert_ne!(a, b);
        assert!(!store.contains(a));
        assert!(store.contains(b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_double_remove() {
        let mut store = JobStore::default();
        let a = store.insert(pause());
        assert!(store.remove(a).is_some());
        assert!(store.remove(a).is_none());
        assert_eq!(store.len(), 0);
    }
}
