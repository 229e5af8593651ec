/// Exclusive access to the sequencer bank.
///
/// The scheduler and the editor both touch the same bank. Every multi-field
/// change (a step edit, a Euclidean rewrite, a resync) runs inside one
/// `with_exclusive_access` call so a tick never sees half of it.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::bank::SequencerBank;

pub trait ExclusiveAccess {
    fn with_exclusive_access<R>(&mut self, f: impl FnOnce(&mut SequencerBank) -> R) -> R;
}

/// Single context: nothing else can run during `f`, so access is already exclusive
impl ExclusiveAccess for SequencerBank {
    fn with_exclusive_access<R>(&mut self, f: impl FnOnce(&mut SequencerBank) -> R) -> R {
        f(self)
    }
}

/// Bank shared between the playback thread and the UI
#[derive(Debug, Clone, Default)]
pub struct SharedBank {
    inner: Arc<Mutex<SequencerBank>>,
}

impl SharedBank {
    pub fn new(bank: SequencerBank) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bank)),
        }
    }

    // A panic while holding the lock leaves at worst a half-edited pattern;
    // playback carries on with it.
    fn lock(&self) -> MutexGuard<'_, SequencerBank> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_bank<R>(&self, f: impl FnOnce(&mut SequencerBank) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Copy of the whole bank, for drawing without holding the lock
    pub fn snapshot(&self) -> SequencerBank {
        self.lock().clone()
    }
}

impl ExclusiveAccess for SharedBank {
    fn with_exclusive_access<R>(&mut self, f: impl FnOnce(&mut SequencerBank) -> R) -> R {
        self.with_bank(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::TrackRole;
    use std::thread;

    #[test]
    fn test_clones_share_one_bank() {
        let shared = SharedBank::new(SequencerBank::new());
        let mut other = shared.clone();
        other.with_exclusive_access(|bank| bank.set_bpm(90));
        assert_eq!(shared.snapshot().bpm, 90);
    }

    #[test]
    fn test_edits_are_never_torn() {
        let shared = SharedBank::new(SequencerBank::new());

        let mut writer = shared.clone();
        let handle = thread::spawn(move || {
            for i in 0..2000 {
                let value = (i % 2) as i16 * 5;
                writer.with_exclusive_access(|bank| {
                    let track = bank.voice_mut(0).unwrap().track_mut(TrackRole::Pitch);
                    for slot in track.values.iter_mut() {
                        *slot = value;
                    }
                });
            }
        });

        for _ in 0..2000 {
            let values = shared.with_bank(|bank| bank.voice(0).unwrap().track(TrackRole::Pitch).values);
            assert!(values.iter().all(|&v| v == values[0]), "torn write: {:?}", values);
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_poisoned_lock_still_usable() {
        let shared = SharedBank::new(SequencerBank::new());
        let poisoner = shared.clone();
        let _ = thread::spawn(move || {
            poisoner.with_bank(|_| panic!("boom"));
        })
        .join();

        let mut shared = shared;
        shared.with_exclusive_access(|bank| bank.set_bpm(100));
        assert_eq!(shared.snapshot().bpm, 100);
    }
}
