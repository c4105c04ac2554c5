use std::sync::{
    Mutex,
    MutexGuard,
    PoisonError,
    RwLock,
    RwLockReadGuard,
    RwLockWriteGuard,
};

pub(crate) trait MutexExt<T> {
    fn lock_unpoisoned(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn lock_unpoisoned(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) trait RwLockExt<T> {
    fn read_unpoisoned(&self) -> RwLockReadGuard<'_, T>;
    fn write_unpoisoned(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T> RwLockExt<T> for RwLock<T> {
    fn read_unpoisoned(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_unpoisoned(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex, RwLock};

    use super::*;

    #[test]
    fn mutex_ext_recovers_from_poison() {
        let lock = Arc::new(Mutex::new(1u32));
        let lock_clone = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = lock_clone.lock().unwrap();
            panic!("poison mutex");
        })
        .join();

        let mut guard = lock.lock_unpoisoned();
        *guard += 1;
        assert_eq!(*guard, 2);
    }

    #[test]
    fn rwlock_ext_recovers_from_poison() {
        let lock = Arc::new(RwLock::new(1u32));
        let lock_clone = lock.clone();
        let _ = std::thread::spawn(move || {
            let mut guard = lock_clone.write().unwrap();
            *guard += 1;
            panic!("poison rwlock");
        })
        .join();

        let guard = lock.read_unpoisoned();
        assert_eq!(*guard, 2);
    }
}
