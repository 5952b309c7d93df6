//! Fixed-size path batching.
//!
//! Owned by a single matcher worker; the callback fires exactly once per
//! full batch, and `flush` hands over whatever remains.

use std::path::PathBuf;

pub struct BatchProcessor<F>
where
    F: FnMut(&[PathBuf]),
{
    batch: Vec<PathBuf>,
    capacity: usize,
    callback: F,
}

impl<F> BatchProcessor<F>
where
    F: FnMut(&[PathBuf]),
{
    pub fn new(capacity: usize, callback: F) -> Self {
        Self {
            batch: Vec::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            callback,
        }
    }

    pub fn add(&mut self, path: PathBuf) {
        self.batch.push(path);
        if self.batch.len() >= self.capacity {
            self.flush();
        }
    }

    pub fn flush(&mut self) {
        if !self.batch.is_empty() {
            (self.callback)(&self.batch);
            self.batch.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn fires_once_per_full_batch() {
        let seen: RefCell<Vec<usize>> = RefCell::new(Vec::new());
        let mut proc = BatchProcessor::new(3, |batch: &[PathBuf]| {
            seen.borrow_mut().push(batch.len());
        });
        for i in 0..7 {
            proc.add(PathBuf::from(format!("/t/{i}")));
        }
        proc.flush();
        assert_eq!(*seen.borrow(), vec![3, 3, 1]);
    }

    #[test]
    fn flush_on_empty_is_a_noop() {
        let count = RefCell::new(0usize);
        let mut proc = BatchProcessor::new(2, |_: &[PathBuf]| {
            *count.borrow_mut() += 1;
        });
        proc.flush();
        assert_eq!(*count.borrow(), 0);
    }
}
