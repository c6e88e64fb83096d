use std::ops::Index;

use crate::utils::MyHash;

struct Entry<T> {
    value: T,
    /// Index of the next entry in the same bucket chain (0 = end).
    next: usize,
}

/// Append-only hash-consing table.
///
/// Values are stored in an arena indexed from 1 (index 0 is a sentinel) and
/// deduplicated through a bucket array with chaining: [`Table::put`] returns
/// the index of an existing equal value instead of storing a duplicate.
///
/// Nodes are never removed within a run, so the table only grows; callers
/// enforce an external node budget instead of collecting garbage.
pub struct Table<T> {
    data: Vec<Entry<T>>,
    buckets: Vec<usize>,
    bitmask: u64,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with `2^bits` buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Bucket bits should be in the range 0..=31");

        let buckets_size = 1 << bits;
        let buckets = vec![0; buckets_size];
        let bitmask = (buckets_size - 1) as u64;

        // Sentinel at index 0, so that `next == 0` terminates chains.
        let data = vec![Entry {
            value: T::default(),
            next: 0,
        }];

        Self {
            data,
            buckets,
            bitmask,
        }
    }
}

impl<T> Table<T> {
    /// Number of stored values (excluding the sentinel).
    pub fn len(&self) -> usize {
        self.data.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }

    /// Get the index of the next entry in the bucket chain.
    pub fn next(&self, index: usize) -> usize {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next
    }

    fn set_next(&mut self, index: usize, next: usize) {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next = next;
    }

    /// Append a value without consulting the buckets, returning its index.
    pub fn add(&mut self, value: T) -> usize {
        self.data.push(Entry { value, next: 0 });
        self.data.len() - 1
    }
}

impl<T> Table<T>
where
    T: MyHash,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Put a value into the table, reusing an existing equal entry.
    pub fn put(&mut self, value: T) -> usize
    where
        T: Eq,
    {
        let bucket_index = self.bucket_index(&value);
        let mut index = self.buckets[bucket_index];

        if index == 0 {
            let i = self.add(value);
            self.buckets[bucket_index] = i;
            return i;
        }

        loop {
            assert!(index > 0);

            if &value == self.value(index) {
                // The value already exists.
                return index;
            }

            let next = self.next(index);

            if next == 0 {
                // Append to the end of the chain.
                let i = self.add(value);
                self.set_next(index, i);
                return i;
            } else {
                index = next;
            }
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}
