//! Open-addressed, linear-probed hash map from `Value` to `Value`
//! (spec.md §4.1). Shared by globals, class method tables, instance field
//! tables, and the string-interning set.

use crate::{
    constants::{TABLE_INITIAL_CAPACITY, TABLE_MAX_LOAD},
    objects::object_string::ObjectString,
    value::{hash_value, Value},
};

#[derive(Clone)]
enum Entry {
    Absent,
    Tombstone,
    Present { key: Value, value: Value },
}

pub struct Table {
    entries: Vec<Entry>,
    // Includes tombstones, so that probe distances stay bounded (spec.md §4.1).
    count: usize,
}

impl Table {
    pub fn new() -> Self {
        Table {
            entries: Vec::new(),
            count: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Present { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds either the slot holding `key`, or the slot where it should be
    /// inserted (preferring a tombstone over a virgin `Absent` slot so
    /// reinsertion doesn't grow the table needlessly). Probing continues
    /// past tombstones when looking for an existing key.
    fn find_slot(entries: &[Entry], capacity: usize, key: &Value) -> usize {
        let hash = hash_value(key);
        let mut index = (hash as usize) % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Entry::Absent => return tombstone.unwrap_or(index),
                Entry::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Entry::Present { key: k, .. } => {
                    if k == key {
                        return index;
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let index = Self::find_slot(&self.entries, self.capacity(), key);
        match &self.entries[index] {
            Entry::Present { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Upserts `key` -> `value`. Returns true if `key` was not already
    /// present. Grows when `count + 1 > capacity * 0.75`.
    pub fn set(&mut self, key: Value, value: Value) -> bool {
        debug_assert!(!matches!(key, Value::Nil), "nil is a forbidden table key");

        if (self.count + 1) as f64 > self.capacity() as f64 * TABLE_MAX_LOAD {
            self.grow();
        }

        let capacity = self.capacity();
        let index = Self::find_slot(&self.entries, capacity, &key);
        let is_new = !matches!(self.entries[index], Entry::Present { .. });
        if is_new && matches!(self.entries[index], Entry::Absent) {
            self.count += 1;
        }
        self.entries[index] = Entry::Present { key, value };
        is_new
    }

    /// Replaces a present entry with a tombstone. Count is not
    /// decremented (spec.md §4.1).
    pub fn delete(&mut self, key: &Value) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let index = Self::find_slot(&self.entries, self.capacity(), key);
        if matches!(self.entries[index], Entry::Present { .. }) {
            self.entries[index] = Entry::Tombstone;
            true
        } else {
            false
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.capacity() < TABLE_INITIAL_CAPACITY {
            TABLE_INITIAL_CAPACITY
        } else {
            self.capacity() * 2
        };
        let old_entries = std::mem::replace(
            &mut self.entries,
            (0..new_capacity).map(|_| Entry::Absent).collect(),
        );
        self.count = 0;
        for entry in old_entries {
            if let Entry::Present { key, value } = entry {
                let index = Self::find_slot(&self.entries, new_capacity, &key);
                self.entries[index] = Entry::Present { key, value };
                self.count += 1;
            }
        }
    }

    /// Copies every present entry into `dst` — used for class inheritance
    /// (`INHERIT` copies the superclass's method table).
    pub fn add_all(&self, dst: &mut Table) {
        for entry in &self.entries {
            if let Entry::Present { key, value } = entry {
                dst.set(*key, *value);
            }
        }
    }

    /// Byte-wise lookup used only by the interning set: finds an
    /// `ObjectString` with the given bytes/hash without first having a
    /// `Value` to hash. Skips tombstones rather than stopping at them.
    pub fn find_interned_string(&self, bytes: &[u8], hash: u64) -> Option<*mut ObjectString> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.capacity();
        let mut index = (hash as usize) % capacity;
        loop {
            match &self.entries[index] {
                Entry::Absent => return None,
                Entry::Tombstone => {}
                Entry::Present { key, .. } => {
                    if let Value::Obj(ptr) = key {
                        let string = unsafe { &*(*ptr as *const ObjectString) };
                        if string.object.hash == hash && string.content.as_bytes() == bytes {
                            return Some(*ptr as *mut ObjectString);
                        }
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    /// Drops every entry whose key is an unmarked heap object. Used by the
    /// GC to prune the interning set before sweep (spec.md §4.3 phase 3).
    pub fn remove_white(&mut self) {
        for entry in self.entries.iter_mut() {
            if let Entry::Present { key, .. } = entry {
                if let Value::Obj(ptr) = key {
                    if unsafe { !(**ptr).marked } {
                        *entry = Entry::Tombstone;
                    }
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Present { key, value } => Some((key, value)),
            _ => None,
        })
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}
